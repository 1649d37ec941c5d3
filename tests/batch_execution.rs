mod common;

use std::fs;
use std::time::{Duration, Instant};

use probedag::engine::{MIN_DEFAULT_CONCURRENCY, Settings};
use probedag::exec::process::is_alive;
use probedag::task::TaskState;
use probedag::types::Value;

use crate::common::builders::{ProbeDefBuilder, RegistryBuilder, standard_registry};
use crate::common::{eventually, init_tracing, run_to_end, settings, start, with_timeout_secs};

fn echo(name: &str, text: &str) -> ProbeDefBuilder {
    ProbeDefBuilder::new("echo").name(name).input("text", text)
}

fn sh(name: &str, cmd: &str) -> ProbeDefBuilder {
    ProbeDefBuilder::new("sh").name(name).input("cmd", cmd)
}

#[tokio::test]
async fn results_flow_into_dependents() {
    init_tracing();
    let defs = vec![
        echo("full", "{greeting} world from {current}").build(),
        echo("greeting", "hello").build(),
    ];

    let (handle, audit) = run_to_end(&defs, standard_registry()).await;
    let scope = handle.scope();

    let greeting = scope.task_by_name("greeting").unwrap();
    assert_eq!(greeting.state(), TaskState::Finished);
    // One trailing newline is trimmed.
    assert_eq!(greeting.result(), Some(Value::from("hello")));
    assert_eq!(greeting.stdout(), "hello\n");

    let full = scope.task_by_name("full").unwrap();
    assert_eq!(full.result(), Some(Value::from("hello world from /tmp/current")));
    assert_eq!(full.dependencies(), vec!["greeting".to_string()]);

    assert_eq!(audit.order(), vec!["greeting", "full"]);
    assert!(handle.summary().all_ok());
}

#[tokio::test]
async fn false_condition_skips_and_still_releases_dependents() {
    init_tracing();
    let defs = vec![
        echo("x", "0").build(),
        echo("gated", "ran").condition(r#"{x} == "1""#).build(),
        echo("open", "ran").condition(r#"{x} == "0""#).build(),
        echo("after", "[{gated}]").build(),
    ];

    let (handle, audit) = run_to_end(&defs, standard_registry()).await;
    let scope = handle.scope();

    let gated = scope.task_by_name("gated").unwrap();
    assert_eq!(gated.state(), TaskState::Skipped);
    assert_eq!(gated.result(), Some(Value::Skipped));
    assert!(gated.pids().is_empty());

    let open = scope.task_by_name("open").unwrap();
    assert_eq!(open.state(), TaskState::Finished);
    assert_eq!(open.result(), Some(Value::from("ran")));

    let after = scope.task_by_name("after").unwrap();
    assert_eq!(after.state(), TaskState::Finished);
    assert_eq!(after.result(), Some(Value::from("[]")));

    assert_eq!(audit.len(), 4);
    let summary = handle.summary();
    assert_eq!(summary.finished, 3);
    assert_eq!(summary.skipped, 1);
}

#[tokio::test]
async fn stderr_output_marks_error_and_binds_false() {
    init_tracing();
    let defs = vec![
        ProbeDefBuilder::new("fail").name("broken").build(),
        echo("reader", "got {broken}").build(),
        echo("guarded", "ran").condition("{broken} == false").build(),
    ];

    let (handle, _audit) = run_to_end(&defs, standard_registry()).await;
    let scope = handle.scope();

    let broken = scope.task_by_name("broken").unwrap();
    assert_eq!(broken.state(), TaskState::Error);
    assert_eq!(broken.result(), Some(Value::Failed));
    assert_eq!(broken.stderr(), "boom\n");
    assert_eq!(broken.snapshot().exit_code, Some(0));

    assert_eq!(
        scope.task_by_name("reader").unwrap().result(),
        Some(Value::from("got false"))
    );
    assert_eq!(
        scope.task_by_name("guarded").unwrap().state(),
        TaskState::Finished
    );
    assert!(!handle.summary().all_ok());
}

#[tokio::test]
async fn exit_code_alone_does_not_fail_a_probe() {
    init_tracing();
    let defs = vec![sh("quiet", "echo out; exit 3").build()];

    let (handle, _audit) = run_to_end(&defs, standard_registry()).await;
    let task = handle.scope().task_by_name("quiet").unwrap();
    assert_eq!(task.state(), TaskState::Finished);
    assert_eq!(task.result(), Some(Value::from("out")));
    assert_eq!(task.snapshot().exit_code, Some(3));
}

#[tokio::test]
async fn argv_values_are_passed_as_single_arguments() {
    init_tracing();
    let tricky = r#"a "b" c; echo $(whoami) 'q'"#;
    let defs = vec![echo("tricky", tricky).build()];

    let (handle, _audit) = run_to_end(&defs, standard_registry()).await;
    let task = handle.scope().task_by_name("tricky").unwrap();
    assert_eq!(task.result(), Some(Value::from(tricky)));
}

#[tokio::test]
async fn shell_values_are_quoted() {
    init_tracing();
    let registry = RegistryBuilder::new()
        .shell("show", "printf '%s' {text}")
        .argv("echo", &["echo", "{text}"])
        .build_arc();
    let payload = "x; echo injected > /dev/stderr";
    let defs = vec![
        echo("src", payload).build(),
        ProbeDefBuilder::new("show")
            .name("shown")
            .input("text", "{src}")
            .build(),
    ];

    let (handle, _audit) = run_to_end(&defs, registry).await;
    let shown = handle.scope().task_by_name("shown").unwrap();
    assert_eq!(shown.state(), TaskState::Finished, "stderr: {}", shown.stderr());
    assert_eq!(shown.result(), Some(Value::from(payload)));
}

#[tokio::test]
async fn unnamed_probes_run_but_bind_nothing() {
    init_tracing();
    let defs = vec![
        ProbeDefBuilder::new("echo").input("text", "anon").build(),
        echo("named", "n").build(),
    ];

    let (handle, audit) = run_to_end(&defs, standard_registry()).await;
    let scope = handle.scope();
    let anon = scope.tasks()[0].clone();
    assert_eq!(anon.state(), TaskState::Finished);
    assert_eq!(anon.result(), Some(Value::from("anon")));
    assert_eq!(anon.label(), "echo#0");
    assert_eq!(scope.binding("anon"), None);
    assert_eq!(audit.len(), 2);
}

#[tokio::test]
async fn bad_timeout_or_condition_ends_in_error() {
    init_tracing();
    let defs = vec![
        echo("bad_timeout", "x").input("timeout", "soon").build(),
        echo("bad_condition", "x").condition("{x} ==").build(),
    ];

    let (handle, _audit) = run_to_end(&defs, standard_registry()).await;
    let scope = handle.scope();
    for name in ["bad_timeout", "bad_condition"] {
        let task = scope.task_by_name(name).unwrap();
        assert_eq!(task.state(), TaskState::Error, "{name}");
        assert_eq!(task.result(), Some(Value::Failed), "{name}");
        assert!(task.pids().is_empty(), "{name} should never spawn");
        assert!(!task.stderr().is_empty(), "{name} should explain the failure");
    }
}

#[tokio::test]
async fn independent_probes_run_concurrently() {
    init_tracing();
    let defs = vec![
        ProbeDefBuilder::new("sleep").name("long").input("secs", "3").build(),
        ProbeDefBuilder::new("sleep").name("short").input("secs", "1").build(),
    ];

    let started = Instant::now();
    let (handle, audit) = run_to_end(&defs, standard_registry()).await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_secs(3), "finished too early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(3900), "ran serially: {elapsed:?}");
    assert_eq!(audit.order(), vec!["short", "long"]);
    assert!(handle.summary().all_ok());
}

#[tokio::test]
async fn default_concurrency_runs_independent_probes_together() {
    init_tracing();
    let unbounded = Settings {
        default_timeout: None,
        max_concurrency: None,
    };
    assert!(unbounded.effective_max_concurrency() >= MIN_DEFAULT_CONCURRENCY);

    let defs = vec![
        ProbeDefBuilder::new("sleep").name("long").input("secs", "3").build(),
        ProbeDefBuilder::new("sleep").name("short").input("secs", "1").build(),
    ];

    let started = Instant::now();
    let (mut handle, _audit) = start(&defs, standard_registry(), unbounded);
    with_timeout_secs(20, handle.wait()).await;
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_millis(3900), "ran serially: {elapsed:?}");
    assert!(handle.summary().all_ok());
}

#[tokio::test]
async fn background_children_neither_block_nor_erase_stdout() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("bg.pid");
    let defs = vec![
        ProbeDefBuilder::new("detach").name("x").build(),
        echo("reader", "got {x}").build(),
    ];
    let registry = RegistryBuilder::new()
        .argv("echo", &["echo", "{text}"])
        .shell(
            "detach",
            &format!("echo hello; sleep 5 & echo $! > '{}'", pid_file.display()),
        )
        .build_arc();

    let started = Instant::now();
    let (handle, _audit) = run_to_end(&defs, registry).await;
    assert!(started.elapsed() < Duration::from_secs(4), "took {:?}", started.elapsed());

    let x = handle.scope().task_by_name("x").unwrap();
    assert_eq!(x.state(), TaskState::Finished);
    assert_eq!(x.result(), Some(Value::from("hello")));
    assert_eq!(
        handle.scope().task_by_name("reader").unwrap().result(),
        Some(Value::from("got hello"))
    );

    let child: u32 = fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert!(
        eventually(Duration::from_secs(3), || !is_alive(child)).await,
        "background child {child} outlived its probe"
    );
}

#[tokio::test]
async fn concurrency_limit_is_respected() {
    init_tracing();
    let defs = vec![
        ProbeDefBuilder::new("sleep").name("one").input("secs", "1").build(),
        ProbeDefBuilder::new("sleep").name("two").input("secs", "1").build(),
    ];
    let limited = Settings {
        default_timeout: None,
        max_concurrency: Some(1),
    };

    let started = Instant::now();
    let (mut handle, _audit) = start(&defs, standard_registry(), limited);
    with_timeout_secs(20, handle.wait()).await;

    assert!(started.elapsed() >= Duration::from_secs(2));
    assert!(handle.summary().all_ok());
}

#[tokio::test]
async fn every_probe_is_audited_exactly_once() {
    init_tracing();
    let defs = vec![
        echo("a", "1").build(),
        echo("b", "{a}").condition("{a} == 2").build(),
        ProbeDefBuilder::new("fail").name("c").build(),
        echo("d", "{b}{c}").build(),
    ];

    let (_handle, audit) = run_to_end(&defs, standard_registry()).await;
    let mut order = audit.order();
    order.sort();
    assert_eq!(order, vec!["a", "b", "c", "d"]);

    for record in audit.records() {
        assert!(record.state.is_terminal(), "{} audited in {}", record.name, record.state);
        assert!(record.finished.is_some());
        assert!(record.finished.unwrap() >= record.created);
    }
}

#[tokio::test]
async fn empty_batch_settles_immediately() {
    let (mut handle, audit) = start(&[], standard_registry(), settings());
    with_timeout_secs(5, handle.wait()).await;
    assert!(audit.is_empty());
    assert_eq!(handle.summary().total(), 0);
}
