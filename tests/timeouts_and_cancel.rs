mod common;

use std::fs;
use std::time::{Duration, Instant};

use probedag::engine::Settings;
use probedag::exec::process::is_alive;
use probedag::task::TaskState;
use probedag::types::Value;

use crate::common::builders::{ProbeDefBuilder, standard_registry};
use crate::common::{eventually, init_tracing, run_to_end, start, settings, with_timeout_secs};

#[tokio::test]
async fn timeout_kills_the_process_and_terminates_the_probe() {
    init_tracing();
    let defs = vec![
        ProbeDefBuilder::new("sleep")
            .name("slow")
            .input("secs", "10")
            .timeout(1.0)
            .build(),
        ProbeDefBuilder::new("echo")
            .name("after")
            .input("text", "slow={slow}")
            .build(),
    ];

    let started = Instant::now();
    let (handle, audit) = run_to_end(&defs, standard_registry()).await;
    assert!(started.elapsed() < Duration::from_secs(5), "took {:?}", started.elapsed());

    let slow = handle.scope().task_by_name("slow").unwrap();
    let history = slow.state_history();
    assert_eq!(
        history,
        vec![
            TaskState::Preparing,
            TaskState::Waiting,
            TaskState::Running,
            TaskState::TimedOut,
            TaskState::Terminated,
        ]
    );
    assert_eq!(slow.result(), Some(Value::Failed));
    assert!(slow.snapshot().timed_out);

    let pids = slow.pids();
    assert!(!pids.is_empty());
    assert!(
        eventually(Duration::from_secs(3), || pids.iter().all(|&p| !is_alive(p))).await,
        "processes still alive: {pids:?}"
    );

    let after = handle.scope().task_by_name("after").unwrap();
    assert_eq!(after.result(), Some(Value::from("slow=false")));

    // The timed-out probe is audited once, in its final state.
    let records = audit.records();
    let slow_records: Vec<_> = records.iter().filter(|r| r.name == "slow").collect();
    assert_eq!(slow_records.len(), 1);
    assert_eq!(slow_records[0].state, TaskState::Terminated);
}

#[tokio::test]
async fn timeout_kills_background_descendants() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("child.pid");
    let cmd = format!("sleep 30 & echo $! > '{}'; wait", pid_file.display());

    let defs = vec![
        ProbeDefBuilder::new("sh")
            .name("forker")
            .input("cmd", &cmd)
            .timeout(1.0)
            .build(),
    ];

    let (handle, _audit) = run_to_end(&defs, standard_registry()).await;
    let forker = handle.scope().task_by_name("forker").unwrap();
    assert_eq!(forker.state(), TaskState::Terminated);

    let child: u32 = fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert!(
        eventually(Duration::from_secs(3), || !is_alive(child)).await,
        "background child {child} survived the timeout"
    );
}

#[tokio::test]
async fn global_default_timeout_applies_when_nothing_else_is_set() {
    init_tracing();
    let defs = vec![
        ProbeDefBuilder::new("sleep").name("slow").input("secs", "10").build(),
    ];
    let with_default = Settings {
        default_timeout: Some(1.0),
        max_concurrency: Some(2),
    };

    let (mut handle, _audit) = start(&defs, standard_registry(), with_default);
    with_timeout_secs(8, handle.wait()).await;

    let slow = handle.scope().task_by_name("slow").unwrap();
    assert_eq!(slow.state(), TaskState::Terminated);
    assert!(slow.snapshot().timed_out);
}

#[tokio::test]
async fn zero_timeout_input_disables_the_default() {
    init_tracing();
    let defs = vec![
        ProbeDefBuilder::new("sleep")
            .name("patient")
            .input("secs", "1")
            .timeout(0.0)
            .build(),
    ];
    let with_default = Settings {
        default_timeout: Some(0.2),
        max_concurrency: Some(2),
    };

    let (mut handle, _audit) = start(&defs, standard_registry(), with_default);
    with_timeout_secs(8, handle.wait()).await;

    let patient = handle.scope().task_by_name("patient").unwrap();
    assert_eq!(patient.state(), TaskState::Finished);
    assert_eq!(patient.result(), Some(Value::from("slept")));
}

#[tokio::test]
async fn cancel_terminates_running_and_pending_probes() {
    init_tracing();
    let defs = vec![
        ProbeDefBuilder::new("sleep").name("slow").input("secs", "30").build(),
        ProbeDefBuilder::new("echo")
            .name("after")
            .input("text", "{slow}")
            .build(),
    ];

    let (mut handle, audit) = start(&defs, standard_registry(), settings());
    let scope = handle.scope().clone();
    assert!(
        eventually(Duration::from_secs(5), || {
            scope.task_by_name("slow").unwrap().state() == TaskState::Running
        })
        .await
    );

    let started = Instant::now();
    handle.cancel();
    with_timeout_secs(10, handle.wait()).await;
    assert!(started.elapsed() < Duration::from_secs(5));

    for name in ["slow", "after"] {
        let task = scope.task_by_name(name).unwrap();
        assert_eq!(task.state(), TaskState::Terminated, "{name}");
        assert_eq!(task.result(), Some(Value::Failed), "{name}");
    }
    // `after` never started a process.
    assert!(scope.task_by_name("after").unwrap().pids().is_empty());
    assert_eq!(audit.len(), 2);
    assert_eq!(handle.summary().terminated, 2);

    // Killing again is a no-op.
    scope.task_by_name("slow").unwrap().kill();
    assert_eq!(scope.task_by_name("slow").unwrap().state(), TaskState::Terminated);
}
