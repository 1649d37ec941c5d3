mod common;

use std::fs;
use std::sync::Arc;

use clap::Parser;

use probedag::audit::{AuditSink, FanoutAudit, JsonlAudit, NullAudit};
use probedag::cli::CliArgs;
use probedag::engine::run_batch;

use crate::common::builders::{ProbeDefBuilder, standard_registry};
use crate::common::{RecordingAudit, init_tracing, settings, with_timeout_secs};

#[tokio::test]
async fn jsonl_audit_writes_one_line_per_probe() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("audit.jsonl");

    let recording = RecordingAudit::new();
    let sink = FanoutAudit::new()
        .with(Arc::new(JsonlAudit::open(&log).unwrap()))
        .with(Arc::new(recording.clone()))
        .with(Arc::new(NullAudit));
    assert_eq!(sink.len(), 3);

    let defs = vec![
        ProbeDefBuilder::new("echo").name("a").input("text", "1").build(),
        ProbeDefBuilder::new("echo")
            .name("b")
            .input("text", "x")
            .condition("{a} == 2")
            .build(),
        ProbeDefBuilder::new("fail").name("c").build(),
    ];
    let sink: Arc<dyn AuditSink> = Arc::new(sink);
    let mut handle = run_batch(
        &defs,
        [("current", "."), ("previous", ".")],
        standard_registry(),
        settings(),
        sink,
    )
    .unwrap();
    with_timeout_secs(10, handle.wait()).await;

    let contents = fs::read_to_string(&log).unwrap();
    let lines: Vec<serde_json::Value> = contents
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(recording.len(), 3);

    let by_name = |name: &str| {
        lines
            .iter()
            .find(|l| l["name"] == name)
            .unwrap_or_else(|| panic!("no record for {name}"))
            .clone()
    };

    let a = by_name("a");
    assert_eq!(a["state"], "finished");
    assert_eq!(a["result"], "1");
    assert_eq!(a["module"], "echo");
    assert_eq!(a["command"], "echo 1");

    let b = by_name("b");
    assert_eq!(b["state"], "skipped");
    assert!(b["result"].is_null());
    assert_eq!(b["dependencies"], serde_json::json!(["a"]));

    let c = by_name("c");
    assert_eq!(c["state"], "error");
    assert_eq!(c["result"], false);
    assert_eq!(c["stderr"], "boom\n");
}

#[test]
fn cli_parses_seeds_and_overrides() {
    let args = CliArgs::try_parse_from([
        "probedag",
        "--config",
        "conf/Probedag.toml",
        "--batch",
        "a.json",
        "--batch",
        "more",
        "--current",
        "/new",
        "--var",
        "branch=main",
        "--var",
        "expr=a=b",
        "--max-concurrency",
        "2",
        "--default-timeout",
        "-1",
        "--dry-run",
    ])
    .unwrap();

    assert_eq!(args.config.to_str(), Some("conf/Probedag.toml"));
    assert_eq!(args.batch.len(), 2);
    assert_eq!(args.max_concurrency, Some(2));
    assert_eq!(args.default_timeout, Some(-1.0));
    assert!(args.dry_run);

    assert_eq!(
        args.seed(),
        vec![
            ("current".to_string(), "/new".to_string()),
            ("previous".to_string(), ".".to_string()),
            ("branch".to_string(), "main".to_string()),
            ("expr".to_string(), "a=b".to_string()),
        ]
    );
}

#[test]
fn cli_rejects_malformed_vars() {
    assert!(CliArgs::try_parse_from(["probedag", "--var", "novalue"]).is_err());
    assert!(CliArgs::try_parse_from(["probedag", "--var", "=x"]).is_err());
}

#[tokio::test]
async fn run_executes_config_probes_and_writes_audit_log() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("modules")).unwrap();
    fs::write(
        dir.path().join("modules/basic.toml"),
        "[module.echo]\nargv = [\"echo\", \"{text}\"]\n",
    )
    .unwrap();
    let config = dir.path().join("Probedag.toml");
    fs::write(
        &config,
        r#"
[config]
default_timeout = 10
module_paths = ["modules"]
audit_log = "audit.jsonl"

[[probe]]
type = "echo"
name = "where"
[probe.config]
text = "at {current}"
"#,
    )
    .unwrap();

    let args = CliArgs::try_parse_from([
        "probedag",
        "--config",
        config.to_str().unwrap(),
        "--current",
        "/srv",
    ])
    .unwrap();

    let ok = with_timeout_secs(10, probedag::run(args)).await.unwrap();
    assert!(ok);

    let audit = fs::read_to_string(dir.path().join("audit.jsonl")).unwrap();
    let record: serde_json::Value = serde_json::from_str(audit.lines().next().unwrap()).unwrap();
    assert_eq!(record["result"], "at /srv");
}

#[tokio::test]
async fn dry_run_executes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("Probedag.toml");
    let marker = dir.path().join("marker");
    fs::write(
        &config,
        format!(
            "[config]\naudit_log = \"audit.jsonl\"\n\n[module.touch]\nargv = [\"touch\", \"{{path}}\"]\n\n[[probe]]\ntype = \"touch\"\n[probe.config]\npath = \"{}\"\n",
            marker.display()
        ),
    )
    .unwrap();

    let args = CliArgs::try_parse_from([
        "probedag",
        "--config",
        config.to_str().unwrap(),
        "--dry-run",
    ])
    .unwrap();

    assert!(probedag::run(args).await.unwrap());
    assert!(!marker.exists());
    assert!(!dir.path().join("audit.jsonl").exists());
}

#[tokio::test]
async fn inline_module_clashing_with_module_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("modules")).unwrap();
    fs::write(
        dir.path().join("modules/basic.toml"),
        "[module.echo]\nargv = [\"echo\", \"{text}\"]\n",
    )
    .unwrap();
    let config = dir.path().join("Probedag.toml");
    fs::write(
        &config,
        "[config]\nmodule_paths = [\"modules\"]\n\n[module.echo]\ncommand = \"echo inline\"\n",
    )
    .unwrap();

    let args = CliArgs::try_parse_from(["probedag", "--config", config.to_str().unwrap()]).unwrap();
    let err = probedag::run(args).await.unwrap_err();
    assert!(
        matches!(
            err.downcast_ref::<probedag::errors::ProbeDagError>(),
            Some(probedag::errors::ProbeDagError::DuplicateModuleType(_))
        ),
        "got {err:?}"
    );
}

#[tokio::test]
async fn missing_default_config_is_fine_only_with_batches() {
    init_tracing();
    assert!(!std::path::Path::new("Probedag.toml").exists());

    let dir = tempfile::tempdir().unwrap();
    let modules = dir.path().join("modules");
    fs::create_dir_all(&modules).unwrap();
    fs::write(
        modules.join("basic.toml"),
        "[module.echo]\nargv = [\"echo\", \"{text}\"]\n",
    )
    .unwrap();
    let batch = dir.path().join("batch.json");
    fs::write(
        &batch,
        r#"[{"type": "echo", "name": "hi", "config": {"text": "hello"}}]"#,
    )
    .unwrap();

    let with_batch = CliArgs::try_parse_from([
        "probedag",
        "--batch",
        batch.to_str().unwrap(),
        "--modules",
        modules.to_str().unwrap(),
    ])
    .unwrap();
    assert!(with_timeout_secs(10, probedag::run(with_batch)).await.unwrap());

    let without_batch =
        CliArgs::try_parse_from(["probedag", "--modules", modules.to_str().unwrap()]).unwrap();
    assert!(probedag::run(without_batch).await.is_err());
}
