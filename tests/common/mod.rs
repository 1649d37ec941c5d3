#![allow(dead_code)]

pub use probedag_test_utils::audit::RecordingAudit;
pub use probedag_test_utils::builders;
pub use probedag_test_utils::{eventually, init_tracing, with_timeout, with_timeout_secs};

use std::sync::Arc;

use probedag::audit::AuditSink;
use probedag::config::ProbeDef;
use probedag::engine::{BatchHandle, Settings, run_batch};
use probedag::modules::ModuleRegistry;

/// Settings for tests: no global timeout, four workers.
pub fn settings() -> Settings {
    Settings {
        default_timeout: None,
        max_concurrency: Some(4),
    }
}

/// Start `defs` with the standard seed (`current`, `previous`) and return
/// the handle plus the recording audit sink.
pub fn start(
    defs: &[ProbeDef],
    registry: Arc<ModuleRegistry>,
    settings: Settings,
) -> (BatchHandle, RecordingAudit) {
    let audit = RecordingAudit::new();
    let sink: Arc<dyn AuditSink> = Arc::new(audit.clone());
    let handle = run_batch(
        defs,
        [("current", "/tmp/current"), ("previous", "/tmp/previous")],
        registry,
        settings,
        sink,
    )
    .expect("batch should start");
    (handle, audit)
}

/// Start `defs` and wait (bounded) for the batch to settle.
pub async fn run_to_end(
    defs: &[ProbeDef],
    registry: Arc<ModuleRegistry>,
) -> (BatchHandle, RecordingAudit) {
    let (mut handle, audit) = start(defs, registry, settings());
    with_timeout_secs(20, handle.wait()).await;
    (handle, audit)
}
