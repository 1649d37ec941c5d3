// src/engine/driver.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audit::AuditSink;
use crate::config::model::ProbeDef;
use crate::dag::{Scope, check_acyclic};
use crate::errors::Result;
use crate::exec::spawn_executor;
use crate::modules::ModuleRegistry;
use crate::task::{Task, TaskSnapshot, TaskState};
use crate::types::{TaskId, Value};

use super::Settings;

/// Create, register and prepare every probe of a batch without launching
/// anything.
///
/// Every probe is registered first, so that a probe may refer to any other
/// probe of the batch regardless of order. Dependencies are then inferred
/// for every probe and the graph is checked for cycles. The returned
/// receiver is the scope's ready queue.
pub fn prepare_batch<I, K, V>(
    defs: &[ProbeDef],
    seed: I,
    registry: &ModuleRegistry,
    settings: &Settings,
) -> Result<(Arc<Scope>, mpsc::UnboundedReceiver<TaskId>)>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    let (scope, ready_rx) = Scope::new(seed);
    let scope = Arc::new(scope);

    let mut tasks = Vec::with_capacity(defs.len());
    for def in defs {
        let task = Task::from_def(def, registry, settings.default_timeout)?;
        tasks.push(scope.register_task(task)?);
    }

    for task in &tasks {
        task.prep_input_dependencies(&scope)?;
    }

    check_acyclic(&scope)?;
    Ok((scope, ready_rx))
}

/// Start a batch of probes.
///
/// Configuration errors (unknown module type, duplicate name, unknown
/// dependency, cycle) are returned before anything has been spawned. Probe
/// execution failures never surface here; they end up in the probe's state
/// and result.
pub fn run_batch<I, K, V>(
    defs: &[ProbeDef],
    seed: I,
    registry: Arc<ModuleRegistry>,
    settings: Settings,
    audit: Arc<dyn AuditSink>,
) -> Result<BatchHandle>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    let (scope, ready_rx) = prepare_batch(defs, seed, &registry, &settings)?;

    let max_concurrency = settings.effective_max_concurrency();
    info!(probes = scope.len(), max_concurrency, "starting batch");

    let executor = spawn_executor(Arc::clone(&scope), ready_rx, audit, max_concurrency);
    let launched = scope.launch_ready();
    debug!(?launched, "released probes without dependencies");

    Ok(BatchHandle {
        scope,
        executor: Some(executor),
    })
}

/// A started batch.
#[derive(Debug)]
pub struct BatchHandle {
    scope: Arc<Scope>,
    executor: Option<JoinHandle<()>>,
}

impl BatchHandle {
    pub fn scope(&self) -> &Arc<Scope> {
        &self.scope
    }

    /// Wait until every probe of the batch has settled.
    pub async fn wait(&mut self) {
        let total = self.scope.len();
        let mut settled = self.scope.subscribe_settled();
        if settled.wait_for(|&n| n >= total).await.is_err() {
            warn!("settle notifications closed before the batch finished");
        }

        if let Some(executor) = self.executor.take() {
            if let Err(e) = executor.await {
                warn!(error = %e, "executor loop ended abnormally");
            }
        }
    }

    /// Like [`wait`](Self::wait), giving up after `limit`.
    ///
    /// Returns whether the batch settled in time.
    pub async fn wait_timeout(&mut self, limit: Duration) -> bool {
        tokio::time::timeout(limit, self.wait()).await.is_ok()
    }

    /// Kill every running probe. Probes not started yet end `Terminated`
    /// without running once they are released.
    pub fn cancel(&self) {
        let tasks = self.scope.cancel();
        warn!(probes = tasks.len(), "cancelling batch");
        for task in tasks {
            task.kill();
        }
    }

    pub fn snapshots(&self) -> Vec<TaskSnapshot> {
        self.scope.tasks().iter().map(|t| t.snapshot()).collect()
    }

    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for task in self.scope.tasks() {
            summary.add(task.state());
        }
        summary
    }
}

/// Count of probes per terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub finished: usize,
    pub error: usize,
    pub skipped: usize,
    pub terminated: usize,
    /// Not settled (only non-zero before `wait` returns).
    pub pending: usize,
}

impl BatchSummary {
    fn add(&mut self, state: TaskState) {
        match state {
            TaskState::Finished => self.finished += 1,
            TaskState::Error => self.error += 1,
            TaskState::Skipped => self.skipped += 1,
            TaskState::Terminated => self.terminated += 1,
            _ => self.pending += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.finished + self.error + self.skipped + self.terminated + self.pending
    }

    /// Every probe finished or was skipped.
    pub fn all_ok(&self) -> bool {
        self.error == 0 && self.terminated == 0 && self.pending == 0
    }
}
