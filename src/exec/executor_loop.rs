// src/exec/executor_loop.rs

//! Dispatcher that turns ready task ids into running probes.

use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::audit::AuditSink;
use crate::dag::Scope;
use crate::types::TaskId;

/// Spawn the background dispatcher for one batch.
///
/// Every id received on `ready_rx` is run on its own Tokio task, with at
/// most `max_concurrency` probes between launch and settle at any time.
/// All probes must be registered before this is called: the loop ends once
/// every probe of the scope has settled.
pub fn spawn_executor(
    scope: Arc<Scope>,
    mut ready_rx: mpsc::UnboundedReceiver<TaskId>,
    audit: Arc<dyn AuditSink>,
    max_concurrency: usize,
) -> JoinHandle<()> {
    let limit = Arc::new(Semaphore::new(max_concurrency.max(1)));

    tokio::spawn(async move {
        info!(max_concurrency, "executor loop started");

        let mut running: JoinSet<()> = JoinSet::new();

        loop {
            if scope.settled_count() >= scope.len() {
                break;
            }
            tokio::select! {
                next = ready_rx.recv() => {
                    let Some(id) = next else { break };
                    let Ok(permit) = Arc::clone(&limit).acquire_owned().await else {
                        warn!(task = %id, "concurrency limiter closed; dropping probe");
                        continue;
                    };
                    let Some(task) = scope.task(id) else {
                        warn!(task = %id, "ready id does not name a probe");
                        continue;
                    };

                    debug!(task = %task.label(), "dispatching probe");
                    let scope = Arc::clone(&scope);
                    let audit = Arc::clone(&audit);
                    running.spawn(async move {
                        task.run(&scope, audit.as_ref()).await;
                        drop(permit);
                    });
                }
                Some(joined) = running.join_next(), if !running.is_empty() => {
                    log_join(joined);
                }
            }
        }

        while let Some(joined) = running.join_next().await {
            log_join(joined);
        }

        info!(settled = scope.settled_count(), "executor loop finished");
    })
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "probe runner panicked or was cancelled");
    }
}
