// src/exec/task_runner.rs

//! Drives one probe from launch to a published result.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::audit::AuditSink;
use crate::dag::Scope;
use crate::errors::Result;
use crate::exec::CommandLine;
use crate::task::{Task, TaskState};
use crate::types::Value;

use super::command::spawn;
use super::process::kill_tree;

/// Run `task` to a terminal state, record it, then publish its result.
///
/// Order of effects once the outcome is known:
/// 1. final state and result stored on the task,
/// 2. audit record written,
/// 3. `update_with_result` (named probes only), which may release dependents,
/// 4. the task is counted as settled.
///
/// The scope lock is only taken to read bindings while the command is
/// built; spawning and waiting happen outside it.
pub async fn run_task(task: &Task, scope: &Scope, audit: &dyn AuditSink) {
    let value = execute(task, scope).await;

    task.set_result(value.clone());

    let snapshot = task.snapshot();
    info!(
        task = %task.label(),
        module = %snapshot.module,
        state = %snapshot.state,
        exit_code = ?snapshot.exit_code,
        "probe settled"
    );
    audit.record(&snapshot);

    if let Some(name) = task.name() {
        scope.update_with_result(name, value);
    }
    scope.task_settled();
}

async fn execute(task: &Task, scope: &Scope) -> Value {
    // Killed while queued (batch cancellation).
    if task.state().is_terminal() {
        return Value::Failed;
    }
    if scope.is_cancelled() {
        task.kill();
        return Value::Failed;
    }

    // Gate, build command and resolve timeout against one consistent view
    // of the bindings.
    let prepared = scope.with_bindings(|bindings| -> Result<Option<(CommandLine, Option<Duration>)>> {
        if !task.condition_holds(bindings)? {
            return Ok(None);
        }
        let command = task.build_command(bindings)?;
        let timeout = task.effective_timeout(bindings)?;
        Ok(Some((command, timeout)))
    });

    let (command, timeout) = match prepared {
        Ok(Some(prepared)) => prepared,
        Ok(None) => {
            info!(task = %task.label(), "condition is false; skipping probe");
            task.transition(TaskState::Skipped);
            return Value::Skipped;
        }
        Err(e) => {
            warn!(task = %task.label(), error = %e, "probe could not be prepared");
            return task.fail(e.to_string());
        }
    };

    info!(
        task = %task.label(),
        command = %command,
        timeout_secs = ?timeout.map(|t| t.as_secs_f64()),
        "starting probe process"
    );

    let mut process = match spawn(&command) {
        Ok(process) => process,
        Err(e) => {
            error!(task = %task.label(), error = %e, "failed to spawn probe process");
            task.record_command(&command);
            return task.fail(e.to_string());
        }
    };

    let pids = process.pids();
    if !task.mark_running(&command, pids.clone()) {
        // Killed between preparation and spawn; the process is ours to stop.
        kill_tree(process.pid(), &pids);
        let _ = process.wait().await;
        let _ = process.collect_output().await;
        return Value::Failed;
    }

    let status = match process.wait_timeout(timeout).await {
        Ok(Some(status)) => Some(status),
        Ok(None) => {
            task.time_out();
            // Unbounded: the tree was just SIGKILLed.
            process.wait().await.ok()
        }
        Err(e) => {
            error!(task = %task.label(), error = %e, "lost track of probe process");
            task.kill();
            let _ = process.wait().await;
            let output = process.collect_output().await;
            task.complete(output.stdout, output.stderr, None);
            return task.fail(e.to_string());
        }
    };

    let output = process.collect_output().await;
    let value = task.complete(output.stdout, output.stderr, status.and_then(|s| s.code()));

    if task.state() == TaskState::Error {
        warn!(task = %task.label(), stderr = %task.stderr().trim_end(), "probe wrote to stderr");
    }
    value
}
