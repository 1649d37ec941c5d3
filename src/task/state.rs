// src/task/state.rs

//! Probe lifecycle states, timestamps and the audit snapshot.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::types::{TaskId, Value};

/// Lifecycle of a probe within one batch.
///
/// ```text
/// Preparing -> Waiting -> Running -> Finished | Error | Terminated
///                      |            \-> TimedOut -> Terminated
///                      \-> Skipped | Error | Terminated
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Registered with the scope, dependencies not computed yet.
    Preparing,
    /// Dependencies registered; waiting for them or for a worker.
    Waiting,
    /// Process spawned and supervised.
    Running,
    /// Timeout fired; the process tree is being killed.
    TimedOut,
    /// Process exited and wrote nothing to stderr.
    Finished,
    /// Process wrote to stderr, or the command could not be built/spawned.
    Error,
    /// Condition evaluated to false; nothing was run.
    Skipped,
    /// Killed (after a timeout or by cancellation).
    Terminated,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Finished | TaskState::Error | TaskState::Skipped | TaskState::Terminated
        )
    }

    /// Whether `self -> next` is a legal one-way transition.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Preparing, Waiting)
                | (Preparing, Terminated)
                | (Waiting, Running)
                | (Waiting, Skipped)
                | (Waiting, Error)
                | (Waiting, Terminated)
                | (Running, Finished)
                | (Running, Error)
                | (Running, TimedOut)
                | (Running, Terminated)
                | (TimedOut, Terminated)
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Preparing => "preparing",
            TaskState::Waiting => "waiting",
            TaskState::Running => "running",
            TaskState::TimedOut => "timed_out",
            TaskState::Finished => "finished",
            TaskState::Error => "error",
            TaskState::Skipped => "skipped",
            TaskState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Creation, start and finish times. Each is set at most once.
#[derive(Debug, Clone, Copy)]
pub struct Timestamps {
    pub created: SystemTime,
    pub started: Option<SystemTime>,
    pub finished: Option<SystemTime>,
}

impl Timestamps {
    pub fn new() -> Self {
        Self {
            created: SystemTime::now(),
            started: None,
            finished: None,
        }
    }

    pub(crate) fn mark_started(&mut self) {
        if self.started.is_none() {
            self.started = Some(SystemTime::now().max(self.created));
        }
    }

    pub(crate) fn mark_finished(&mut self) {
        if self.finished.is_none() {
            let floor = self.started.unwrap_or(self.created);
            self.finished = Some(SystemTime::now().max(floor));
        }
    }
}

impl Default for Timestamps {
    fn default() -> Self {
        Self::new()
    }
}

/// Seconds since the Unix epoch, for audit output.
fn epoch_secs(t: SystemTime) -> f64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// Point-in-time copy of a probe, as handed to audit sinks.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub module: String,
    /// Declared name, or empty.
    pub name: String,
    pub state: TaskState,
    pub timed_out: bool,
    pub created: f64,
    pub started: Option<f64>,
    pub finished: Option<f64>,
    pub inputs: BTreeMap<String, String>,
    pub dependencies: Vec<String>,
    pub command: Option<String>,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub result: Option<Value>,
    pub pids: Vec<u32>,
}

impl TaskSnapshot {
    pub(crate) fn times(ts: &Timestamps) -> (f64, Option<f64>, Option<f64>) {
        (
            epoch_secs(ts.created),
            ts.started.map(epoch_secs),
            ts.finished.map(epoch_secs),
        )
    }
}
