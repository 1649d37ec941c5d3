// src/types.rs

use std::fmt;

use serde::Serialize;

/// Canonical probe name type used throughout the engine.
pub type TaskName = String;

/// Position of a task in its batch's task list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(pub usize);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A resolved binding value.
///
/// - `Text`: a seed value or the stdout of a finished probe.
/// - `Failed`: the failure sentinel bound by a probe that errored, timed out
///   or was terminated. Renders as `false`.
/// - `Skipped`: bound by a probe whose condition evaluated to false so that
///   its dependents still unblock. Renders as the empty string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Failed,
    Skipped,
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Value::Failed)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Value::Skipped)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Failed => f.write_str("false"),
            Value::Skipped => Ok(()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

/// Audit records show `Text` as a string, `Failed` as `false` and `Skipped`
/// as `null`.
impl Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Text(text) => s.serialize_str(text),
            Value::Failed => s.serialize_bool(false),
            Value::Skipped => s.serialize_none(),
        }
    }
}
