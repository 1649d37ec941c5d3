// src/audit.rs

//! Where settled probe records go.
//!
//! Every probe produces exactly one [`TaskSnapshot`] once it reaches a
//! terminal state. Sinks must not block for long: they run on the probe's
//! runner task, before its result is published to dependents.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use tracing::{info, warn};

use crate::errors::Result;
use crate::task::TaskSnapshot;

/// Receiver of settled probe records.
pub trait AuditSink: Send + Sync {
    fn record(&self, snapshot: &TaskSnapshot);
}

/// Discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAudit;

impl AuditSink for NullAudit {
    fn record(&self, _snapshot: &TaskSnapshot) {}
}

/// Emits one structured `info` event per record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAudit;

impl AuditSink for TracingAudit {
    fn record(&self, s: &TaskSnapshot) {
        info!(
            target: "probedag::audit",
            id = s.id.0,
            module = %s.module,
            name = %s.name,
            state = %s.state,
            timed_out = s.timed_out,
            exit_code = ?s.exit_code,
            command = s.command.as_deref().unwrap_or(""),
            result = %s.result.as_ref().map(|v| v.to_string()).unwrap_or_default(),
            "probe record"
        );
    }
}

/// Appends each record as one JSON line to a file.
#[derive(Debug)]
pub struct JsonlAudit {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlAudit {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening audit log {}", path.display()))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAudit {
    fn record(&self, snapshot: &TaskSnapshot) {
        let line = match serde_json::to_string(snapshot) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to serialize probe record");
                return;
            }
        };

        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(file, "{line}") {
            warn!(path = %self.path.display(), error = %e, "failed to write audit record");
        }
    }
}

/// Forwards every record to each inner sink in order.
#[derive(Default, Clone)]
pub struct FanoutAudit {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl std::fmt::Debug for FanoutAudit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutAudit")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl AuditSink for FanoutAudit {
    fn record(&self, snapshot: &TaskSnapshot) {
        for sink in &self.sinks {
            sink.record(snapshot);
        }
    }
}
