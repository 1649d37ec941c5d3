use std::sync::{Arc, Mutex};

use probedag::audit::AuditSink;
use probedag::task::TaskSnapshot;

/// Audit sink that keeps every record in memory, in arrival order.
#[derive(Debug, Default, Clone)]
pub struct RecordingAudit {
    records: Arc<Mutex<Vec<TaskSnapshot>>>,
}

impl RecordingAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TaskSnapshot> {
        self.records.lock().unwrap().clone()
    }

    /// Names of recorded probes in arrival order (unnamed probes as `type#id`).
    pub fn order(&self) -> Vec<String> {
        self.records()
            .iter()
            .map(|r| {
                if r.name.is_empty() {
                    format!("{}{}", r.module, r.id)
                } else {
                    r.name.clone()
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for RecordingAudit {
    fn record(&self, snapshot: &TaskSnapshot) {
        self.records.lock().unwrap().push(snapshot.clone());
    }
}
