// src/engine/mod.rs

//! Batch orchestration.
//!
//! [`run_batch`] wires a batch together: it builds the [`Scope`], creates and
//! prepares every probe, checks for cycles, starts the dispatcher from
//! [`crate::exec`] and releases the probes that can run immediately. The
//! returned [`BatchHandle`] is how callers wait for, inspect or cancel it.
//!
//! [`Scope`]: crate::dag::Scope

pub mod driver;

pub use driver::{BatchHandle, BatchSummary, prepare_batch, run_batch};

use crate::config::model::ConfigSection;

/// Batch-wide execution settings.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Settings {
    /// Timeout in seconds for probes whose module and inputs set none.
    /// Zero or negative disables it.
    pub default_timeout: Option<f64>,
    /// Upper bound on concurrently running probes. `None` means the number
    /// of available CPUs, but never fewer than [`MIN_DEFAULT_CONCURRENCY`].
    pub max_concurrency: Option<usize>,
}

/// Floor for the default worker count. Probes mostly wait on child
/// processes, so the CPU count alone would serialize them on small hosts.
pub const MIN_DEFAULT_CONCURRENCY: usize = 16;

impl Settings {
    pub fn effective_max_concurrency(&self) -> usize {
        self.max_concurrency
            .filter(|&n| n > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
                    .max(MIN_DEFAULT_CONCURRENCY)
            })
    }
}

impl From<&ConfigSection> for Settings {
    fn from(section: &ConfigSection) -> Self {
        Self {
            default_timeout: Some(section.default_timeout),
            max_concurrency: section.max_concurrency,
        }
    }
}
