// src/dag/mod.rs

//! Dependency bookkeeping.
//!
//! - [`scope`] owns the binding table and the graph metadata (names,
//!   blocking counts, waiters) and releases probes as dependencies resolve.
//! - [`graph`] checks the inferred graph for cycles before anything runs.

pub mod graph;
pub mod scope;

pub use graph::{check_acyclic, topological_order};
pub use scope::{Bindings, Lookup, Scope};
