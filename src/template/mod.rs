// src/template/mod.rs

//! Placeholder templates.
//!
//! - [`placeholder`] substitutes `{name}` placeholders and extracts the set
//!   of names a template references.
//! - [`condition`] parses and evaluates the small boolean grammar used by a
//!   probe's `condition` input.

pub mod condition;
pub mod placeholder;

pub use condition::Condition;
pub use placeholder::{quote, referenced_names, substitute};
