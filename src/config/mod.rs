// src/config/mod.rs

//! Configuration loading and validation for probedag.
//!
//! Responsibilities:
//! - Define the TOML/JSON-backed data model (`model.rs`).
//! - Load config, module and batch files from disk (`loader.rs`).
//! - Validate basic invariants like well-formed modules (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{discover_batches, load_and_validate, load_batch, load_from_path, load_module_file};
pub use model::{BatchFile, ConfigFile, ConfigSection, ModuleDef, ModuleFile, ProbeDef, RawConfigFile};
