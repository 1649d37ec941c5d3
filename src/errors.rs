// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeDagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Duplicate module type: {0}")]
    DuplicateModuleType(String),

    #[error("Unknown module type: {0}")]
    UnknownModuleType(String),

    #[error("Duplicate probe name: {0}")]
    DuplicateProbeName(String),

    #[error("Unknown dependency '{dependency}' referenced by probe {task}")]
    UnknownDependency { task: String, dependency: String },

    #[error("Cycle detected between probes: {0}")]
    DependencyCycle(String),

    #[error("Invalid condition: {0}")]
    Condition(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProbeDagError {
    /// Configuration errors abort a batch before anything runs.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ProbeDagError::ConfigError(_)
                | ProbeDagError::DuplicateModuleType(_)
                | ProbeDagError::UnknownModuleType(_)
                | ProbeDagError::DuplicateProbeName(_)
                | ProbeDagError::UnknownDependency { .. }
                | ProbeDagError::DependencyCycle(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ProbeDagError>;
