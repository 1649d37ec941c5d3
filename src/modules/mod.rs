// src/modules/mod.rs

//! Probe modules: reusable command templates keyed by type name.
//!
//! - [`Module`] is one loaded definition.
//! - [`registry`] loads definitions from disk and answers lookups. It is
//!   read-only once built and shared between every probe of a batch.

pub mod registry;

use std::collections::BTreeSet;
use std::fmt;

use crate::config::model::ModuleDef;
use crate::config::validate::validate_module_def;
use crate::errors::{ProbeDagError, Result};
use crate::template::referenced_names;

pub use registry::ModuleRegistry;

/// How a module's command is turned into a process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandTemplate {
    /// A single line handed to `sh -c`. Substituted values are shell-quoted.
    Shell(String),
    /// Program plus arguments, each element substituted on its own and
    /// passed verbatim without a shell.
    Argv(Vec<String>),
}

impl CommandTemplate {
    /// Template strings making up this command.
    pub fn parts(&self) -> Vec<&str> {
        match self {
            CommandTemplate::Shell(line) => vec![line.as_str()],
            CommandTemplate::Argv(argv) => argv.iter().map(String::as_str).collect(),
        }
    }

    pub fn referenced_names(&self) -> BTreeSet<String> {
        self.parts()
            .into_iter()
            .flat_map(referenced_names)
            .collect()
    }
}

impl fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandTemplate::Shell(line) => write!(f, "sh -c {line:?}"),
            CommandTemplate::Argv(argv) => write!(f, "{argv:?}"),
        }
    }
}

/// A named command template plus type-level defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: String,
    pub command: CommandTemplate,
    /// Default timeout in seconds; `<= 0` disables it.
    pub timeout: Option<f64>,
    pub description: Option<String>,
}

impl Module {
    pub fn from_def(name: &str, def: &ModuleDef) -> Result<Self> {
        validate_module_def(name, def)?;

        let command = match (&def.command, &def.argv) {
            (Some(line), None) => CommandTemplate::Shell(line.clone()),
            (None, Some(argv)) => CommandTemplate::Argv(argv.clone()),
            _ => {
                return Err(ProbeDagError::ConfigError(format!(
                    "module '{name}' needs exactly one of `command` or `argv`"
                )));
            }
        };

        Ok(Self {
            name: name.to_string(),
            command,
            timeout: def.timeout,
            description: def.description.clone(),
        })
    }

    pub fn shell(name: impl Into<String>, line: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: CommandTemplate::Shell(line.into()),
            timeout: None,
            description: None,
        }
    }

    pub fn argv<I, S>(name: impl Into<String>, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            command: CommandTemplate::Argv(argv.into_iter().map(Into::into).collect()),
            timeout: None,
            description: None,
        }
    }

    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout = Some(seconds);
        self
    }
}
