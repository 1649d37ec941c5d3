// src/config/validate.rs

use crate::config::model::{ConfigFile, ModuleDef, ProbeDef, RawConfigFile};
use crate::errors::{ProbeDagError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::ProbeDagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.module, raw.probe))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_global_config(cfg)?;
    for (name, def) in cfg.module.iter() {
        validate_module_def(name, def)?;
    }
    validate_probes(&cfg.probe)?;
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if !cfg.config.default_timeout.is_finite() {
        return Err(ProbeDagError::ConfigError(
            "[config].default_timeout must be a finite number of seconds".to_string(),
        ));
    }

    if cfg.config.max_concurrency == Some(0) {
        return Err(ProbeDagError::ConfigError(
            "[config].max_concurrency must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

/// A module must name exactly one of `command` / `argv`, and `argv` needs at
/// least a program.
pub fn validate_module_def(name: &str, def: &ModuleDef) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ProbeDagError::ConfigError(
            "module type name must not be empty".to_string(),
        ));
    }

    match (&def.command, &def.argv) {
        (Some(_), Some(_)) => {
            return Err(ProbeDagError::ConfigError(format!(
                "module '{name}' sets both `command` and `argv`"
            )));
        }
        (None, None) => {
            return Err(ProbeDagError::ConfigError(format!(
                "module '{name}' needs either `command` or `argv`"
            )));
        }
        (Some(command), None) if command.trim().is_empty() => {
            return Err(ProbeDagError::ConfigError(format!(
                "module '{name}' has an empty `command`"
            )));
        }
        (None, Some(argv)) if argv.is_empty() || argv[0].trim().is_empty() => {
            return Err(ProbeDagError::ConfigError(format!(
                "module '{name}' has an empty `argv`"
            )));
        }
        _ => {}
    }

    if let Some(timeout) = def.timeout {
        if !timeout.is_finite() {
            return Err(ProbeDagError::ConfigError(format!(
                "module '{name}' has a non-finite timeout"
            )));
        }
    }

    Ok(())
}

/// Shape checks on probe definitions. Names, types and dependencies are
/// resolved later by the scope, which owns those errors.
pub fn validate_probes(probes: &[ProbeDef]) -> Result<()> {
    for (idx, probe) in probes.iter().enumerate() {
        if probe.kind.trim().is_empty() {
            return Err(ProbeDagError::ConfigError(format!(
                "probe #{idx} has an empty `type`"
            )));
        }
        if let Some(name) = &probe.name {
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '~') {
                return Err(ProbeDagError::ConfigError(format!(
                    "probe #{idx} has invalid name '{name}' (use letters, digits, `_` or `~`)"
                )));
            }
        }
    }
    Ok(())
}
