// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{BatchFile, ConfigFile, ModuleFile, ProbeDef, RawConfigFile};
use crate::config::validate::validate_probes;
use crate::errors::{ProbeDagError, Result};

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run basic validation.
///
/// Relative `module_paths` and `audit_log` are rebased onto the config
/// file's directory so the rest of the application can use them directly.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let raw_config = load_from_path(path)?;
    let mut config = ConfigFile::try_from(raw_config)?;

    let root = config_root_dir(path);
    config.config.module_paths = config
        .config
        .module_paths
        .iter()
        .map(|p| root.join(p))
        .collect();
    if let Some(audit) = config.config.audit_log.take() {
        config.config.audit_log = Some(root.join(audit));
    }

    Ok(config)
}

/// Read a module definition file (`[module.<type>]` tables).
pub fn load_module_file(path: impl AsRef<Path>) -> Result<ModuleFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    Ok(toml::from_str(&contents)?)
}

/// Read a standalone batch file.
///
/// - `*.json`: an array of probe objects (`type`, `name`, `config`).
/// - anything else: TOML with a `[[probe]]` array.
pub fn load_batch(path: impl AsRef<Path>) -> Result<Vec<ProbeDef>> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let probes: Vec<ProbeDef> = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&contents)?,
        _ => toml::from_str::<BatchFile>(&contents)?.probe,
    };

    validate_probes(&probes)?;
    Ok(probes)
}

/// Collect batch files below `dir` (recursively), sorted by path.
///
/// Each `*.json` or `*.toml` file is one batch.
pub fn discover_batches(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    collect_files(dir.as_ref(), &["json", "toml"], &mut found)?;
    found.sort();
    Ok(found)
}

pub(crate) fn collect_files(dir: &Path, extensions: &[&str], out: &mut Vec<PathBuf>) -> Result<()> {
    if !dir.is_dir() {
        return Err(ProbeDagError::ConfigError(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, extensions, out)?;
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| extensions.contains(&ext))
        {
            out.push(path);
        }
    }
    Ok(())
}

/// Helper to resolve a default config path.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Probedag.toml")
}

/// Directory holding the config file.
///
/// A bare filename like "Probedag.toml" (parent = "") resolves to ".".
pub fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
