// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer};

/// Top-level configuration as read from `Probedag.toml`.
///
/// ```toml
/// [config]
/// default_timeout = 300
/// max_concurrency = 8
/// module_paths = ["modules"]
///
/// [module.filechange]
/// argv = ["python3", "scripts/probes/filechange.py", "{old}", "{new}"]
/// timeout = 30
///
/// [[probe]]
/// type = "filechange"
/// name = "readme_changed"
/// config = { old = "{previous}/README.md", new = "{current}/README.md" }
/// ```
///
/// All sections are optional.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    /// Modules declared inline, keyed by type name.
    #[serde(default)]
    pub module: BTreeMap<String, ModuleDef>,

    /// The default batch, in declaration order.
    #[serde(default)]
    pub probe: Vec<ProbeDef>,
}

/// Validated configuration. Construct through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub module: BTreeMap<String, ModuleDef>,
    pub probe: Vec<ProbeDef>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        module: BTreeMap<String, ModuleDef>,
        probe: Vec<ProbeDef>,
    ) -> Self {
        Self {
            config,
            module,
            probe,
        }
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Timeout in seconds for probes whose module and inputs don't set one.
    /// Zero or negative disables the timeout.
    #[serde(default = "default_timeout")]
    pub default_timeout: f64,

    /// Upper bound on probes running at the same time. `None` means one per
    /// available CPU.
    #[serde(default)]
    pub max_concurrency: Option<usize>,

    /// Directories or files holding `[module.<type>]` definitions. Relative
    /// paths are resolved against the config file's directory.
    #[serde(default)]
    pub module_paths: Vec<PathBuf>,

    /// Optional JSON-lines file receiving one audit record per finished probe.
    #[serde(default)]
    pub audit_log: Option<PathBuf>,
}

fn default_timeout() -> f64 {
    300.0
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            default_timeout: default_timeout(),
            max_concurrency: None,
            module_paths: Vec::new(),
            audit_log: None,
        }
    }
}

/// One `[module.<type>]` table.
///
/// Exactly one of `command` (a shell line) or `argv` (program + arguments)
/// must be present.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ModuleDef {
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub argv: Option<Vec<String>>,

    /// Default timeout in seconds for probes of this type.
    #[serde(default)]
    pub timeout: Option<f64>,

    #[serde(default)]
    pub description: Option<String>,
}

/// A file containing only module definitions.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ModuleFile {
    #[serde(default)]
    pub module: BTreeMap<String, ModuleDef>,
}

/// One probe in a batch.
///
/// The same shape is accepted from TOML (`[[probe]]`) and from JSON probe
/// files (`[{ "type": ..., "name": ..., "config": {...} }]`).
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ProbeDef {
    /// Module type implementing this probe.
    #[serde(rename = "type")]
    pub kind: String,

    /// Optional name other probes use to depend on this probe's result.
    #[serde(default)]
    pub name: Option<String>,

    /// Input templates. `condition` and `timeout` are reserved keys read by
    /// the probe itself; every other key is module configuration.
    #[serde(default, alias = "inputs", deserialize_with = "scalar_map")]
    pub config: BTreeMap<String, String>,
}

impl ProbeDef {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: None,
            config: BTreeMap::new(),
        }
    }
}

/// A standalone batch file in TOML form.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct BatchFile {
    #[serde(default)]
    pub probe: Vec<ProbeDef>,
}

/// Input values may be written as strings, numbers or booleans; they are all
/// templates, so keep their textual form.
#[derive(Deserialize)]
#[serde(untagged)]
enum InputScalar {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl InputScalar {
    fn into_string(self) -> String {
        match self {
            InputScalar::Str(s) => s,
            InputScalar::Int(i) => i.to_string(),
            InputScalar::Float(f) => f.to_string(),
            InputScalar::Bool(b) => b.to_string(),
        }
    }
}

fn scalar_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, InputScalar>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(k, v)| (k, v.into_string()))
        .collect())
}
