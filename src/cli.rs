// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `probedag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "probedag",
    version,
    about = "Run batches of probe commands ordered by the results they reference.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Probedag.toml` in the current working directory. A missing
    /// default config is not an error when `--batch` is given.
    #[arg(long, value_name = "PATH", default_value = "Probedag.toml")]
    pub config: PathBuf,

    /// Batch file (`.toml` or `.json`) or directory of batch files. Each
    /// file runs as its own batch. Repeatable.
    ///
    /// Without it, the `[[probe]]` entries of the config run as one batch.
    #[arg(long, value_name = "PATH")]
    pub batch: Vec<PathBuf>,

    /// Extra module definition files or directories, loaded after the
    /// config's `module_paths`. Later definitions override earlier ones.
    #[arg(long = "modules", value_name = "PATH")]
    pub modules: Vec<PathBuf>,

    /// Value of the `{current}` binding.
    #[arg(long, value_name = "VALUE", default_value = ".")]
    pub current: String,

    /// Value of the `{previous}` binding.
    #[arg(long, value_name = "VALUE", default_value = ".")]
    pub previous: String,

    /// Extra seed binding as `KEY=VALUE`. Repeatable.
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub vars: Vec<(String, String)>,

    /// Upper bound on concurrently running probes (overrides the config).
    #[arg(long, value_name = "N")]
    pub max_concurrency: Option<usize>,

    /// Timeout in seconds for probes without one (overrides the config).
    #[arg(long, value_name = "SECS", allow_negative_numbers = true)]
    pub default_timeout: Option<f64>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PROBEDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print modules, probes and inferred dependencies,
    /// but don't execute any commands.
    #[arg(long)]
    pub dry_run: bool,
}

impl CliArgs {
    /// Seed bindings in the order they are applied (later keys win).
    pub fn seed(&self) -> Vec<(String, String)> {
        let mut seed = vec![
            ("current".to_string(), self.current.clone()),
            ("previous".to_string(), self.previous.clone()),
        ];
        seed.extend(self.vars.iter().cloned());
        seed
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
