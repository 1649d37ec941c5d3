// src/lib.rs

pub mod audit;
pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod modules;
pub mod task;
pub mod template;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::audit::{AuditSink, FanoutAudit, JsonlAudit, TracingAudit};
use crate::cli::CliArgs;
use crate::config::loader::{default_config_path, discover_batches, load_and_validate, load_batch};
use crate::config::model::{ConfigFile, ConfigSection, ProbeDef};
use crate::dag::topological_order;
use crate::engine::{BatchHandle, Settings, prepare_batch, run_batch};
use crate::modules::ModuleRegistry;
use crate::types::Value;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config, module and batch loading
/// - the audit sinks
/// - one scheduler run per batch, in order
/// - Ctrl-C handling (cancels the running batch)
///
/// Returns whether every probe of every batch finished or was skipped.
pub async fn run(args: CliArgs) -> Result<bool> {
    let cfg = load_config(&args)?;
    let registry = Arc::new(build_registry(&cfg, &args.modules)?);
    let settings = settings_from(&cfg.config, &args);
    let batches = collect_batches(&cfg, &args.batch)?;
    let seed = args.seed();

    if args.dry_run {
        print_dry_run(&registry, &batches, &seed, &settings)?;
        return Ok(true);
    }

    let audit = build_audit(&cfg.config)?;

    let mut all_ok = true;
    for (label, defs) in &batches {
        info!(batch = %label, probes = defs.len(), "running batch");

        let mut handle = run_batch(
            defs,
            seed.clone(),
            Arc::clone(&registry),
            settings,
            Arc::clone(&audit),
        )
        .with_context(|| format!("starting batch {label}"))?;

        let interrupted = wait_or_interrupt(&mut handle).await;
        print_summary(label, &handle);
        all_ok &= handle.summary().all_ok();

        if interrupted {
            warn!("interrupted; remaining batches are not run");
            return Ok(false);
        }
    }

    Ok(all_ok)
}

/// Wait for the batch, cancelling it on Ctrl-C. Returns whether it was
/// interrupted.
async fn wait_or_interrupt(handle: &mut BatchHandle) -> bool {
    tokio::select! {
        _ = handle.wait() => return false,
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "failed to listen for Ctrl+C");
            }
        }
    }

    handle.cancel();
    handle.wait().await;
    true
}

/// Load the config file, tolerating a missing default config when the
/// batches come from `--batch`.
fn load_config(args: &CliArgs) -> Result<ConfigFile> {
    let path = &args.config;
    if !path.exists() && *path == default_config_path() && !args.batch.is_empty() {
        debug!(path = %path.display(), "no config file; using defaults");
        return Ok(ConfigFile::new_unchecked(
            ConfigSection::default(),
            Default::default(),
            Vec::new(),
        ));
    }

    load_and_validate(path).with_context(|| format!("loading config {}", path.display()))
}

/// Modules from `module_paths` plus inline `[module.*]` tables (a type
/// defined in both is a duplicate), overridden by `--modules` paths.
fn build_registry(cfg: &ConfigFile, extra: &[PathBuf]) -> Result<ModuleRegistry> {
    let mut registry = ModuleRegistry::load(&cfg.config.module_paths)?;
    registry.extend_defs(&cfg.module)?;
    if !extra.is_empty() {
        registry = registry.overlay(ModuleRegistry::load(extra)?);
    }
    Ok(registry)
}

fn settings_from(section: &ConfigSection, args: &CliArgs) -> Settings {
    let mut settings = Settings::from(section);
    if let Some(timeout) = args.default_timeout {
        settings.default_timeout = Some(timeout);
    }
    if args.max_concurrency.is_some() {
        settings.max_concurrency = args.max_concurrency;
    }
    settings
}

/// The batches to run, labelled for logs: every `--batch` file (directories
/// expanded), else the config's own `[[probe]]` list.
fn collect_batches(cfg: &ConfigFile, paths: &[PathBuf]) -> Result<Vec<(String, Vec<ProbeDef>)>> {
    if paths.is_empty() {
        return Ok(vec![("config".to_string(), cfg.probe.clone())]);
    }

    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(discover_batches(path)?);
        } else {
            files.push(path.clone());
        }
    }

    files
        .into_iter()
        .map(|file| {
            let defs = load_batch(&file)
                .with_context(|| format!("loading batch {}", file.display()))?;
            Ok((file.display().to_string(), defs))
        })
        .collect()
}

fn build_audit(section: &ConfigSection) -> Result<Arc<dyn AuditSink>> {
    let mut audit = FanoutAudit::new().with(Arc::new(TracingAudit));
    if let Some(path) = &section.audit_log {
        audit = audit.with(Arc::new(JsonlAudit::open(path)?));
    }
    Ok(Arc::new(audit))
}

fn print_summary(label: &str, handle: &BatchHandle) {
    let summary = handle.summary();
    println!(
        "batch {label}: {} finished, {} skipped, {} error, {} terminated",
        summary.finished, summary.skipped, summary.error, summary.terminated
    );
    for snap in handle.snapshots() {
        let who = if snap.name.is_empty() {
            format!("{}{}", snap.module, snap.id)
        } else {
            snap.name.clone()
        };
        let result = snap.result.as_ref().map(Value::to_string).unwrap_or_default();
        println!("  - {who} [{}] {result}", snap.state);
    }
}

/// Print modules, then per batch the probes, their inferred dependencies
/// and a launch order. Nothing is executed.
fn print_dry_run(
    registry: &ModuleRegistry,
    batches: &[(String, Vec<ProbeDef>)],
    seed: &[(String, String)],
    settings: &Settings,
) -> Result<()> {
    println!("probedag dry-run");
    println!("  default_timeout = {:?}", settings.default_timeout);
    println!("  max_concurrency = {}", settings.effective_max_concurrency());
    println!();

    println!("modules ({}):", registry.len());
    for module in registry.modules() {
        println!("  - {}", module.name);
        println!("      command: {}", module.command);
        if let Some(timeout) = module.timeout {
            println!("      timeout: {timeout}");
        }
        if let Some(ref description) = module.description {
            println!("      description: {description}");
        }
    }

    for (label, defs) in batches {
        let (scope, _ready_rx) = prepare_batch(defs, seed.iter().cloned(), registry, settings)
            .with_context(|| format!("preparing batch {label}"))?;

        println!();
        println!("batch {label} ({} probes):", scope.len());
        for id in topological_order(&scope)? {
            let Some(task) = scope.task(id) else { continue };
            println!("  - {} (type {})", task.label(), task.module().name);
            let deps = task.dependencies();
            if !deps.is_empty() {
                println!("      after: {deps:?}");
            }
            if let Some(condition) = task.condition() {
                println!("      condition: {condition}");
            }
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
