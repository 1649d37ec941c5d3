#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use probedag::config::{ModuleDef, ProbeDef};
use probedag::modules::{Module, ModuleRegistry};

/// Builder for `ProbeDef` to simplify test setup.
pub struct ProbeDefBuilder {
    probe: ProbeDef,
}

impl ProbeDefBuilder {
    pub fn new(kind: &str) -> Self {
        Self {
            probe: ProbeDef::new(kind),
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.probe.name = Some(name.to_string());
        self
    }

    pub fn input(mut self, key: &str, value: &str) -> Self {
        self.probe.config.insert(key.to_string(), value.to_string());
        self
    }

    pub fn condition(self, condition: &str) -> Self {
        self.input("condition", condition)
    }

    pub fn timeout(self, seconds: f64) -> Self {
        self.input("timeout", &seconds.to_string())
    }

    pub fn build(self) -> ProbeDef {
        self.probe
    }
}

/// Builder for `ModuleRegistry`.
#[derive(Default)]
pub struct RegistryBuilder {
    registry: ModuleRegistry,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Module running `line` through `sh -c`.
    pub fn shell(mut self, name: &str, line: &str) -> Self {
        self.registry
            .insert(Module::shell(name, line))
            .expect("duplicate module in test registry");
        self
    }

    /// Module running `argv` directly.
    pub fn argv(mut self, name: &str, argv: &[&str]) -> Self {
        self.registry
            .insert(Module::argv(name, argv.iter().copied()))
            .expect("duplicate module in test registry");
        self
    }

    pub fn module(mut self, module: Module) -> Self {
        self.registry
            .insert(module)
            .expect("duplicate module in test registry");
        self
    }

    pub fn build(self) -> ModuleRegistry {
        self.registry
    }

    pub fn build_arc(self) -> Arc<ModuleRegistry> {
        Arc::new(self.registry)
    }
}

/// The registry most scheduler tests need:
///
/// - `echo`: prints its `text` input (argv, no shell)
/// - `sh`: runs its `cmd` input as a shell script
/// - `sleep`: sleeps `secs` then prints `slept`
/// - `fail`: writes `boom` to stderr
pub fn standard_registry() -> Arc<ModuleRegistry> {
    RegistryBuilder::new()
        .argv("echo", &["echo", "{text}"])
        .argv("sh", &["sh", "-c", "{cmd}"])
        .shell("sleep", "sleep {secs} && echo slept")
        .shell("fail", "echo boom >&2")
        .build_arc()
}

/// `ModuleDef` for a shell line.
pub fn shell_def(line: &str) -> ModuleDef {
    ModuleDef {
        command: Some(line.to_string()),
        ..ModuleDef::default()
    }
}

/// `ModuleDef` for an argv vector.
pub fn argv_def(argv: &[&str]) -> ModuleDef {
    ModuleDef {
        argv: Some(argv.iter().map(|s| s.to_string()).collect()),
        ..ModuleDef::default()
    }
}

/// Map of module definitions from `(name, def)` pairs.
pub fn defs(entries: Vec<(&str, ModuleDef)>) -> BTreeMap<String, ModuleDef> {
    entries
        .into_iter()
        .map(|(name, def)| (name.to_string(), def))
        .collect()
}
