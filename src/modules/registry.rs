// src/modules/registry.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::loader::{collect_files, load_module_file};
use crate::config::model::ModuleDef;
use crate::errors::{ProbeDagError, Result};

use super::Module;

/// Maps a probe type name to its [`Module`].
///
/// Built once, then only read; modules are handed out as `Arc<Module>` so
/// concurrently running probes share them without locking.
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, Arc<Module>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every module definition found under `paths`.
    ///
    /// Each path is either a single TOML file or a directory searched
    /// recursively for `*.toml` files (in sorted order). A type name defined
    /// twice anywhere across `paths` is a fatal [`ProbeDagError::DuplicateModuleType`].
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut registry = Self::new();

        for path in paths {
            for file in module_files(path.as_ref())? {
                let parsed = load_module_file(&file)?;
                debug!(file = %file.display(), count = parsed.module.len(), "loaded module file");
                registry.extend_defs(&parsed.module)?;
            }
        }

        info!(modules = registry.len(), "module registry loaded");
        Ok(registry)
    }

    /// Build a registry from in-memory definitions.
    pub fn from_defs(defs: &BTreeMap<String, ModuleDef>) -> Result<Self> {
        let mut registry = Self::new();
        registry.extend_defs(defs)?;
        Ok(registry)
    }

    /// Add definitions, rejecting any type name already present.
    pub fn extend_defs(&mut self, defs: &BTreeMap<String, ModuleDef>) -> Result<()> {
        for (name, def) in defs {
            self.insert(Module::from_def(name, def)?)?;
        }
        Ok(())
    }

    /// Add one module; duplicates are an error.
    pub fn insert(&mut self, module: Module) -> Result<()> {
        if self.modules.contains_key(&module.name) {
            return Err(ProbeDagError::DuplicateModuleType(module.name));
        }
        self.modules.insert(module.name.clone(), Arc::new(module));
        Ok(())
    }

    /// Layer `child` on top of `self`: the child's modules replace or extend
    /// the parent's, keyed by type name.
    pub fn overlay(mut self, child: ModuleRegistry) -> Self {
        for (name, module) in child.modules {
            if self.modules.insert(name.clone(), module).is_some() {
                debug!(module = %name, "module overridden by child registry");
            }
        }
        self
    }

    pub fn get(&self, type_name: &str) -> Result<Arc<Module>> {
        self.modules
            .get(type_name)
            .cloned()
            .ok_or_else(|| ProbeDagError::UnknownModuleType(type_name.to_string()))
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.modules.contains_key(type_name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn modules(&self) -> impl Iterator<Item = &Arc<Module>> {
        self.modules.values()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

fn module_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files = Vec::new();
    collect_files(path, &["toml"], &mut files)?;
    files.sort();
    Ok(files)
}
