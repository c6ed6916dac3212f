//! Importing modules by name through the loader chain.

use std::path::Path;

use rustc_hash::FxHashMap;

use super::chain::LoaderChain;
use super::finder::{ModuleSpec, PathFinder};
use super::module::Module;
use super::provider::{FsProvider, SourceProvider};
use crate::error::ImportError;

/// Resolves names with a [`PathFinder`], loads them with the chain entry
/// that claimed the file and caches the result.
///
/// Modules are cached under their resolved name and under the alias they
/// were requested by. Failed loads are not cached.
pub struct Importer<'c> {
    chain: &'c LoaderChain,
    finder: PathFinder,
    provider: Box<dyn SourceProvider>,
    modules: FxHashMap<String, Module>,
    aliases: FxHashMap<String, String>,
}

impl std::fmt::Debug for Importer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Importer")
            .field("finder", &self.finder)
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<'c> Importer<'c> {
    /// An importer reading from the filesystem.
    pub fn new(chain: &'c LoaderChain, finder: PathFinder) -> Self {
        Self {
            chain,
            finder,
            provider: Box::new(FsProvider),
            modules: FxHashMap::default(),
            aliases: FxHashMap::default(),
        }
    }

    /// Read module bytes through `provider` instead of the filesystem.
    pub fn with_provider(mut self, provider: impl SourceProvider + 'static) -> Self {
        self.provider = Box::new(provider);
        self
    }

    pub fn finder(&self) -> &PathFinder {
        &self.finder
    }

    pub fn finder_mut(&mut self) -> &mut PathFinder {
        &mut self.finder
    }

    fn cached_key(&self, name: &str) -> Option<String> {
        if self.modules.contains_key(name) {
            return Some(name.to_string());
        }
        self.aliases
            .get(name)
            .filter(|key| self.modules.contains_key(key.as_str()))
            .cloned()
    }

    /// Import `name`, returning the cached module when there is one.
    pub fn import(&mut self, name: &str) -> Result<&mut Module, ImportError> {
        let key = match self.cached_key(name) {
            Some(key) => key,
            None => {
                let spec = self
                    .finder
                    .find_spec(name, self.chain)
                    .ok_or_else(|| ImportError::NotFound {
                        name: name.to_string(),
                    })?;
                let key = spec.name().to_string();
                if !self.modules.contains_key(&key) {
                    let module = self.load(&spec)?;
                    self.modules.insert(key.clone(), module);
                }
                if let Some(alias) = spec.alias() {
                    self.aliases.insert(alias.to_string(), key.clone());
                }
                key
            }
        };

        self.modules.get_mut(&key).ok_or_else(|| ImportError::NotFound {
            name: name.to_string(),
        })
    }

    /// Re-read, recompile and re-execute an imported module.
    ///
    /// On failure the previous module stays cached.
    pub fn reload(&mut self, name: &str) -> Result<&mut Module, ImportError> {
        let key = self.cached_key(name).ok_or_else(|| ImportError::NotFound {
            name: name.to_string(),
        })?;
        let spec = match self.modules.get(&key) {
            Some(module) => module.spec().clone(),
            None => {
                return Err(ImportError::NotFound {
                    name: name.to_string(),
                });
            }
        };

        tracing::info!("Reloading {}", key);
        let module = self.load(&spec)?;
        self.modules.insert(key.clone(), module);

        self.modules.get_mut(&key).ok_or_else(|| ImportError::NotFound {
            name: name.to_string(),
        })
    }

    /// Load the file at `path` with the chain entry claiming its extension.
    ///
    /// The module is named after the file stem and is not cached.
    pub fn load_path(&self, path: impl AsRef<Path>) -> Result<Module, ImportError> {
        let path = path.as_ref();
        let handler = self
            .chain
            .handler_for_path(path)
            .ok_or_else(|| ImportError::NoLoader {
                path: path.to_path_buf(),
            })?;

        let name = path
            .file_name()
            .and_then(|f| f.to_str())
            .and_then(|f| f.split('.').next())
            .unwrap_or_default()
            .to_string();
        self.load(&ModuleSpec::new(name, path, handler))
    }

    /// Drop `name` from the cache, along with its aliases.
    ///
    /// Every alias that pointed at the module is unbound in the finder, so
    /// the next import of it resolves afresh.
    pub fn forget(&mut self, name: &str) -> Option<Module> {
        let key = self.cached_key(name)?;

        let mut unbound = Vec::new();
        self.aliases.retain(|alias, target| {
            let keep = *target != key;
            if !keep {
                unbound.push(alias.clone());
            }
            keep
        });
        if let Some(alias) = self.modules.get(&key).and_then(|m| m.spec().alias()) {
            unbound.push(alias.to_string());
        }
        unbound.push(name.to_string());

        for alias in &unbound {
            self.finder.unbind(alias);
        }
        self.modules.remove(&key)
    }

    /// Cached module, without importing.
    pub fn get(&self, name: &str) -> Option<&Module> {
        self.cached_key(name).and_then(|key| self.modules.get(&key))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cached_key(name).is_some()
    }

    /// Names of the cached modules, sorted.
    pub fn module_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.modules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn load(&self, spec: &ModuleSpec) -> Result<Module, ImportError> {
        let loader = spec.loader();
        tracing::debug!("Loading {} with {}", spec.name(), loader.name());
        let mut module = loader.create_module(spec, self.provider.as_ref())?;
        loader.exec_module(&mut module)?;
        Ok(module)
    }
}
