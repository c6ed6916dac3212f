//! Locating modules on the search paths.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::chain::LoaderChain;
use super::fuzzy::fuzzy_file_search;
use super::handler::ModuleLoader;

/// A located module: its name, file and the loader that will load it.
#[derive(Clone)]
pub struct ModuleSpec {
    name: String,
    origin: PathBuf,
    alias: Option<String>,
    loader: Arc<dyn ModuleLoader>,
}

impl ModuleSpec {
    pub fn new(name: impl Into<String>, origin: impl Into<PathBuf>, loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            name: name.into(),
            origin: origin.into(),
            alias: None,
            loader,
        }
    }

    /// Record the (fuzzy) name the module was requested by.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Dotted module name matching the file found.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> &Path {
        &self.origin
    }

    /// The requested name, when it differs from [`name`](Self::name).
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn loader(&self) -> &Arc<dyn ModuleLoader> {
        &self.loader
    }
}

impl fmt::Debug for ModuleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleSpec")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .field("alias", &self.alias)
            .field("loader", &self.loader.name())
            .finish()
    }
}

/// Finds module files for dotted names.
///
/// `pkg.sub.name` is looked up as `<dir>/pkg/sub/name<ext>` in every search
/// path, trying chain entries in order and each entry's extensions in order.
/// When that fails and the last component holds an underscore, the name is
/// retried fuzzily and the result is bound as an alias, so later lookups of
/// the same name resolve to the same file even when new candidates appear.
#[derive(Debug, Clone)]
pub struct PathFinder {
    search_paths: Vec<PathBuf>,
    fuzzy: bool,
    aliases: FxHashMap<String, ModuleSpec>,
}

impl PathFinder {
    pub fn new<I, P>(search_paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            search_paths: search_paths.into_iter().map(Into::into).collect(),
            fuzzy: true,
            aliases: FxHashMap::default(),
        }
    }

    /// Enable or disable fuzzy lookup (enabled by default).
    pub fn fuzzy(mut self, enabled: bool) -> Self {
        self.fuzzy = enabled;
        self
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    pub fn push_path(&mut self, path: impl Into<PathBuf>) {
        self.search_paths.push(path.into());
    }

    /// The fuzzy name bound to `alias`, if any.
    pub fn alias(&self, alias: &str) -> Option<&ModuleSpec> {
        self.aliases.get(alias)
    }

    /// Drop an alias binding.
    pub fn unbind(&mut self, alias: &str) -> Option<ModuleSpec> {
        self.aliases.remove(alias)
    }

    pub fn find_spec(&mut self, name: &str, chain: &LoaderChain) -> Option<ModuleSpec> {
        if let Some(spec) = self.aliases.get(name) {
            return Some(spec.clone());
        }

        let (parents, last) = split_name(name);
        let entries = chain.snapshot();

        for dir in &self.search_paths {
            let base = parents.iter().fold(dir.clone(), |path, part| path.join(part));
            for entry in &entries {
                for ext in entry.extensions() {
                    let candidate = base.join(format!("{last}{ext}"));
                    if candidate.is_file() {
                        tracing::debug!("Found {} at {}", name, candidate.display());
                        return Some(ModuleSpec::new(name, candidate, Arc::clone(entry.handler())));
                    }
                }
            }
        }

        if !self.fuzzy || !last.contains('_') {
            return None;
        }

        for dir in &self.search_paths {
            let base = parents.iter().fold(dir.clone(), |path, part| path.join(part));
            let mut candidates: Vec<(PathBuf, &str, &Arc<dyn ModuleLoader>)> = Vec::new();
            for entry in &entries {
                for ext in entry.extensions() {
                    for path in fuzzy_file_search(&base, last, std::slice::from_ref(ext)) {
                        candidates.push((path, ext.as_str(), entry.handler()));
                    }
                }
            }
            // First entry wins for equal paths, so the stable sort keeps chain order.
            candidates.sort_by(|a, b| a.0.cmp(&b.0));

            let Some((path, ext, handler)) = candidates.into_iter().next() else {
                continue;
            };
            let Some(stem) = path
                .file_name()
                .and_then(|f| f.to_str())
                .and_then(|f| f.strip_suffix(ext))
                .and_then(|stem| stem.split('.').next())
            else {
                continue;
            };

            let resolved = parents
                .iter()
                .copied()
                .chain(std::iter::once(stem))
                .collect::<Vec<_>>()
                .join(".");
            let spec = ModuleSpec::new(resolved, path.clone(), Arc::clone(handler));
            let spec = if spec.name() == name {
                spec
            } else {
                spec.with_alias(name)
            };

            tracing::debug!("Fuzzy match {} -> {}", name, path.display());
            self.aliases.insert(name.to_string(), spec.clone());
            return Some(spec);
        }

        None
    }
}

/// Split `a.b.c` into `([a, b], c)`.
fn split_name(name: &str) -> (Vec<&str>, &str) {
    match name.rsplit_once('.') {
        Some((parents, last)) => (parents.split('.').collect(), last),
        None => (Vec::new(), name),
    }
}
