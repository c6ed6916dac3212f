//! The ordered, process-wide chain of module loaders.
//!
//! Entries are `(handler, extensions)` pairs checked front to back; the first
//! entry claiming a file wins. Every mutation happens in one critical
//! section, and a [`ChainGuard`] removes exactly the entry it created, no
//! matter what was attached or released in between.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

use super::handler::{HandlerId, ModuleLoader, unwrap_loader};
use crate::error::ChainError;

static GLOBAL: LazyLock<LoaderChain> = LazyLock::new(LoaderChain::new);

/// Identity of one chain entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u64);

impl EntryId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Where [`LoaderChain::attach`] inserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChainPosition {
    /// Checked first.
    #[default]
    Front,
    /// Checked last.
    Back,
    /// At this index, clamped to the chain length.
    At(usize),
}

/// A handler and the file extensions it claims.
#[derive(Clone)]
pub struct ChainEntry {
    id: EntryId,
    handler: Arc<dyn ModuleLoader>,
    extensions: Vec<String>,
}

impl ChainEntry {
    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn handler(&self) -> &Arc<dyn ModuleLoader> {
        &self.handler
    }

    /// Extensions including the leading dot, e.g. `.ipynb`.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Identity of the unwrapped handler.
    pub fn handler_id(&self) -> HandlerId {
        unwrap_loader(self.handler.as_ref()).id()
    }

    /// The extension this entry claims for `path`, if any.
    pub fn claims(&self, path: &Path) -> Option<&str> {
        let file_name = path.file_name()?.to_str()?;
        self.extensions
            .iter()
            .find(|ext| file_name.len() > ext.len() && file_name.ends_with(ext.as_str()))
            .map(String::as_str)
    }
}

impl fmt::Debug for ChainEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainEntry")
            .field("id", &self.id)
            .field("handler", &self.handler.name())
            .field("extensions", &self.extensions)
            .finish()
    }
}

/// Ordered registry of module loaders.
pub struct LoaderChain {
    entries: Mutex<Vec<ChainEntry>>,
    next_id: AtomicU64,
}

impl Default for LoaderChain {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LoaderChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.snapshot()).finish()
    }
}

impl LoaderChain {
    /// An empty chain, independent of the global one.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// The process-wide chain.
    pub fn global() -> &'static LoaderChain {
        &GLOBAL
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ChainEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a new entry for `handler`.
    ///
    /// Attaching the same handler twice creates two entries, each removed by
    /// its own guard. Extensions without a leading dot get one.
    pub fn attach<I, S>(
        &self,
        handler: Arc<dyn ModuleLoader>,
        extensions: I,
        position: ChainPosition,
    ) -> ChainGuard<'_>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let extensions: Vec<String> = extensions
            .into_iter()
            .map(|ext| {
                let ext = ext.into();
                if ext.starts_with('.') {
                    ext
                } else {
                    format!(".{ext}")
                }
            })
            .collect();

        let id = EntryId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handler_id = unwrap_loader(handler.as_ref()).id();
        let handler_name = handler.name().to_string();

        let mut entries = self.lock();
        let index = match position {
            ChainPosition::Front => 0,
            ChainPosition::Back => entries.len(),
            ChainPosition::At(index) => index.min(entries.len()),
        };
        tracing::debug!(
            "Attaching {} as entry {} at {} for {:?}",
            handler_name,
            id.0,
            index,
            extensions
        );
        entries.insert(
            index,
            ChainEntry {
                id,
                handler,
                extensions,
            },
        );

        ChainGuard {
            chain: self,
            entry: id,
            handler: handler_id,
            handler_name,
            released: false,
        }
    }

    /// Remove the entry `entry` if its unwrapped handler is `handler`.
    fn detach_entry(
        &self,
        entry: EntryId,
        handler: HandlerId,
        handler_name: &str,
    ) -> Result<ChainEntry, ChainError> {
        let mut entries = self.lock();
        match entries
            .iter()
            .position(|e| e.id == entry && e.handler_id() == handler)
        {
            Some(index) => {
                tracing::debug!("Detaching {} (entry {})", handler_name, entry.0);
                Ok(entries.remove(index))
            }
            None => Err(ChainError::NotFoundOnDetach {
                entry: entry.0,
                handler: handler_name.to_string(),
            }),
        }
    }

    /// Remove the first entry whose unwrapped handler is `handler`.
    pub fn detach_handler(&self, handler: &dyn ModuleLoader) -> Option<ChainEntry> {
        let target = unwrap_loader(handler).id();
        let mut entries = self.lock();
        let index = entries.iter().position(|e| e.handler_id() == target)?;
        Some(entries.remove(index))
    }

    /// The current entries, front first.
    pub fn snapshot(&self) -> Vec<ChainEntry> {
        self.lock().clone()
    }

    /// The first handler claiming `extension`.
    pub fn handler_for_extension(&self, extension: &str) -> Option<Arc<dyn ModuleLoader>> {
        let extension = extension.strip_prefix('.').unwrap_or(extension);
        self.lock()
            .iter()
            .find(|e| {
                e.extensions
                    .iter()
                    .any(|ext| ext.strip_prefix('.') == Some(extension))
            })
            .map(|e| Arc::clone(&e.handler))
    }

    /// The first handler claiming the file at `path`.
    pub fn handler_for_path(&self, path: &Path) -> Option<Arc<dyn ModuleLoader>> {
        self.lock()
            .iter()
            .find(|e| e.claims(path).is_some())
            .map(|e| Arc::clone(&e.handler))
    }

    /// Every claimed extension, in chain order, without duplicates.
    pub fn extensions(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for entry in self.lock().iter() {
            for ext in &entry.extensions {
                if !out.contains(ext) {
                    out.push(ext.clone());
                }
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Whether some entry's unwrapped handler is `handler`.
    pub fn contains(&self, handler: &dyn ModuleLoader) -> bool {
        let target = unwrap_loader(handler).id();
        self.lock().iter().any(|e| e.handler_id() == target)
    }
}

/// Keeps a chain entry attached for its lifetime.
///
/// Dropping the guard removes the entry; failures are logged, never raised.
/// Use [`release`](ChainGuard::release) to observe them.
#[must_use = "dropping the guard detaches the loader immediately"]
pub struct ChainGuard<'c> {
    chain: &'c LoaderChain,
    entry: EntryId,
    handler: HandlerId,
    handler_name: String,
    released: bool,
}

impl fmt::Debug for ChainGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainGuard")
            .field("entry", &self.entry)
            .field("handler", &self.handler_name)
            .field("released", &self.released)
            .finish()
    }
}

impl ChainGuard<'_> {
    pub fn entry(&self) -> EntryId {
        self.entry
    }

    pub fn handler_id(&self) -> HandlerId {
        self.handler
    }

    /// Detach the entry now.
    pub fn release(mut self) -> Result<(), ChainError> {
        self.released = true;
        self.chain
            .detach_entry(self.entry, self.handler, &self.handler_name)
            .map(|_| ())
    }

    /// Leave the entry attached for the rest of the chain's life.
    pub fn keep(mut self) -> EntryId {
        self.released = true;
        self.entry
    }
}

impl Drop for ChainGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self
            .chain
            .detach_entry(self.entry, self.handler, &self.handler_name)
        {
            tracing::warn!("Failed to detach loader on drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ImportError;
    use crate::loader::{LazyLoader, Module, ModuleSpec, SourceProvider};

    struct Stub {
        id: HandlerId,
        name: &'static str,
    }

    fn stub(name: &'static str) -> Arc<dyn ModuleLoader> {
        Arc::new(Stub {
            id: HandlerId::next(),
            name,
        })
    }

    impl ModuleLoader for Stub {
        fn id(&self) -> HandlerId {
            self.id
        }

        fn name(&self) -> &str {
            self.name
        }

        fn create_module(
            &self,
            spec: &ModuleSpec,
            _provider: &dyn SourceProvider,
        ) -> Result<Module, ImportError> {
            Err(ImportError::NotFound {
                name: spec.name().to_string(),
            })
        }

        fn exec_module(&self, _module: &mut Module) -> Result<(), ImportError> {
            Ok(())
        }
    }

    fn names(chain: &LoaderChain) -> Vec<String> {
        chain
            .snapshot()
            .iter()
            .map(|e| e.handler().name().to_string())
            .collect()
    }

    #[test]
    fn test_positions() {
        let chain = LoaderChain::new();
        let a = chain.attach(stub("a"), [".a"], ChainPosition::Front);
        let b = chain.attach(stub("b"), [".b"], ChainPosition::Front);
        let c = chain.attach(stub("c"), [".c"], ChainPosition::Back);
        let d = chain.attach(stub("d"), [".d"], ChainPosition::At(1));
        let e = chain.attach(stub("e"), [".e"], ChainPosition::At(99));

        assert_eq!(names(&chain), ["b", "d", "a", "c", "e"]);
        drop((a, b, c, d, e));
        assert!(chain.is_empty());
    }

    #[test]
    fn test_release_out_of_order() {
        let chain = LoaderChain::new();
        let a = chain.attach(stub("a"), [".ipynb"], ChainPosition::Front);
        let b = chain.attach(stub("b"), [".ipynb"], ChainPosition::Front);

        a.release().unwrap();
        assert_eq!(names(&chain), ["b"]);
        b.release().unwrap();
        assert!(chain.is_empty());
    }

    #[test]
    fn test_same_handler_twice() {
        let chain = LoaderChain::new();
        let handler = stub("nb");
        let first = chain.attach(Arc::clone(&handler), [".ipynb"], ChainPosition::Front);
        let second = chain.attach(Arc::clone(&handler), [".ipynb"], ChainPosition::Back);
        assert_eq!(chain.len(), 2);
        assert_ne!(first.entry(), second.entry());

        second.release().unwrap();
        assert_eq!(chain.snapshot()[0].id(), first.entry());
        first.release().unwrap();
        assert!(chain.is_empty());
    }

    #[test]
    fn test_release_after_external_detach() {
        let chain = LoaderChain::new();
        let handler = stub("nb");
        let guard = chain.attach(Arc::clone(&handler), [".ipynb"], ChainPosition::Front);

        assert!(chain.detach_handler(handler.as_ref()).is_some());
        let err = guard.release().unwrap_err();
        assert!(matches!(err, ChainError::NotFoundOnDetach { .. }));
    }

    #[test]
    fn test_lazy_wrapper_matches_inner_identity() {
        let chain = LoaderChain::new();
        let inner = stub("nb");
        let lazy: Arc<dyn ModuleLoader> = Arc::new(LazyLoader::new(Arc::clone(&inner)));
        let _guard = chain.attach(lazy, ["ipynb"], ChainPosition::Front).keep();

        assert!(chain.contains(inner.as_ref()));
        assert_eq!(chain.extensions(), [".ipynb"]);
        assert!(chain.detach_handler(inner.as_ref()).is_some());
        assert!(chain.is_empty());
    }

    #[test]
    fn test_lookups() {
        let chain = LoaderChain::new();
        let _md = chain.attach(stub("md"), [".md.ipynb"], ChainPosition::Front);
        let _nb = chain.attach(stub("nb"), [".ipynb", ".rsnb"], ChainPosition::Back);

        let handler = chain.handler_for_path(Path::new("dir/x.md.ipynb")).unwrap();
        assert_eq!(handler.name(), "md");
        let handler = chain.handler_for_path(Path::new("x.ipynb")).unwrap();
        assert_eq!(handler.name(), "nb");
        assert!(chain.handler_for_path(Path::new(".ipynb")).is_none());
        assert!(chain.handler_for_path(Path::new("x.py")).is_none());

        assert_eq!(chain.handler_for_extension("rsnb").unwrap().name(), "nb");
        assert_eq!(chain.extensions(), [".md.ipynb", ".ipynb", ".rsnb"]);
    }

    #[test]
    fn test_poisoned_lock_is_recovered() {
        let chain = Arc::new(LoaderChain::new());
        let poisoner = Arc::clone(&chain);
        let _ = std::thread::spawn(move || {
            let _entries = poisoner.lock();
            panic!("poison the chain");
        })
        .join();

        let guard = chain.attach(stub("a"), [".ipynb"], ChainPosition::Front);
        assert_eq!(chain.len(), 1);
        guard.release().unwrap();
    }
}
