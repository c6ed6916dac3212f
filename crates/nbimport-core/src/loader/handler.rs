//! Module loaders: the handlers stored in the loader chain.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::finder::ModuleSpec;
use super::module::Module;
use super::provider::SourceProvider;
use crate::error::ImportError;

static HANDLER_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identity of a loader instance.
///
/// Chain entries are matched by the id of their unwrapped handler, so a
/// [`LazyLoader`] around a loader is the same handler as the loader itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    /// A process-unique id.
    pub fn next() -> Self {
        Self(HANDLER_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Turns a located file into a [`Module`].
///
/// Loading is split in two: `create_module` reads and compiles, while
/// `exec_module` runs the module body. Wrappers delegate to the loader
/// returned by [`inner`](ModuleLoader::inner).
pub trait ModuleLoader: Send + Sync {
    fn id(&self) -> HandlerId;

    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// The wrapped loader, for decorating loaders.
    fn inner(&self) -> Option<&dyn ModuleLoader> {
        None
    }

    fn create_module(
        &self,
        spec: &ModuleSpec,
        provider: &dyn SourceProvider,
    ) -> Result<Module, ImportError>;

    fn exec_module(&self, module: &mut Module) -> Result<(), ImportError>;
}

impl fmt::Debug for dyn ModuleLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("name", &self.name())
            .field("id", &self.id())
            .finish()
    }
}

/// Follow [`ModuleLoader::inner`] to the loader that does the work.
pub fn unwrap_loader(loader: &dyn ModuleLoader) -> &dyn ModuleLoader {
    let mut current = loader;
    while let Some(inner) = current.inner() {
        current = inner;
    }
    current
}

/// Defers a loader's `exec_module` until the module's report is first
/// requested through [`Module::report`].
pub struct LazyLoader {
    id: HandlerId,
    inner: Arc<dyn ModuleLoader>,
}

impl LazyLoader {
    pub fn new(inner: Arc<dyn ModuleLoader>) -> Self {
        Self {
            id: HandlerId::next(),
            inner,
        }
    }
}

impl fmt::Debug for LazyLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyLoader")
            .field("id", &self.id)
            .field("inner", &self.inner)
            .finish()
    }
}

impl ModuleLoader for LazyLoader {
    fn id(&self) -> HandlerId {
        self.id
    }

    fn name(&self) -> &str {
        "lazy"
    }

    fn inner(&self) -> Option<&dyn ModuleLoader> {
        Some(self.inner.as_ref())
    }

    fn create_module(
        &self,
        spec: &ModuleSpec,
        provider: &dyn SourceProvider,
    ) -> Result<Module, ImportError> {
        self.inner.create_module(spec, provider)
    }

    fn exec_module(&self, module: &mut Module) -> Result<(), ImportError> {
        tracing::debug!("Deferring execution of {}", module.name());
        module.defer(Arc::clone(&self.inner));
        Ok(())
    }
}
