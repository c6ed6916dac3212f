//! Scoped notebook importing for host programs.
//!
//! A [`Notebook`] describes how notebooks are loaded. Entering it attaches a
//! loader to the process-wide chain for as long as the returned guard or
//! [`Session`] lives:
//!
//! ```rust,no_run
//! use nbimport::Notebook;
//!
//! let mut session = Notebook::partial().session(["notebooks"]);
//! let module = session.import("analysis")?;
//! if let Some(error) = module.exception() {
//!     eprintln!("analysis failed: {error}");
//! }
//! session.close()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use nbimport_core::error::{ChainError, ImportError};
use nbimport_core::execute::{CaptureOptions, FailurePolicy, Kernel};
use nbimport_core::loader::{
    ChainGuard, ChainPosition, Importer, KernelFactory, LoaderChain, LoaderConfig, Module,
    NotebookLoader, PathFinder,
};

/// Loader settings plus where to attach them.
#[derive(Clone)]
pub struct Notebook {
    config: LoaderConfig,
    position: ChainPosition,
    kernel: Option<KernelFactory>,
}

impl std::fmt::Debug for Notebook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notebook")
            .field("config", &self.config)
            .field("position", &self.position)
            .field("custom_kernel", &self.kernel.is_some())
            .finish()
    }
}

impl Default for Notebook {
    fn default() -> Self {
        Self::with_config(LoaderConfig::default())
    }
}

impl Notebook {
    /// Stop at the first failing cell and refuse the import.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep modules whose execution failed, with the error attached.
    pub fn partial() -> Self {
        Self::with_config(LoaderConfig::partial())
    }

    /// Run modules on first use of their report.
    pub fn lazy() -> Self {
        Self::with_config(LoaderConfig::lazy())
    }

    pub fn with_config(config: LoaderConfig) -> Self {
        Self {
            config,
            position: ChainPosition::Front,
            kernel: None,
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn policy(mut self, policy: FailurePolicy) -> Self {
        self.config.policy = policy;
        self
    }

    pub fn capture(mut self, capture: CaptureOptions) -> Self {
        self.config.capture = capture;
        self
    }

    pub fn docstrings(mut self, enabled: bool) -> Self {
        self.config.docstrings = enabled;
        self
    }

    /// Claim these extensions instead of `.ipynb`.
    pub fn extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn position(mut self, position: ChainPosition) -> Self {
        self.position = position;
        self
    }

    /// Run cells with kernels from `factory` instead of rustc.
    pub fn kernel<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> nbimport_core::Result<Box<dyn Kernel>> + Send + Sync + 'static,
    {
        self.kernel = Some(Arc::new(factory));
        self
    }

    /// The loader this notebook configuration describes.
    pub fn loader(&self) -> NotebookLoader {
        let loader = NotebookLoader::new(self.config.clone());
        match &self.kernel {
            Some(factory) => {
                let factory = Arc::clone(factory);
                loader.with_kernel(move || factory())
            }
            None => loader,
        }
    }

    /// Attach to the global chain until the guard is released or dropped.
    pub fn enter(&self) -> ChainGuard<'static> {
        self.loader().attach(LoaderChain::global(), self.position)
    }

    /// Attach to the global chain and import from `search_paths`.
    pub fn session<I, P>(&self, search_paths: I) -> Session
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let guard = self.enter();
        let importer = Importer::new(LoaderChain::global(), PathFinder::new(search_paths));
        Session { importer, guard }
    }

    /// Load one notebook file without touching the chain.
    pub fn from_filename(&self, path: impl AsRef<Path>) -> Result<Module, ImportError> {
        Arc::new(self.loader()).load_path(path)
    }
}

/// An attached loader together with the importer that uses it.
///
/// Dropping the session detaches the loader. Imported modules are owned by
/// the session and go away with it.
#[derive(Debug)]
pub struct Session {
    importer: Importer<'static>,
    guard: ChainGuard<'static>,
}

impl Session {
    pub fn import(&mut self, name: &str) -> Result<&mut Module, ImportError> {
        self.importer.import(name)
    }

    pub fn reload(&mut self, name: &str) -> Result<&mut Module, ImportError> {
        self.importer.reload(name)
    }

    pub fn forget(&mut self, name: &str) -> Option<Module> {
        self.importer.forget(name)
    }

    pub fn importer(&self) -> &Importer<'static> {
        &self.importer
    }

    pub fn importer_mut(&mut self) -> &mut Importer<'static> {
        &mut self.importer
    }

    pub fn guard(&self) -> &ChainGuard<'static> {
        &self.guard
    }

    /// Detach the loader, reporting a loader that was already removed.
    pub fn close(self) -> Result<(), ChainError> {
        self.guard.release()
    }
}
