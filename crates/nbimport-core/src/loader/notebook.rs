//! The notebook loader: decode, assemble and execute `.ipynb` files.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::chain::{ChainGuard, ChainPosition, LoaderChain};
use super::finder::ModuleSpec;
use super::handler::{HandlerId, LazyLoader, ModuleLoader};
use super::module::Module;
use super::provider::{FsProvider, SourceProvider};
use crate::compile::Compiler;
use crate::error::{Error, ImportError, Result};
use crate::execute::{
    CaptureOptions, ExecutionReport, Executor, FailurePolicy, Kernel, RustcKernel,
};

/// File extension claimed by default.
pub const NOTEBOOK_EXTENSION: &str = ".ipynb";

/// Creates a fresh kernel for each module execution.
pub type KernelFactory = Arc<dyn Fn() -> Result<Box<dyn Kernel>> + Send + Sync>;

/// How notebooks are loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub policy: FailurePolicy,
    pub capture: CaptureOptions,
    /// Keep modules whose execution failed, with the error attached.
    pub partial: bool,
    /// Defer execution until the module's report is requested.
    pub lazy: bool,
    /// Promote prose cells to doc attributes.
    pub docstrings: bool,
    pub extensions: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            policy: FailurePolicy::StopOnError,
            capture: CaptureOptions::all(),
            partial: false,
            lazy: false,
            docstrings: true,
            extensions: vec![NOTEBOOK_EXTENSION.to_string()],
        }
    }
}

impl LoaderConfig {
    /// Failing modules are imported anyway, keeping the error.
    pub fn partial() -> Self {
        Self {
            partial: true,
            ..Self::default()
        }
    }

    /// Modules run on first use.
    pub fn lazy() -> Self {
        Self {
            lazy: true,
            ..Self::default()
        }
    }
}

/// Loads notebooks as modules.
pub struct NotebookLoader {
    id: HandlerId,
    compiler: Compiler,
    config: LoaderConfig,
    kernel: KernelFactory,
}

impl fmt::Debug for NotebookLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotebookLoader")
            .field("id", &self.id)
            .field("compiler", &self.compiler)
            .field("config", &self.config)
            .finish()
    }
}

impl Default for NotebookLoader {
    fn default() -> Self {
        Self::new(LoaderConfig::default())
    }
}

impl NotebookLoader {
    /// A loader running modules with [`RustcKernel`].
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            id: HandlerId::next(),
            compiler: Compiler::new().docstrings(config.docstrings),
            config,
            kernel: Arc::new(|| -> Result<Box<dyn Kernel>> { Ok(Box::new(RustcKernel::new()?)) }),
        }
    }

    pub fn with_compiler(mut self, compiler: Compiler) -> Self {
        self.compiler = compiler;
        self
    }

    /// Use another kernel for module execution.
    pub fn with_kernel<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn Kernel>> + Send + Sync + 'static,
    {
        self.kernel = Arc::new(factory);
        self
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn compiler(&self) -> &Compiler {
        &self.compiler
    }

    /// Register in `chain` for the configured extensions, wrapped in a
    /// [`LazyLoader`] when the config asks for lazy loading.
    pub fn attach(self, chain: &LoaderChain, position: ChainPosition) -> ChainGuard<'_> {
        let extensions = self.config.extensions.clone();
        let lazy = self.config.lazy;
        let loader: Arc<dyn ModuleLoader> = Arc::new(self);
        let handler: Arc<dyn ModuleLoader> = if lazy {
            Arc::new(LazyLoader::new(loader))
        } else {
            loader
        };
        chain.attach(handler, extensions, position)
    }

    /// Load a notebook file directly, without the chain or module cache.
    pub fn load_path(self: &Arc<Self>, path: impl AsRef<Path>) -> std::result::Result<Module, ImportError> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let loader: Arc<dyn ModuleLoader> = Arc::clone(self) as Arc<dyn ModuleLoader>;
        let spec = ModuleSpec::new(name, path, loader);

        let mut module = self.create_module(&spec, &FsProvider)?;
        self.exec_module(&mut module)?;
        Ok(module)
    }

    fn load_error(spec: &ModuleSpec, origin: &str, error: impl Into<Error>) -> ImportError {
        ImportError::Load {
            name: spec.name().to_string(),
            origin: origin.to_string(),
            source: Box::new(error.into()),
        }
    }
}

impl ModuleLoader for NotebookLoader {
    fn id(&self) -> HandlerId {
        self.id
    }

    fn name(&self) -> &str {
        "notebook"
    }

    fn create_module(
        &self,
        spec: &ModuleSpec,
        provider: &dyn SourceProvider,
    ) -> std::result::Result<Module, ImportError> {
        let origin = provider.location(spec);
        let bytes = provider.read(spec).map_err(|source| ImportError::Io {
            name: spec.name().to_string(),
            origin: origin.clone(),
            source,
        })?;

        let document = self
            .compiler
            .decode(&bytes)
            .map_err(|e| Self::load_error(spec, &origin, e))?;

        for violation in document.execution_order_violations() {
            tracing::warn!(
                "{}: cell {} (line {}) has execution count {} after {}",
                origin,
                violation.cell_index,
                violation.line,
                violation.slot,
                violation.previous_slot
            );
        }

        let unit = self
            .compiler
            .assemble(&document, &origin)
            .map_err(|e| Self::load_error(spec, &origin, e))?;

        tracing::debug!(
            "Compiled {} ({} cells, {} fragments)",
            spec.name(),
            document.cells().len(),
            unit.fragments().len()
        );

        Ok(Module::new(spec.clone(), document, unit))
    }

    fn exec_module(&self, module: &mut Module) -> std::result::Result<(), ImportError> {
        let name = module.name().to_string();
        let kernel = (self.kernel)().map_err(|e| ImportError::Load {
            name: name.clone(),
            origin: module.unit().origin().to_string(),
            source: Box::new(e),
        })?;

        let mut executor = Executor::new(kernel)
            .policy(self.config.policy)
            .capture(self.config.capture);

        let report = match executor.execute(module.unit()) {
            Ok(records) => ExecutionReport {
                records,
                error: None,
            },
            Err(failure) => ExecutionReport {
                records: failure.records,
                error: Some(failure.error),
            },
        };

        if let Some(error) = &report.error {
            if !self.config.partial {
                return Err(ImportError::Execution {
                    name,
                    source: error.clone(),
                });
            }
            tracing::warn!("{} was partially imported: {}", name, error);
        }

        tracing::info!("Loaded {} from {}", name, module.unit().origin());
        module.set_report(report);
        Ok(())
    }
}
