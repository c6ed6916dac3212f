//! Module loading: the loader chain, module lookup and the notebook loader.
//!
//! ```text
//! Importer::import(name)
//!   └─► PathFinder::find_spec(name, chain) ──► ModuleSpec { origin, loader }
//!         └─► loader.create_module(spec, provider) ──► Module (compiled)
//!               └─► loader.exec_module(module) ──► ExecutionReport
//! ```

mod chain;
mod finder;
pub mod fuzzy;
mod handler;
mod importer;
mod module;
mod notebook;
mod provider;

pub use chain::{ChainEntry, ChainGuard, ChainPosition, EntryId, LoaderChain};
pub use finder::{ModuleSpec, PathFinder};
pub use fuzzy::{fuzzy_file_search, fuzzy_query};
pub use handler::{HandlerId, LazyLoader, ModuleLoader, unwrap_loader};
pub use importer::Importer;
pub use module::{Module, ModuleState};
pub use notebook::{KernelFactory, LoaderConfig, NOTEBOOK_EXTENSION, NotebookLoader};
pub use provider::{FsProvider, SourceProvider};
