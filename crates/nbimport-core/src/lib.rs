//! Core engine for nbimport: notebooks as Rust modules.
//!
//! This crate provides:
//! - A JSON decoder that records the document line of every cell's source
//! - Assembly of cells into one `syn` program whose spans are document lines
//! - Per-cell output capture and policy-driven execution through kernels
//! - A process-wide loader chain, module lookup and a notebook importer

pub mod compile;
pub mod decode;
pub mod error;
pub mod execute;
pub mod loader;

pub use compile::{Assembler, Compiler, Fragment, ModuleDoc, Parameters, ProgramUnit, Transforms};
pub use decode::{Cell, CellKind, Document, DocumentHeader, FormatValidator, NotebookValidator};
pub use error::{
    AssembleError, CellFailure, ChainError, DecodeError, Error, ExecutionError, ImportError,
    Result,
};
pub use execute::{
    CaptureOptions, CaptureRecord, CaptureScope, ExecutionFailure, ExecutionReport, Executor,
    FailurePolicy, Kernel, MimeBundle, Output, RustcConfig, RustcKernel,
};
pub use loader::{
    ChainGuard, ChainPosition, Importer, LoaderChain, LoaderConfig, Module, ModuleLoader,
    NotebookLoader, PathFinder,
};

/// Origin used for units compiled from bare bytes.
pub const ANONYMOUS_ORIGIN: &str = "<notebook>";

/// Decode and assemble notebook bytes with the default compiler.
pub fn compile(bytes: &[u8]) -> Result<ProgramUnit> {
    Compiler::new()
        .compile(bytes, ANONYMOUS_ORIGIN)
        .map(|(_, unit)| unit)
}

/// Attach a default [`NotebookLoader`] to the global chain for `extensions`.
pub fn attach_loader<I, S>(extensions: I, position: ChainPosition) -> ChainGuard<'static>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let config = LoaderConfig {
        extensions: extensions.into_iter().map(Into::into).collect(),
        ..LoaderConfig::default()
    };
    NotebookLoader::new(config).attach(LoaderChain::global(), position)
}

/// Run a program unit's code cells through `kernel`.
pub fn execute<K: Kernel>(
    unit: &ProgramUnit,
    policy: FailurePolicy,
    kernel: K,
) -> std::result::Result<Vec<CaptureRecord>, ExecutionFailure> {
    Executor::new(kernel).policy(policy).execute(unit)
}
