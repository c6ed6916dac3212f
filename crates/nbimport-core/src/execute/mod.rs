//! Cell execution with per-cell output capture.
//!
//! The [`Executor`] walks a program unit's code fragments, hands each to a
//! [`Kernel`] inside a [`CaptureScope`] and collects one [`CaptureRecord`]
//! per cell. [`RustcKernel`] runs cells by compiling them with rustc.

pub mod capture;
mod diagnostics;
mod executor;
mod kernel;
mod record;
mod rustc;
mod toolchain;

pub use capture::{CaptureOptions, CaptureScope};
pub use diagnostics::{Diagnostic, DiagnosticLevel, DiagnosticParser, Location};
pub use executor::{
    ExecutionCallback, ExecutionFailure, ExecutionReport, ExecutionState, Executor, FailurePolicy,
};
pub use kernel::{CellUnit, FnKernel, Kernel, NullKernel};
pub use record::{CaptureRecord, MimeBundle, NbOutput, Output, StreamName};
pub use rustc::{RustcConfig, RustcKernel};
pub use toolchain::Toolchain;
