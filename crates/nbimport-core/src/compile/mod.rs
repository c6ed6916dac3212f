//! Compilation of decoded documents into program units.
//!
//! ```text
//! Document ──► Transforms ──► syn (line-padded) ──► Fragments ──► docstring promotion ──► ProgramUnit
//!                                                                                          │
//!                                                           ProgramPrinter ◄──────────────┘
//! ```

mod assemble;
mod docstring;
mod params;
mod printer;
pub mod transform;

pub use assemble::{Assembler, Compiler, Fragment, ModuleDoc, ProgramUnit, stmt_line};
pub use docstring::{doc_line, item_doc};
pub use params::{Parameter, Parameters};
pub use printer::{ProgramPrinter, export_program, is_tail_expression};
pub use transform::{TransformFn, Transforms};

