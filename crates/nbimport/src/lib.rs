//! nbimport: Jupyter notebooks written in Rust, imported as modules.
//!
//! A notebook is decoded with the line of every cell recorded, assembled
//! into one program whose statements sit on their original document lines,
//! and executed cell by cell with each cell's output captured. Errors and
//! panics therefore point at the line of the `.ipynb` file itself.
//!
//! This crate is the user-facing surface:
//! - [`Notebook`] and [`Session`]: attach a loader and import by name
//! - [`render::Render`] and [`display`]: rich output from in-process cells
//! - re-exports of the most used pieces of `nbimport-core`
//!
//! For the pipeline internals (decoder, assembler, kernels, loader chain),
//! see the `nbimport-core` crate.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use nbimport::prelude::*;
//!
//! let unit = nbimport::compile(&std::fs::read("analysis.ipynb")?)?;
//! print!("{}", export_program(&unit));
//!
//! let module = Notebook::new().from_filename("analysis.ipynb")?;
//! println!("{:?}", module.doc());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod notebook;
pub mod render;

pub use notebook::{Notebook, Session};
pub use render::{Render, display, display_html, display_image, display_markdown};

pub use nbimport_core::compile::{Parameters, export_program};
pub use nbimport_core::{
    CaptureRecord, ChainPosition, Error, FailurePolicy, ImportError, Importer, LoaderChain,
    LoaderConfig, Module, NotebookLoader, ProgramUnit, Result, attach_loader, compile, execute,
};
pub use nbimport_core::{cell_eprint, cell_eprintln, cell_print, cell_println};

pub mod prelude {
    //! Common imports for hosts embedding notebooks.
    //!
    //! ```rust,ignore
    //! use nbimport::prelude::*;
    //! ```

    pub use crate::notebook::{Notebook, Session};
    pub use crate::render::{Html, ImageOutput, Json, Markdown, Render};
    pub use crate::render::{display, display_html, display_image, display_markdown};

    pub use nbimport_core::compile::{Parameters, export_program};
    pub use nbimport_core::execute::{CaptureOptions, FailurePolicy, FnKernel, Kernel};
    pub use nbimport_core::{cell_eprint, cell_eprintln, cell_print, cell_println};
}
