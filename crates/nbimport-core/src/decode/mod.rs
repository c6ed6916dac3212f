//! Notebook decoding.
//!
//! - [`json`]: strict JSON decoder that records where each cell's source starts
//! - [`line_index`]: offset to line/column lookup
//! - [`document`]: typed document model and format validation

pub mod document;
pub mod json;
pub mod line_index;

pub use document::{
    Cell, CellKind, Document, DocumentHeader, FormatValidator, NotebookValidator, OrderViolation,
};
pub use json::{COMPUTED_LINE_KEY, LineNoDecoder, decode_value};
pub use line_index::LineIndex;
