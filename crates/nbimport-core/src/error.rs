//! Error types for nbimport-core.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for nbimport-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in nbimport-core.
#[derive(Debug, Error)]
pub enum Error {
    /// The document bytes could not be decoded into a notebook.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A cell could not be parsed into the program unit.
    #[error(transparent)]
    Assemble(#[from] AssembleError),

    /// Loader chain bookkeeping failed.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// A cell failed while executing.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Module resolution or loading failed.
    #[error(transparent)]
    Import(#[from] ImportError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Toolchain error (rustc missing or unusable).
    #[error("toolchain error: {0}")]
    Toolchain(String),

    /// Parameter override could not be applied.
    #[error("parameter error: {0}")]
    Parameter(String),
}

impl Error {
    /// Render the error with a short recovery hint for terminal output.
    pub fn with_hint(&self) -> String {
        let hint = match self {
            Error::Decode(DecodeError::Syntax { .. }) => {
                Some("the file is not valid JSON; was it saved completely?")
            }
            Error::Decode(DecodeError::Schema { .. }) => {
                Some("the JSON is not an nbformat v4 notebook")
            }
            Error::Decode(DecodeError::Unsupported { .. }) => {
                Some("only nbformat 4 notebooks with a Rust kernel are supported")
            }
            Error::Assemble(_) => Some("fix the Rust syntax in the reported cell"),
            Error::Toolchain(_) => Some("install a Rust toolchain and make sure `rustc` is on PATH"),
            _ => None,
        };

        match hint {
            Some(hint) => format!("{self}\n  hint: {hint}"),
            None => self.to_string(),
        }
    }
}

/// Which part of decoding failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    Syntax,
    Schema,
    Unsupported,
}

/// Errors raised while turning document bytes into a [`Document`](crate::decode::Document).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Malformed JSON (or invalid UTF-8).
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    /// Valid JSON that does not have the notebook shape.
    #[error("schema error{}: {message}", cell_index.map(|i| format!(" in cell {i}")).unwrap_or_default())]
    Schema {
        cell_index: Option<usize>,
        message: String,
    },

    /// The header was rejected by the format validator.
    #[error("unsupported notebook: nbformat {nbformat}, language {}", language.as_deref().unwrap_or("<undeclared>"))]
    Unsupported {
        nbformat: u64,
        language: Option<String>,
    },
}

impl DecodeError {
    /// Classify the error.
    pub fn kind(&self) -> DecodeErrorKind {
        match self {
            DecodeError::Syntax { .. } => DecodeErrorKind::Syntax,
            DecodeError::Schema { .. } => DecodeErrorKind::Schema,
            DecodeError::Unsupported { .. } => DecodeErrorKind::Unsupported,
        }
    }

    pub(crate) fn schema(cell_index: Option<usize>, message: impl Into<String>) -> Self {
        DecodeError::Schema {
            cell_index,
            message: message.into(),
        }
    }
}

/// A cell's transformed text is not valid Rust.
///
/// `line` and `column` point into the original document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cell {cell_index} does not parse (line {line}, column {column}): {message}")]
pub struct AssembleError {
    pub cell_index: usize,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

/// Loader chain errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// The entry a guard refers to was already removed.
    #[error("chain entry {entry} for handler `{handler}` is no longer attached")]
    NotFoundOnDetach { entry: u64, handler: String },
}

/// The runtime failure reported by a kernel for one cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellFailure {
    /// Short error name (`panic`, `CompileError`, ...).
    pub ename: String,
    /// Error message.
    pub evalue: String,
    /// Traceback lines, outermost first.
    pub traceback: Vec<String>,
}

impl CellFailure {
    pub fn new(ename: impl Into<String>, evalue: impl Into<String>) -> Self {
        Self {
            ename: ename.into(),
            evalue: evalue.into(),
            traceback: Vec::new(),
        }
    }

    pub fn with_traceback(mut self, traceback: Vec<String>) -> Self {
        self.traceback = traceback;
        self
    }
}

impl fmt::Display for CellFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.ename, self.evalue)
    }
}

/// A cell failed during execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cell {cell_index} (line {line}) failed with {failure}")]
pub struct ExecutionError {
    pub cell_index: usize,
    pub line: usize,
    pub failure: CellFailure,
}

/// Errors surfaced by module resolution.
///
/// Decode and assemble failures of a found module are reported as
/// [`ImportError::Load`], never as an empty module.
#[derive(Debug, Error)]
pub enum ImportError {
    /// No search path holds a file for the name.
    #[error("no module named `{name}`")]
    NotFound { name: String },

    /// The file was found but could not be turned into a program.
    #[error("could not import `{name}` from {origin}: {source}")]
    Load {
        name: String,
        origin: String,
        #[source]
        source: Box<Error>,
    },

    /// The module body raised while executing.
    #[error("module `{name}` failed during execution: {source}")]
    Execution {
        name: String,
        #[source]
        source: ExecutionError,
    },

    /// The source provider could not read the module.
    #[error("could not read `{name}` from {origin}: {source}")]
    Io {
        name: String,
        origin: String,
        #[source]
        source: std::io::Error,
    },

    /// No chain entry claims the file's extension.
    #[error("no loader is attached for {}", path.display())]
    NoLoader { path: PathBuf },
}

impl ImportError {
    /// The requested module name, when the error carries one.
    pub fn module_name(&self) -> Option<&str> {
        match self {
            ImportError::NotFound { name }
            | ImportError::Load { name, .. }
            | ImportError::Execution { name, .. }
            | ImportError::Io { name, .. } => Some(name),
            ImportError::NoLoader { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_kinds_are_distinct() {
        let syntax = DecodeError::Syntax {
            line: 3,
            column: 7,
            message: "expected `:`".to_string(),
        };
        let schema = DecodeError::schema(Some(2), "missing `source`");
        let unsupported = DecodeError::Unsupported {
            nbformat: 3,
            language: Some("python".to_string()),
        };

        assert_eq!(syntax.kind(), DecodeErrorKind::Syntax);
        assert_eq!(schema.kind(), DecodeErrorKind::Schema);
        assert_eq!(unsupported.kind(), DecodeErrorKind::Unsupported);
    }

    #[test]
    fn test_error_messages() {
        let schema = DecodeError::schema(Some(2), "missing `source`");
        assert_eq!(schema.to_string(), "schema error in cell 2: missing `source`");

        let unsupported = DecodeError::Unsupported {
            nbformat: 4,
            language: None,
        };
        assert!(unsupported.to_string().contains("<undeclared>"));

        let failure = CellFailure::new("panic", "boom");
        let err = ExecutionError {
            cell_index: 1,
            line: 12,
            failure,
        };
        assert_eq!(err.to_string(), "cell 1 (line 12) failed with panic: boom");
    }

    #[test]
    fn test_with_hint() {
        let err = Error::from(DecodeError::Syntax {
            line: 1,
            column: 1,
            message: "unexpected end of input".to_string(),
        });
        let rendered = err.with_hint();
        assert!(rendered.contains("hint:"));
        assert!(rendered.contains("line 1"));

        let plain = Error::Parameter("unknown parameter `x`".to_string());
        assert!(!plain.with_hint().contains("hint:"));
    }
}
