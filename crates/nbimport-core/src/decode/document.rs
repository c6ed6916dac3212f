//! Typed notebook model built on top of the line-accurate decoder.

use serde_json::{Map, Value};

use super::json::{COMPUTED_LINE_KEY, decode_value};
use super::line_index::LineIndex;
use crate::error::DecodeError;
use crate::execute::CaptureRecord;

/// Kind of a notebook cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellKind {
    /// Rust statements and items.
    Code,
    /// Prose.
    Markdown,
    /// Passed through untouched by the notebook frontend.
    Raw,
}

impl CellKind {
    /// The nbformat `cell_type` string.
    pub fn as_str(self) -> &'static str {
        match self {
            CellKind::Code => "code",
            CellKind::Markdown => "markdown",
            CellKind::Raw => "raw",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "code" => Some(CellKind::Code),
            "markdown" => Some(CellKind::Markdown),
            "raw" => Some(CellKind::Raw),
            _ => None,
        }
    }
}

impl std::fmt::Display for CellKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One cell of a decoded document.
///
/// `computed_line` is fixed at decode time; there is no way to change it
/// afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    index: usize,
    kind: CellKind,
    source: String,
    computed_line: usize,
    execution_slot: Option<u64>,
    metadata: Map<String, Value>,
}

impl Cell {
    /// Position of the cell in the document.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn kind(&self) -> CellKind {
        self.kind
    }

    /// Joined source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// 1-based line of the document on which the source payload starts.
    pub fn computed_line(&self) -> usize {
        self.computed_line
    }

    /// Stored `execution_count` of a code cell.
    pub fn execution_slot(&self) -> Option<u64> {
        self.execution_slot
    }

    /// Cell metadata, including the injected `computed_line`.
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn is_code(&self) -> bool {
        self.kind == CellKind::Code
    }
}

/// The notebook header as seen by a [`FormatValidator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHeader {
    pub nbformat: u64,
    pub nbformat_minor: u64,
    /// Declared kernel language, if any.
    pub language: Option<String>,
}

/// Decides whether a document header is acceptable.
pub trait FormatValidator {
    fn validate(&self, header: &DocumentHeader) -> bool;
}

impl<F> FormatValidator for F
where
    F: Fn(&DocumentHeader) -> bool,
{
    fn validate(&self, header: &DocumentHeader) -> bool {
        self(header)
    }
}

/// Accepts nbformat 4 documents whose language is one of a configured set.
#[derive(Debug, Clone)]
pub struct NotebookValidator {
    languages: Vec<String>,
}

impl NotebookValidator {
    pub const NBFORMAT: u64 = 4;

    /// Accept the given languages (compared case-insensitively).
    pub fn with_languages<I, S>(languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            languages: languages.into_iter().map(Into::into).collect(),
        }
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }
}

impl Default for NotebookValidator {
    fn default() -> Self {
        Self::with_languages(["rust"])
    }
}

impl FormatValidator for NotebookValidator {
    fn validate(&self, header: &DocumentHeader) -> bool {
        header.nbformat == Self::NBFORMAT
            && header.language.as_deref().is_some_and(|language| {
                self.languages
                    .iter()
                    .any(|accepted| accepted.eq_ignore_ascii_case(language))
            })
    }
}

/// A code cell whose stored execution slot does not follow the previous one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderViolation {
    pub cell_index: usize,
    pub line: usize,
    pub slot: u64,
    pub previous_slot: u64,
}

/// A decoded, validated notebook.
#[derive(Debug, Clone)]
pub struct Document {
    header: DocumentHeader,
    cells: Vec<Cell>,
    tree: Value,
}

impl Document {
    /// Decode raw bytes.
    pub fn decode(bytes: &[u8], validator: &dyn FormatValidator) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(bytes).map_err(|err| {
            let offset = err.valid_up_to();
            let valid = String::from_utf8_lossy(&bytes[..offset]);
            let (line, column) = LineIndex::new(&valid).line_col(&valid, offset);
            DecodeError::Syntax {
                line,
                column,
                message: "invalid UTF-8".to_string(),
            }
        })?;
        Self::decode_str(text, validator)
    }

    /// Decode text that is already known to be UTF-8.
    pub fn decode_str(text: &str, validator: &dyn FormatValidator) -> Result<Self, DecodeError> {
        let tree = decode_value(text)?;
        let header = read_header(&tree)?;

        if !validator.validate(&header) {
            return Err(DecodeError::Unsupported {
                nbformat: header.nbformat,
                language: header.language,
            });
        }

        let cells = match tree.get("cells") {
            Some(Value::Array(cells)) => cells
                .iter()
                .enumerate()
                .map(|(index, cell)| read_cell(index, cell))
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(DecodeError::schema(None, "`cells` must be an array")),
            None => return Err(DecodeError::schema(None, "missing `cells`")),
        };

        tracing::debug!(
            "Decoded nbformat {}.{} document with {} cells",
            header.nbformat,
            header.nbformat_minor,
            cells.len()
        );

        Ok(Self {
            header,
            cells,
            tree,
        })
    }

    pub fn header(&self) -> &DocumentHeader {
        &self.header
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Code cells in document order.
    pub fn code_cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().filter(|cell| cell.is_code())
    }

    /// The decoded tree: the input structure plus `metadata.computed_line`
    /// on every cell.
    pub fn to_json_value(&self) -> &Value {
        &self.tree
    }

    /// Code cells whose stored execution slots are not strictly increasing.
    ///
    /// Cells that were never executed (`execution_count: null`) are ignored.
    pub fn execution_order_violations(&self) -> Vec<OrderViolation> {
        let mut violations = Vec::new();
        let mut previous: Option<u64> = None;

        for cell in self.code_cells() {
            let Some(slot) = cell.execution_slot else {
                continue;
            };
            if let Some(previous_slot) = previous
                && slot <= previous_slot
            {
                violations.push(OrderViolation {
                    cell_index: cell.index,
                    line: cell.computed_line,
                    slot,
                    previous_slot,
                });
            }
            previous = Some(slot);
        }

        violations
    }

    /// The notebook with its code cell outputs replaced by `records`.
    ///
    /// Code cells without a record are cleared. The injected line metadata
    /// is removed so the result can be written back as a plain notebook.
    pub fn with_outputs(&self, records: &[CaptureRecord]) -> Value {
        let mut tree = self.tree.clone();

        let Some(Value::Array(cells)) = tree.get_mut("cells") else {
            return tree;
        };

        for (index, cell) in cells.iter_mut().enumerate() {
            let Value::Object(cell) = cell else {
                continue;
            };

            if let Some(Value::Object(metadata)) = cell.get_mut("metadata") {
                metadata.remove(COMPUTED_LINE_KEY);
            }

            if cell.get("cell_type").and_then(Value::as_str) != Some("code") {
                continue;
            }

            match records.iter().find(|record| record.cell_index == index) {
                Some(record) => {
                    let outputs = serde_json::to_value(record.to_nbformat())
                        .unwrap_or_else(|_| Value::Array(Vec::new()));
                    cell.insert("outputs".to_string(), outputs);
                    cell.insert(
                        "execution_count".to_string(),
                        Value::from(record.execution_count),
                    );
                }
                None => {
                    cell.insert("outputs".to_string(), Value::Array(Vec::new()));
                    cell.insert("execution_count".to_string(), Value::Null);
                }
            }
        }

        tree
    }
}

fn read_header(tree: &Value) -> Result<DocumentHeader, DecodeError> {
    let Value::Object(root) = tree else {
        return Err(DecodeError::schema(None, "top level must be an object"));
    };

    let nbformat = match root.get("nbformat") {
        Some(value) => value
            .as_u64()
            .ok_or_else(|| DecodeError::schema(None, "`nbformat` must be a non-negative integer"))?,
        None => return Err(DecodeError::schema(None, "missing `nbformat`")),
    };
    let nbformat_minor = root
        .get("nbformat_minor")
        .and_then(Value::as_u64)
        .unwrap_or(0);

    let metadata = root.get("metadata");
    let language = metadata
        .and_then(|m| m.pointer("/language_info/name"))
        .and_then(Value::as_str)
        .or_else(|| {
            metadata
                .and_then(|m| m.pointer("/kernelspec/language"))
                .and_then(Value::as_str)
        })
        .map(str::to_string);

    Ok(DocumentHeader {
        nbformat,
        nbformat_minor,
        language,
    })
}

fn read_cell(index: usize, value: &Value) -> Result<Cell, DecodeError> {
    let Value::Object(cell) = value else {
        return Err(DecodeError::schema(Some(index), "cell is not an object"));
    };

    let kind = match cell.get("cell_type") {
        Some(Value::String(kind)) => CellKind::parse(kind).ok_or_else(|| {
            DecodeError::schema(Some(index), format!("unknown cell type `{kind}`"))
        })?,
        Some(_) => {
            return Err(DecodeError::schema(Some(index), "`cell_type` must be a string"));
        }
        None => return Err(DecodeError::schema(Some(index), "missing `cell_type`")),
    };

    let source = match cell.get("source") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(parts)) => {
            let mut text = String::new();
            for part in parts {
                let Value::String(part) = part else {
                    return Err(DecodeError::schema(
                        Some(index),
                        "`source` must be a string or an array of strings",
                    ));
                };
                text.push_str(part);
            }
            text
        }
        Some(_) => {
            return Err(DecodeError::schema(
                Some(index),
                "`source` must be a string or an array of strings",
            ));
        }
        None => return Err(DecodeError::schema(Some(index), "missing `source`")),
    };

    let metadata = match cell.get("metadata") {
        Some(Value::Object(metadata)) => metadata.clone(),
        Some(_) => return Err(DecodeError::schema(Some(index), "`metadata` must be an object")),
        None => Map::new(),
    };

    let computed_line = metadata
        .get(COMPUTED_LINE_KEY)
        .and_then(Value::as_u64)
        .and_then(|line| usize::try_from(line).ok())
        .ok_or_else(|| DecodeError::schema(Some(index), "cell has no computed line"))?;

    let execution_slot = match kind {
        CellKind::Code => cell.get("execution_count").and_then(Value::as_u64),
        _ => None,
    };

    Ok(Cell {
        index,
        kind,
        source,
        computed_line,
        execution_slot,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeErrorKind;

    const NOTEBOOK: &str = r##"{
 "cells": [
  {
   "cell_type": "markdown",
   "metadata": {},
   "source": [
    "# Title\n",
    "\n",
    "Some prose."
   ]
  },
  {
   "cell_type": "code",
   "execution_count": 1,
   "metadata": {},
   "outputs": [],
   "source": [
    "let x = 1;\n",
    "println!(\"{x}\");"
   ]
  },
  {
   "cell_type": "raw",
   "metadata": {},
   "source": "raw text"
  }
 ],
 "metadata": {
  "kernelspec": {"display_name": "Rust", "language": "rust", "name": "rust"},
  "language_info": {"name": "Rust"}
 },
 "nbformat": 4,
 "nbformat_minor": 5
}"##;

    fn decode(text: &str) -> Result<Document, DecodeError> {
        Document::decode(text.as_bytes(), &NotebookValidator::default())
    }

    #[test]
    fn test_decode_notebook() {
        let doc = decode(NOTEBOOK).unwrap();

        assert_eq!(doc.header().nbformat, 4);
        assert_eq!(doc.header().nbformat_minor, 5);
        assert_eq!(doc.header().language.as_deref(), Some("Rust"));
        assert_eq!(doc.cells().len(), 3);

        let kinds: Vec<_> = doc.cells().iter().map(Cell::kind).collect();
        assert_eq!(kinds, [CellKind::Markdown, CellKind::Code, CellKind::Raw]);

        assert_eq!(doc.cells()[0].source(), "# Title\n\nSome prose.");
        assert_eq!(doc.cells()[0].computed_line(), 7);
        assert_eq!(doc.cells()[1].computed_line(), 18);
        assert_eq!(doc.cells()[1].execution_slot(), Some(1));
        assert_eq!(doc.cells()[2].computed_line(), 25);
        assert_eq!(doc.cells()[2].execution_slot(), None);
    }

    #[test]
    fn test_computed_lines_are_non_decreasing() {
        let doc = decode(NOTEBOOK).unwrap();
        let lines: Vec<_> = doc.cells().iter().map(Cell::computed_line).collect();
        assert!(lines.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_decode_is_idempotent() {
        let first = decode(NOTEBOOK).unwrap();
        let text = serde_json::to_string_pretty(first.to_json_value()).unwrap();
        let second = decode(&text).unwrap();

        let sources = |doc: &Document| -> Vec<String> {
            doc.cells().iter().map(|c| c.source().to_string()).collect()
        };
        assert_eq!(sources(&first), sources(&second));
        assert_eq!(first.header(), second.header());
    }

    #[test]
    fn test_language_falls_back_to_kernelspec() {
        let text = r#"{"nbformat": 4, "nbformat_minor": 2,
            "metadata": {"kernelspec": {"language": "rust"}}, "cells": []}"#;
        let doc = decode(text).unwrap();
        assert_eq!(doc.header().language.as_deref(), Some("rust"));
    }

    #[test]
    fn test_unsupported_headers() {
        let python = r#"{"nbformat": 4, "metadata": {"language_info": {"name": "python"}}, "cells": []}"#;
        let err = decode(python).unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::Unsupported);

        let old = r#"{"nbformat": 3, "metadata": {"language_info": {"name": "rust"}}, "cells": []}"#;
        let err = decode(old).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Unsupported {
                nbformat: 3,
                language: Some("rust".to_string())
            }
        );

        let undeclared = r#"{"nbformat": 4, "metadata": {}, "cells": []}"#;
        assert_eq!(decode(undeclared).unwrap_err().kind(), DecodeErrorKind::Unsupported);
    }

    #[test]
    fn test_custom_validator() {
        let text = r#"{"nbformat": 4, "metadata": {}, "cells": []}"#;
        let accept_all = |_: &DocumentHeader| true;
        assert!(Document::decode(text.as_bytes(), &accept_all).is_ok());

        let python = NotebookValidator::with_languages(["python", "rust"]);
        let text = r#"{"nbformat": 4, "metadata": {"language_info": {"name": "Python"}}, "cells": []}"#;
        assert!(Document::decode(text.as_bytes(), &python).is_ok());
    }

    #[test]
    fn test_schema_errors() {
        let header = r#""nbformat": 4, "metadata": {"language_info": {"name": "rust"}}"#;
        let cases = [
            ("[]".to_string(), None),
            (r#"{"cells": []}"#.to_string(), None),
            (format!("{{{header}, \"cells\": {{}}}}"), None),
            (format!("{{{header}, \"cells\": [1]}}"), Some(0)),
            (
                format!("{{{header}, \"cells\": [{{\"cell_type\": \"widget\", \"source\": \"\"}}]}}"),
                Some(0),
            ),
            (
                format!("{{{header}, \"cells\": [{{\"cell_type\": \"code\", \"source\": \"\"}}, {{\"cell_type\": \"code\"}}]}}"),
                Some(1),
            ),
            (
                format!("{{{header}, \"cells\": [{{\"cell_type\": \"code\", \"source\": [1]}}]}}"),
                Some(0),
            ),
            (
                format!("{{{header}, \"cells\": [{{\"cell_type\": \"code\", \"metadata\": 3, \"source\": \"\"}}]}}"),
                Some(0),
            ),
        ];

        for (text, expected_cell) in cases {
            match decode(&text) {
                Err(DecodeError::Schema { cell_index, .. }) => {
                    assert_eq!(cell_index, expected_cell, "input {text}")
                }
                other => panic!("expected schema error for {text}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_invalid_utf8_is_a_syntax_error() {
        let mut bytes = b"{\n\"a\": \"".to_vec();
        bytes.push(0xff);
        bytes.extend_from_slice(b"\"}");

        let err = Document::decode(&bytes, &NotebookValidator::default()).unwrap_err();
        match err {
            DecodeError::Syntax { line, column, .. } => {
                assert_eq!((line, column), (2, 7));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_execution_order_violations() {
        let text = r#"{"nbformat": 4, "metadata": {"language_info": {"name": "rust"}}, "cells": [
 {"cell_type": "code", "execution_count": 2, "metadata": {}, "source": "a();"},
 {"cell_type": "code", "execution_count": null, "metadata": {}, "source": "b();"},
 {"cell_type": "code", "execution_count": 1, "metadata": {}, "source": "c();"},
 {"cell_type": "code", "execution_count": 5, "metadata": {}, "source": "d();"}
]}"#;
        let doc = decode(text).unwrap();
        let violations = doc.execution_order_violations();

        assert_eq!(
            violations,
            [OrderViolation {
                cell_index: 2,
                line: 4,
                slot: 1,
                previous_slot: 2,
            }]
        );
    }
}
