//! Per-kind cell text normalization.
//!
//! Every transform must keep the number of lines of its input: the assembler
//! relies on line `k` of the transformed text being line `k` of the cell.

use std::fmt;
use std::sync::Arc;

use crate::decode::{Cell, CellKind};

/// A text transform applied to one kind of cell.
pub type TransformFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// The transforms applied to code, prose and raw cells.
#[derive(Clone)]
pub struct Transforms {
    code: TransformFn,
    markdown: TransformFn,
    raw: TransformFn,
}

impl Transforms {
    /// Replace the code transform.
    pub fn with_code(mut self, f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.code = Arc::new(f);
        self
    }

    /// Replace the prose transform.
    pub fn with_markdown(mut self, f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.markdown = Arc::new(f);
        self
    }

    /// Replace the raw transform.
    pub fn with_raw(mut self, f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.raw = Arc::new(f);
        self
    }

    /// Transform a cell's source according to its kind.
    pub fn apply(&self, cell: &Cell) -> String {
        self.apply_to(cell.kind(), cell.source())
    }

    /// Transform text as if it came from a cell of `kind`.
    pub fn apply_to(&self, kind: CellKind, text: &str) -> String {
        match kind {
            CellKind::Code => (self.code)(text),
            CellKind::Markdown => (self.markdown)(text),
            CellKind::Raw => (self.raw)(text),
        }
    }
}

impl Default for Transforms {
    fn default() -> Self {
        Self {
            code: Arc::new(str::to_string),
            markdown: Arc::new(prose_literal),
            raw: Arc::new(comment_out),
        }
    }
}

impl fmt::Debug for Transforms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transforms").finish_non_exhaustive()
    }
}

/// Wrap prose in a raw string literal statement.
///
/// The shortest delimiter that does not occur in the text is chosen. CRLF
/// becomes LF and stray carriage returns are dropped, since rustc rejects
/// bare CR inside raw strings.
pub fn prose_literal(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "");

    let mut hashes = 0;
    while text.contains(&format!("\"{}", "#".repeat(hashes))) {
        hashes += 1;
    }
    let fence = "#".repeat(hashes);

    format!("r{fence}\"{text}\"{fence};")
}

/// Turn every line into a line comment.
pub fn comment_out(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    text.split('\n')
        .map(|line| {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                "//".to_string()
            } else {
                // The space keeps `/` and `!` lines from turning into doc comments.
                format!("// {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Remove the indentation shared by all non-blank lines.
///
/// Indentation is compared character by character, so lines indented with
/// different whitespace share only their common prefix.
pub fn dedent(text: &str) -> String {
    let indent = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(leading_whitespace)
        .reduce(common_prefix)
        .unwrap_or("");

    if indent.is_empty() {
        return text.to_string();
    }

    text.split('\n')
        .map(|line| {
            if line.trim().is_empty() {
                line.trim_start_matches([' ', '\t'])
            } else {
                line.strip_prefix(indent).unwrap_or(line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn leading_whitespace(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}

fn common_prefix<'a>(a: &'a str, b: &str) -> &'a str {
    let end = a
        .char_indices()
        .zip(b.chars())
        .find(|((_, x), y)| x != y)
        .map_or(a.len().min(b.len()), |((i, _), _)| i);
    &a[..end]
}
