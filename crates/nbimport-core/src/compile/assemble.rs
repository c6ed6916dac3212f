//! Assembly of a document into one program unit.
//!
//! Each transformed cell is parsed with `syn` after being prefixed with
//! `computed_line - 1` newlines, so the spans of every token already report
//! the document line. Nothing has to be shifted after parsing.

use syn::parse::Parser;
use syn::spanned::Spanned;
use syn::{Block, Stmt};

use super::docstring;
use super::transform::Transforms;
use crate::decode::{Cell, CellKind, Document, FormatValidator, NotebookValidator};
use crate::error::{AssembleError, Result};

/// Statements parsed from one cell.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub(crate) cell_index: usize,
    pub(crate) kind: CellKind,
    pub(crate) line: usize,
    pub(crate) stmts: Vec<Stmt>,
}

impl Fragment {
    pub fn cell_index(&self) -> usize {
        self.cell_index
    }

    pub fn kind(&self) -> CellKind {
        self.kind
    }

    /// Document line of the cell's first source line.
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn statements(&self) -> &[Stmt] {
        &self.stmts
    }

    pub fn is_code(&self) -> bool {
        self.kind == CellKind::Code
    }
}

/// Module-level documentation taken from a leading prose cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDoc {
    pub text: String,
    pub line: usize,
}

/// The whole document as one sequence of statements.
#[derive(Debug, Clone)]
pub struct ProgramUnit {
    pub(crate) fragments: Vec<Fragment>,
    pub(crate) doc: Option<ModuleDoc>,
    origin: String,
}

impl ProgramUnit {
    pub(crate) fn new(fragments: Vec<Fragment>, origin: impl Into<String>) -> Self {
        Self {
            fragments,
            doc: None,
            origin: origin.into(),
        }
    }

    /// Fragments in cell order, one per document cell.
    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Fragments of code cells.
    pub fn code_fragments(&self) -> impl Iterator<Item = &Fragment> {
        self.fragments.iter().filter(|fragment| fragment.is_code())
    }

    /// Top-level statements of the whole unit, in order.
    pub fn statements(&self) -> impl Iterator<Item = &Stmt> {
        self.fragments.iter().flat_map(|fragment| fragment.stmts.iter())
    }

    /// Module documentation, if the document starts with a prose cell that
    /// was not promoted onto an item.
    pub fn doc(&self) -> Option<&str> {
        self.doc.as_ref().map(|doc| doc.text.as_str())
    }

    pub fn module_doc(&self) -> Option<&ModuleDoc> {
        self.doc.as_ref()
    }

    /// Where the unit came from (a path or `<memory>`).
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }
}

/// Parses documents into [`ProgramUnit`]s.
#[derive(Debug, Clone)]
pub struct Assembler {
    transforms: Transforms,
    docstrings: bool,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    pub fn new() -> Self {
        Self {
            transforms: Transforms::default(),
            docstrings: true,
        }
    }

    pub fn transforms(mut self, transforms: Transforms) -> Self {
        self.transforms = transforms;
        self
    }

    /// Enable or disable promotion of prose cells to doc attributes.
    pub fn docstrings(mut self, enabled: bool) -> Self {
        self.docstrings = enabled;
        self
    }

    /// Parse every cell of `doc`. The first cell that does not parse aborts
    /// assembly.
    pub fn assemble(&self, doc: &Document) -> std::result::Result<ProgramUnit, AssembleError> {
        let mut fragments = Vec::with_capacity(doc.cells().len());

        for cell in doc.cells() {
            let text = self.transforms.apply(cell);
            let stmts = parse_cell(cell, &text)?;
            fragments.push(Fragment {
                cell_index: cell.index(),
                kind: cell.kind(),
                line: cell.computed_line(),
                stmts,
            });
        }

        let mut unit = ProgramUnit::new(fragments, "<memory>");
        if self.docstrings {
            let promoted = docstring::promote(&mut unit.fragments);
            tracing::debug!("Promoted {} prose cells to doc attributes", promoted);
        }
        unit.doc = docstring::module_doc(&mut unit.fragments);

        tracing::debug!(
            "Assembled {} fragments ({} statements)",
            unit.fragments.len(),
            unit.statements().count()
        );

        Ok(unit)
    }
}

/// Parse transformed cell text into statements whose spans are document lines.
pub(crate) fn parse_cell(cell: &Cell, text: &str) -> std::result::Result<Vec<Stmt>, AssembleError> {
    parse_at_line(cell.index(), cell.computed_line(), text)
}

pub(crate) fn parse_at_line(
    cell_index: usize,
    line: usize,
    text: &str,
) -> std::result::Result<Vec<Stmt>, AssembleError> {
    let first_line = line.max(1);
    let padded = format!("{}{}", "\n".repeat(first_line - 1), text);

    Block::parse_within.parse_str(&padded).map_err(|err| {
        let start = err.span().start();
        // End-of-input errors carry the call-site span; point at the cell's last line.
        let (line, column) = if start.line >= first_line {
            (start.line, start.column + 1)
        } else {
            (first_line + text.lines().count().saturating_sub(1), 1)
        };
        AssembleError {
            cell_index,
            line,
            column,
            message: err.to_string(),
        }
    })
}

/// Span line of a statement.
pub fn stmt_line(stmt: &Stmt) -> usize {
    stmt.span().start().line
}

/// Decodes, validates and assembles documents.
pub struct Compiler {
    validator: Box<dyn FormatValidator + Send + Sync>,
    assembler: Assembler,
}

impl std::fmt::Debug for Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compiler")
            .field("assembler", &self.assembler)
            .finish_non_exhaustive()
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    /// A compiler for Rust notebooks with default transforms.
    pub fn new() -> Self {
        Self {
            validator: Box::new(NotebookValidator::default()),
            assembler: Assembler::new(),
        }
    }

    pub fn validator(mut self, validator: impl FormatValidator + Send + Sync + 'static) -> Self {
        self.validator = Box::new(validator);
        self
    }

    pub fn transforms(mut self, transforms: Transforms) -> Self {
        self.assembler = self.assembler.transforms(transforms);
        self
    }

    pub fn docstrings(mut self, enabled: bool) -> Self {
        self.assembler = self.assembler.docstrings(enabled);
        self
    }

    /// Decode `bytes` into a validated document.
    pub fn decode(&self, bytes: &[u8]) -> Result<Document> {
        Ok(Document::decode(bytes, self.validator.as_ref())?)
    }

    /// Assemble an already decoded document.
    pub fn assemble(&self, doc: &Document, origin: &str) -> Result<ProgramUnit> {
        Ok(self.assembler.assemble(doc)?.with_origin(origin))
    }

    /// Decode and assemble in one step.
    pub fn compile(&self, bytes: &[u8], origin: &str) -> Result<(Document, ProgramUnit)> {
        let doc = self.decode(bytes)?;
        let unit = self.assemble(&doc, origin)?;
        Ok((doc, unit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::Document;

    fn notebook(cells: &str) -> String {
        format!(
            "{{\n \"nbformat\": 4,\n \"nbformat_minor\": 5,\n \"metadata\": {{\"language_info\": {{\"name\": \"rust\"}}}},\n \"cells\": [\n{cells}\n ]\n}}"
        )
    }

    fn assemble(text: &str) -> std::result::Result<ProgramUnit, AssembleError> {
        let doc = Document::decode(text.as_bytes(), &NotebookValidator::default()).unwrap();
        Assembler::new().assemble(&doc)
    }

    #[test]
    fn test_statement_lines_are_document_lines() {
        let text = notebook(
            r#"  {
   "cell_type": "code",
   "metadata": {},
   "source": [
    "let a = 1;\n",
    "\n",
    "let b = a + 1;"
   ]
  },
  {
   "cell_type": "code",
   "metadata": {},
   "source": [
    "fn helper() -> i32 {\n",
    "    2\n",
    "}"
   ]
  }"#,
        );
        let unit = assemble(&text).unwrap();

        let expected = |marker: &str| {
            text.lines()
                .position(|line| line.contains(marker))
                .map(|i| i + 1)
                .unwrap()
        };
        let lines: Vec<_> = unit.statements().map(stmt_line).collect();

        assert_eq!(
            lines,
            [
                expected("let a = 1;"),
                expected("let b = a + 1;"),
                expected("fn helper()"),
            ]
        );
    }

    #[test]
    fn test_one_fragment_per_cell() {
        let text = notebook(
            r#"  {"cell_type": "code", "metadata": {}, "source": ""},
  {"cell_type": "raw", "metadata": {}, "source": "anything at all"},
  {"cell_type": "code", "metadata": {}, "source": "let x = 1;"}"#,
        );
        let unit = assemble(&text).unwrap();

        assert_eq!(unit.fragments().len(), 3);
        assert!(unit.fragments()[0].statements().is_empty());
        assert!(unit.fragments()[1].statements().is_empty());
        assert_eq!(unit.code_fragments().count(), 2);
    }

    #[test]
    fn test_parse_error_points_to_document_line() {
        let text = notebook(
            r#"  {"cell_type": "code", "metadata": {}, "source": "let ok = 1;"},
  {
   "cell_type": "code",
   "metadata": {},
   "source": [
    "let a = 1;\n",
    "let = ;"
   ]
  }"#,
        );
        let err = assemble(&text).unwrap_err();
        let bad_line = text.lines().position(|l| l.contains("let = ;")).unwrap() + 1;

        assert_eq!(err.cell_index, 1);
        assert_eq!(err.line, bad_line);
    }

    #[test]
    fn test_unexpected_end_points_into_cell() {
        let text = notebook(
            r#"  {
   "cell_type": "code",
   "metadata": {},
   "source": [
    "fn broken() {\n",
    "    let x = 1;"
   ]
  }"#,
        );
        let err = assemble(&text).unwrap_err();
        let first = text.lines().position(|l| l.contains("fn broken")).unwrap() + 1;

        assert_eq!(err.cell_index, 0);
        assert!(err.line >= first && err.line <= first + 1, "line {}", err.line);
    }

    #[test]
    fn test_compiler_sets_origin() {
        let text = notebook(r#"  {"cell_type": "code", "metadata": {}, "source": "let x = 1;"}"#);
        let (doc, unit) = Compiler::new().compile(text.as_bytes(), "demo.ipynb").unwrap();

        assert_eq!(doc.cells().len(), 1);
        assert_eq!(unit.origin(), "demo.ipynb");
    }
}
