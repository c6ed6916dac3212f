//! Parsing of rustc JSON diagnostics.
//!
//! Programs are printed with their statements on document lines, so the
//! lines rustc reports need no mapping. Only the file name is rewritten to
//! the unit's origin.

use serde::Deserialize;

/// Severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Error,
    Warning,
    Note,
    Help,
}

/// A location in the notebook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub origin: String,
    /// Document line (1-indexed)
    pub line: usize,
    /// Column (1-indexed)
    pub column: usize,
}

/// A compiler diagnostic with its location translated to the notebook.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,
    /// Error code (e.g., "E0308")
    pub code: Option<String>,
    pub level: DiagnosticLevel,
    /// Primary location
    pub location: Option<Location>,
    /// rustc's rendered text with the origin in place of the build file
    pub rendered: Option<String>,
}

impl Diagnostic {
    /// One-line summary: `origin:line:col: message`.
    pub fn summary(&self) -> String {
        let code = self
            .code
            .as_ref()
            .map(|code| format!("[{code}]"))
            .unwrap_or_default();
        match &self.location {
            Some(loc) => format!(
                "{}:{}:{}: {}{}",
                loc.origin, loc.line, loc.column, self.message, code
            ),
            None => format!("{}{}", self.message, code),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagnosticLevel::Error
    }
}

/// Rustc JSON diagnostic format.
#[derive(Debug, Deserialize)]
struct RustcDiagnostic {
    message: String,
    code: Option<RustcCode>,
    level: String,
    spans: Vec<RustcSpan>,
    rendered: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RustcCode {
    code: String,
}

#[derive(Debug, Deserialize)]
struct RustcSpan {
    file_name: String,
    line_start: usize,
    column_start: usize,
    is_primary: bool,
}

/// Turns rustc's `--error-format=json` output into [`Diagnostic`]s.
#[derive(Debug, Clone)]
pub struct DiagnosticParser {
    /// File name passed to rustc
    build_file: String,
    /// Name reported instead of the build file
    origin: String,
}

impl DiagnosticParser {
    pub fn new(build_file: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            build_file: build_file.into(),
            origin: origin.into(),
        }
    }

    /// Parse rustc JSON output, one diagnostic per line.
    pub fn parse_rustc_output(&self, json_output: &str) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        for line in json_output.lines() {
            if !line.trim_start().starts_with('{') {
                continue;
            }

            match serde_json::from_str::<RustcDiagnostic>(line) {
                Ok(diagnostic) => {
                    if let Some(diagnostic) = self.map_diagnostic(diagnostic) {
                        diagnostics.push(diagnostic);
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        "Failed to parse rustc JSON: {} (line: {})",
                        e,
                        line.chars().take(100).collect::<String>()
                    );
                }
            }
        }

        diagnostics
    }

    fn map_diagnostic(&self, diagnostic: RustcDiagnostic) -> Option<Diagnostic> {
        let level = match diagnostic.level.as_str() {
            "error" | "error: internal compiler error" => DiagnosticLevel::Error,
            "warning" => DiagnosticLevel::Warning,
            "note" => DiagnosticLevel::Note,
            "help" => DiagnosticLevel::Help,
            _ => return None,
        };

        let location = diagnostic
            .spans
            .iter()
            .find(|span| span.is_primary && span.file_name.ends_with(&self.build_file))
            .map(|span| Location {
                origin: self.origin.clone(),
                line: span.line_start,
                column: span.column_start,
            });

        let rendered = diagnostic
            .rendered
            .map(|text| text.replace(&self.build_file, &self.origin));

        Some(Diagnostic {
            message: diagnostic.message,
            code: diagnostic.code.map(|c| c.code),
            level,
            location,
            rendered,
        })
    }
}
