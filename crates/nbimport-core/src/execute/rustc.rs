//! A kernel that compiles cells with rustc and runs them as a program.
//!
//! Rust has no interpreter, so the kernel replays: it keeps every fragment
//! that ran successfully and, to run cell *k*, prints those fragments plus
//! cell *k* into one `fn main`, compiles it and runs the binary. Each cell is
//! preceded by a marker on stdout and stderr carrying a per-run nonce; only
//! output after cell *k*'s marker is forwarded into the capture scope.
//!
//! The printer keeps statements on their document lines, so rustc
//! diagnostics and panic locations are notebook lines as reported.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Output as ProcessOutput, Stdio};

use quote::ToTokens;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use syn::Stmt;

use super::capture;
use super::diagnostics::DiagnosticParser;
use super::kernel::{CellUnit, Kernel};
use super::record::MimeBundle;
use super::toolchain::Toolchain;
use crate::compile::{ProgramPrinter, is_tail_expression};
use crate::error::{CellFailure, Error, Result};

/// Frame separator written by the generated program.
const RECORD_SEPARATOR: char = '\u{1e}';

/// Placeholder replaced with the run nonce in [`PRELUDE`].
const NONCE_PLACEHOLDER: &str = "@NONCE@";

/// Support code appended after `fn main`. It installs a panic hook that
/// reports panics as frames, writes cell markers and implements the display
/// helpers cells can call as `nbimport::display_html(...)` and friends.
const PRELUDE: &str = r#####"
#[allow(dead_code)]
mod __nbimport {
    use std::io::Write;

    const MARK: &str = "\u{1e}@NONCE@:";

    pub fn escape(text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for ch in text.chars() {
            match ch {
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\u{1e}' => out.push_str("\\x1e"),
                other => out.push(other),
            }
        }
        out
    }

    fn frame(to_stderr: bool, body: &str) {
        if to_stderr {
            let mut err = std::io::stderr().lock();
            let _ = write!(err, "{MARK}{body}\n");
            let _ = err.flush();
        } else {
            let mut out = std::io::stdout().lock();
            let _ = write!(out, "{MARK}{body}\n");
            let _ = out.flush();
        }
    }

    pub fn init() {
        std::panic::set_hook(Box::new(|info| {
            let payload = info.payload();
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                String::from("Box<dyn Any>")
            };
            let (line, column) = info.location().map_or((0, 0), |l| (l.line(), l.column()));
            frame(true, &format!("panic:{line}:{column}:{}", escape(&message)));
        }));
    }

    pub fn marker(cell: usize) {
        frame(false, &format!("cell:{cell}"));
        frame(true, &format!("cell:{cell}"));
    }

    pub fn display(mime: &str, data: &str) {
        frame(false, &format!("display:{mime}:{}", escape(data)));
    }

    pub fn display_html(html: impl AsRef<str>) {
        display("text/html", html.as_ref());
    }

    pub fn display_markdown(markdown: impl AsRef<str>) {
        display("text/markdown", markdown.as_ref());
    }

    pub fn display_text(text: impl AsRef<str>) {
        display("text/plain", text.as_ref());
    }

    pub fn result(text: Option<String>) {
        if let Some(text) = text {
            if text != "()" {
                frame(false, &format!("result:{}", escape(&text)));
            }
        }
    }

    pub struct Show<'a, T>(pub &'a T);

    pub trait ViaDebug {
        fn __nbimport_show(&self) -> Option<String>;
    }

    impl<T: std::fmt::Debug> ViaDebug for Show<'_, T> {
        fn __nbimport_show(&self) -> Option<String> {
            Some(format!("{:?}", self.0))
        }
    }

    pub trait Fallback {
        fn __nbimport_show(&self) -> Option<String>;
    }

    impl<T> Fallback for &Show<'_, T> {
        fn __nbimport_show(&self) -> Option<String> {
            None
        }
    }
}

#[allow(dead_code)]
mod nbimport {
    pub use super::__nbimport::{display, display_html, display_markdown, display_text};
}
"#####;

/// Settings for [`RustcKernel`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RustcConfig {
    /// rustc binary; found on `PATH` when unset.
    pub rustc: Option<PathBuf>,
    pub edition: String,
    pub opt_level: u8,
    /// Forward warnings about the running cell to its stderr.
    pub show_warnings: bool,
    /// Extra arguments passed to rustc.
    pub extra_args: Vec<String>,
}

impl Default for RustcConfig {
    fn default() -> Self {
        Self {
            rustc: None,
            edition: "2021".to_string(),
            opt_level: 0,
            show_warnings: false,
            extra_args: Vec::new(),
        }
    }
}

/// Compiles and runs cells with rustc, replaying earlier successful cells.
pub struct RustcKernel {
    toolchain: Toolchain,
    config: RustcConfig,
    accepted: Vec<(usize, Vec<Stmt>)>,
    workdir: tempfile::TempDir,
    runs: u64,
}

impl std::fmt::Debug for RustcKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RustcKernel")
            .field("rustc", &self.toolchain.rustc_path())
            .field("accepted", &self.accepted.len())
            .field("workdir", &self.workdir.path())
            .finish()
    }
}

impl RustcKernel {
    /// A kernel using the `rustc` on `PATH`.
    pub fn new() -> Result<Self> {
        Self::with_config(RustcConfig::default())
    }

    pub fn with_config(config: RustcConfig) -> Result<Self> {
        let toolchain = match &config.rustc {
            Some(path) => Toolchain::at(path)?,
            None => Toolchain::detect()?,
        };
        let workdir = tempfile::Builder::new()
            .prefix("nbimport-")
            .tempdir()
            .map_err(Error::Io)?;

        Ok(Self {
            toolchain,
            config,
            accepted: Vec::new(),
            workdir,
            runs: 0,
        })
    }

    pub fn config(&self) -> &RustcConfig {
        &self.config
    }

    /// Number of cells that will be replayed before the next one.
    pub fn accepted_cells(&self) -> usize {
        self.accepted.len()
    }

    /// Forget every replayed cell.
    pub fn reset(&mut self) {
        self.accepted.clear();
    }

    /// Print the program that runs `cell` after the accepted cells.
    fn build_program(&self, cell: &CellUnit<'_>, nonce: &str) -> String {
        let mut printer = ProgramPrinter::new();
        printer.push_raw(
            "fn main() { __nbimport::init(); use __nbimport::{Fallback as _, ViaDebug as _};",
        );

        for (index, stmts) in &self.accepted {
            printer.push_raw(&format!(" __nbimport::marker({index});"));
            printer.print_fragment(stmts);
        }

        printer.push_raw(&format!(" __nbimport::marker({});", cell.index));
        match cell.statements.split_last() {
            Some((tail, body)) if is_tail_expression(tail) => {
                for stmt in body {
                    printer.print_stmt(stmt);
                }
                printer.push_raw(" { let __nbimport_value = &(");
                printer.print_tokens(tail.to_token_stream());
                printer.push_raw(
                    "); __nbimport::result((&__nbimport::Show(&__nbimport_value)).__nbimport_show()); }",
                );
            }
            _ => printer.print_fragment(cell.statements),
        }

        printer.push_raw("\n}\n");
        let mut program = printer.finish();
        program.push_str(&PRELUDE.replace(NONCE_PLACEHOLDER, nonce));
        program
    }

    fn compile(&self, source_path: &Path, binary: &Path, cell: &CellUnit<'_>) -> std::result::Result<(), CellFailure> {
        let mut command = self.toolchain.rustc();
        command
            .arg("--edition")
            .arg(&self.config.edition)
            .arg("--error-format=json")
            .arg("-C")
            .arg(format!("opt-level={}", self.config.opt_level));
        if !self.config.show_warnings {
            command.args(["-A", "warnings"]);
        }
        command
            .args(&self.config.extra_args)
            .arg("-o")
            .arg(binary)
            .arg(source_path)
            .stdin(Stdio::null());

        let output = command
            .output()
            .map_err(|e| CellFailure::new("ToolchainError", format!("failed to run rustc: {e}")))?;

        let parser = DiagnosticParser::new(source_path.display().to_string(), cell.origin);
        let diagnostics = parser.parse_rustc_output(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            if self.config.show_warnings {
                for warning in diagnostics.iter().filter(|d| {
                    !d.is_error() && d.location.as_ref().is_some_and(|loc| loc.line >= cell.line)
                }) {
                    if let Some(rendered) = &warning.rendered {
                        capture::write_stderr(rendered);
                    }
                }
            }
            return Ok(());
        }

        let errors: Vec<_> = diagnostics.iter().filter(|d| d.is_error()).collect();
        let evalue = errors
            .iter()
            .find(|d| d.location.is_some())
            .or(errors.first())
            .map_or_else(|| "compilation failed".to_string(), |d| d.summary());
        let traceback = errors
            .iter()
            .filter_map(|d| d.rendered.clone())
            .collect();

        Err(CellFailure::new("CompileError", evalue).with_traceback(traceback))
    }

    fn run(&self, binary: &Path) -> std::result::Result<ProcessOutput, CellFailure> {
        std::process::Command::new(binary)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| CellFailure::new("IoError", format!("failed to run cell program: {e}")))
    }
}

impl Kernel for RustcKernel {
    fn name(&self) -> &str {
        "rustc"
    }

    fn run_cell(&mut self, cell: &CellUnit<'_>) -> std::result::Result<(), CellFailure> {
        if cell.statements.is_empty() {
            return Ok(());
        }

        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let run = self.runs;
        self.runs += 1;

        let source_path = self.workdir.path().join(format!("cell_{run}.rs"));
        let binary = self
            .workdir
            .path()
            .join(format!("cell_{run}{}", std::env::consts::EXE_SUFFIX));

        let program = self.build_program(cell, &nonce);
        fs::write(&source_path, &program)
            .map_err(|e| CellFailure::new("IoError", format!("failed to write program: {e}")))?;

        tracing::debug!(
            "Compiling cell {} (line {}) with {} replayed cells",
            cell.index,
            cell.line,
            self.accepted.len()
        );

        let result = self
            .compile(&source_path, &binary, cell)
            .and_then(|()| self.run(&binary))
            .and_then(|output| forward_output(&output, &nonce, cell));

        let _ = fs::remove_file(&source_path);
        let _ = fs::remove_file(&binary);

        if result.is_ok() {
            self.accepted.push((cell.index, cell.statements.to_vec()));
        }
        result
    }
}

/// A piece of the program's output stream.
#[derive(Debug, PartialEq, Eq)]
enum Chunk<'t> {
    Text(&'t str),
    Frame(&'t str),
}

fn chunks<'t>(text: &'t str, mark: &str) -> Vec<Chunk<'t>> {
    let mut out = Vec::new();
    let mut rest = text;

    while let Some(pos) = rest.find(mark) {
        if pos > 0 {
            out.push(Chunk::Text(&rest[..pos]));
        }
        let body_start = pos + mark.len();
        let body_end = rest[body_start..]
            .find('\n')
            .map_or(rest.len(), |i| body_start + i);
        out.push(Chunk::Frame(&rest[body_start..body_end]));
        rest = rest.get(body_end + 1..).unwrap_or("");
    }
    if !rest.is_empty() {
        out.push(Chunk::Text(rest));
    }

    out
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('x') => {
                let code: String = chars.by_ref().take(2).collect();
                match u32::from_str_radix(&code, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\x");
                        out.push_str(&code);
                    }
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}

/// The part of `text` after the marker of `cell`.
fn after_marker<'t>(text: &'t str, mark: &str, cell: usize) -> &'t str {
    let marker = format!("{mark}cell:{cell}\n");
    text.find(&marker)
        .map_or("", |pos| &text[pos + marker.len()..])
}

/// Forward the running cell's output into the capture scope and turn the
/// exit status into a result.
fn forward_output(
    output: &ProcessOutput,
    nonce: &str,
    cell: &CellUnit<'_>,
) -> std::result::Result<(), CellFailure> {
    let mark = format!("{RECORD_SEPARATOR}{nonce}:");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    for chunk in chunks(after_marker(&stdout, &mark, cell.index), &mark) {
        match chunk {
            Chunk::Text(text) => capture::write_stdout(text),
            Chunk::Frame(body) => {
                if let Some(rest) = body.strip_prefix("display:")
                    && let Some((mime, data)) = rest.split_once(':')
                {
                    let bundle = MimeBundle::new().with(mime, Value::String(unescape(data)));
                    capture::publish_display(bundle, Map::new());
                } else if let Some(text) = body.strip_prefix("result:") {
                    capture::publish_result(MimeBundle::text(unescape(text)));
                }
            }
        }
    }

    let mut panic = None;
    // Panics are looked for in the whole stream: a replayed cell may panic
    // before the running cell's marker is written.
    for chunk in chunks(&stderr, &mark) {
        if let Chunk::Frame(body) = chunk
            && let Some(rest) = body.strip_prefix("panic:")
        {
            panic = Some(rest.to_string());
        }
    }
    for chunk in chunks(after_marker(&stderr, &mark, cell.index), &mark) {
        if let Chunk::Text(text) = chunk {
            capture::write_stderr(text);
        }
    }

    if let Some(frame) = panic {
        let mut parts = frame.splitn(3, ':');
        let line = parts.next().unwrap_or("0");
        let column = parts.next().unwrap_or("0");
        let message = unescape(parts.next().unwrap_or(""));
        return Err(CellFailure::new("panic", message)
            .with_traceback(vec![format!("panicked at {}:{line}:{column}", cell.origin)]));
    }

    if !output.status.success() {
        return Err(CellFailure::new(
            "ExitStatus",
            format!("cell program exited with {}", output.status),
        ));
    }

    Ok(())
}
