//! Line-preserving Rust source printer.
//!
//! Tokens are written on the line their span reports. Newlines are only ever
//! inserted, so a token can land on a later line than its span only if the
//! printer was already past it. For tokens produced by the assembler that
//! never happens, which makes line N of the output document line N.

use proc_macro2::{Delimiter, Spacing, TokenStream, TokenTree};
use quote::ToTokens;
use syn::{MacroDelimiter, Stmt, StmtMacro};

use super::assemble::ProgramUnit;

/// Accumulates source text while tracking the current output line.
#[derive(Debug)]
pub struct ProgramPrinter {
    out: String,
    line: usize,
    at_line_start: bool,
    glue_next: bool,
}

impl Default for ProgramPrinter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramPrinter {
    pub fn new() -> Self {
        Self {
            out: String::new(),
            line: 1,
            at_line_start: true,
            glue_next: false,
        }
    }

    /// Current 1-based output line.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Append text that is not tied to a span.
    pub fn push_raw(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.out.push_str(text);
        self.line += text.matches('\n').count();
        self.at_line_start = text.ends_with('\n');
        self.glue_next = false;
    }

    /// Insert newlines until the output is on `line`.
    pub fn move_to(&mut self, line: usize) {
        while self.line < line {
            self.out.push('\n');
            self.line += 1;
            self.at_line_start = true;
        }
    }

    /// Print a statement.
    pub fn print_stmt(&mut self, stmt: &Stmt) {
        self.print_tokens(stmt.to_token_stream());
    }

    /// Print the statements of one fragment so that fragments can follow
    /// each other.
    ///
    /// A trailing value expression is evaluated behind a borrow,
    /// `let _ = &(tail);`, so bindings it names stay usable in later
    /// fragments. Other unterminated statements get a semicolon.
    pub fn print_fragment(&mut self, stmts: &[Stmt]) {
        let Some((last, body)) = stmts.split_last() else {
            return;
        };
        for stmt in body {
            self.print_stmt(stmt);
        }
        if is_tail_expression(last) {
            self.push_raw(" let _ = &(");
            self.print_stmt(last);
            self.push_raw(");");
            return;
        }
        self.print_stmt(last);
        if let Stmt::Macro(StmtMacro {
            semi_token: None, ..
        }) = last
        {
            self.push_raw(";");
        }
    }

    pub fn print_tokens(&mut self, tokens: TokenStream) {
        for tree in tokens {
            self.print_tree(tree);
        }
    }

    fn print_tree(&mut self, tree: TokenTree) {
        match tree {
            TokenTree::Group(group) => {
                let (open, close) = match group.delimiter() {
                    Delimiter::Parenthesis => ("(", ")"),
                    Delimiter::Brace => ("{", "}"),
                    Delimiter::Bracket => ("[", "]"),
                    Delimiter::None => ("", ""),
                };
                if !open.is_empty() {
                    let start = group.span_open().start();
                    self.emit(open, start.line, start.column);
                    self.glue_next = true;
                }
                self.print_tokens(group.stream());
                if !close.is_empty() {
                    let start = group.span_close().start();
                    self.glue_next = true;
                    self.emit(close, start.line, start.column);
                }
            }
            TokenTree::Ident(ident) => {
                let start = ident.span().start();
                self.emit(&ident.to_string(), start.line, start.column);
            }
            TokenTree::Punct(punct) => {
                let start = punct.span().start();
                let mut buf = [0u8; 4];
                self.emit(punct.as_char().encode_utf8(&mut buf), start.line, start.column);
                self.glue_next = punct.spacing() == Spacing::Joint;
            }
            TokenTree::Literal(literal) => {
                let start = literal.span().start();
                self.emit(&literal.to_string(), start.line, start.column);
            }
        }
    }

    fn emit(&mut self, text: &str, line: usize, column: usize) {
        self.move_to(line);
        if self.at_line_start {
            self.out.extend(std::iter::repeat_n(' ', column));
        } else if !self.glue_next {
            self.out.push(' ');
        }
        self.out.push_str(text);
        self.line += text.matches('\n').count();
        self.at_line_start = false;
        self.glue_next = false;
    }

    pub fn finish(self) -> String {
        self.out
    }
}

/// Whether `stmt` is an unterminated expression producing the fragment's
/// value. Brace-delimited and attributed macro calls may expand to items, so
/// they are not.
pub fn is_tail_expression(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Expr(_, None) => true,
        Stmt::Macro(StmtMacro {
            semi_token: None,
            mac,
            attrs,
        }) => attrs.is_empty() && !matches!(mac.delimiter, MacroDelimiter::Brace(_)),
        _ => false,
    }
}

/// Render a unit as a standalone Rust program whose line N is document line N.
///
/// Statements become the body of `fn main`, which opens on line 1. The
/// module doc, if any, is emitted as an escaped `#![doc]` attribute on the
/// same line.
pub fn export_program(unit: &ProgramUnit) -> String {
    let mut printer = ProgramPrinter::new();

    if let Some(doc) = unit.doc() {
        let literal = proc_macro2::Literal::string(doc);
        printer.push_raw(&format!("#![doc = {literal}] "));
    }
    printer.push_raw("fn main() {");

    for fragment in unit.fragments() {
        printer.print_fragment(fragment.statements());
    }

    printer.push_raw("\n}\n");
    printer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::Assembler;
    use crate::decode::{Document, NotebookValidator};

    const NOTEBOOK: &str = r#"{
 "nbformat": 4,
 "metadata": {"language_info": {"name": "rust"}},
 "cells": [
  {
   "cell_type": "markdown",
   "metadata": {},
   "source": ["Intro\n", "text"]
  },
  {
   "cell_type": "code",
   "metadata": {},
   "source": [
    "let a = 1;\n",
    "let b = vec![a, 2];"
   ]
  },
  {
   "cell_type": "code",
   "metadata": {},
   "source": [
    "fn add(x: i32, y: i32) -> i32 {\n",
    "    x + y\n",
    "}\n",
    "add(a, b[1])"
   ]
  }
 ]
}"#;

    fn program() -> String {
        let doc = Document::decode(NOTEBOOK.as_bytes(), &NotebookValidator::default()).unwrap();
        let unit = Assembler::new().assemble(&doc).unwrap();
        export_program(&unit)
    }

    fn doc_line(marker: &str) -> usize {
        NOTEBOOK.lines().position(|l| l.contains(marker)).unwrap() + 1
    }

    fn out_line(program: &str, marker: &str) -> usize {
        program.lines().position(|l| l.contains(marker)).unwrap() + 1
    }

    #[test]
    fn test_export_preserves_lines() {
        let program = program();

        assert_eq!(out_line(&program, "let a = 1"), doc_line("let a = 1;"));
        assert_eq!(out_line(&program, "let b = vec ! [a , 2]"), doc_line("let b = vec!"));
        assert_eq!(out_line(&program, "fn add"), doc_line("fn add"));
        assert_eq!(out_line(&program, "x + y"), doc_line("x + y"));
        assert_eq!(out_line(&program, "add (a , b [1]));"), doc_line("add(a, b[1])"));
    }

    #[test]
    fn test_export_header() {
        let program = program();
        let first = program.lines().next().unwrap();

        assert!(first.starts_with("#![doc = \"Intro\\ntext\"]"));
        assert!(first.ends_with("fn main() {"));
        assert!(program.trim_end().ends_with('}'));
    }

    #[test]
    fn test_joint_punctuation_is_glued() {
        let tokens: TokenStream = "a::b += 1; x => y; 'a: loop {}".parse().unwrap();
        let mut printer = ProgramPrinter::new();
        printer.print_tokens(tokens);
        let out = printer.finish();

        assert!(out.contains("a :: b"));
        assert!(out.contains("+="));
        assert!(out.contains("=>"));
        assert!(out.contains("'a"));
    }

    #[test]
    fn test_multiline_literal_advances_line() {
        let tokens: TokenStream = "let s = \"one\ntwo\";\nlet t = 1;".parse().unwrap();
        let mut printer = ProgramPrinter::new();
        printer.print_tokens(tokens);

        assert_eq!(printer.line(), 3);
        let out = printer.finish();
        assert_eq!(out.lines().nth(2).map(str::trim_start), Some("let t = 1 ;"));
    }

    #[test]
    fn test_trailing_macro_is_terminated() {
        let stmts =
            crate::compile::assemble::parse_at_line(0, 1, "let v = 1;\nprintln!(\"{}\", v)").unwrap();
        let mut printer = ProgramPrinter::new();
        printer.print_fragment(&stmts);
        printer.push_raw(" next();");

        let out = printer.finish();
        assert!(out.contains("let v = 1 ; let _ = &("), "{out}");
        assert!(out.contains("println ! (\"{}\" , v)); next();"), "{out}");
        assert_eq!(
            out.lines().nth(1).map(str::trim_start),
            Some("println ! (\"{}\" , v)); next();")
        );
    }

    #[test]
    fn test_trailing_value_is_borrowed() {
        let stmts =
            crate::compile::assemble::parse_at_line(0, 1, "let s = String::new();\ns").unwrap();
        let mut printer = ProgramPrinter::new();
        printer.print_fragment(&stmts);

        assert_eq!(printer.finish(), "let s = String :: new () ; let _ = &(\ns);");
    }

    #[test]
    fn test_brace_macro_is_not_wrapped() {
        let stmts =
            crate::compile::assemble::parse_at_line(0, 1, "thread_local! { static N: u8 = 1; }")
                .unwrap();
        assert!(!is_tail_expression(&stmts[0]));

        let mut printer = ProgramPrinter::new();
        printer.print_fragment(&stmts);
        let out = printer.finish();
        assert!(!out.contains("let _"), "{out}");
    }
}
