//! End-to-end tests for the nbimport CLI.

#![allow(deprecated)] // Allow deprecated Command::cargo_bin for tests

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};
use tempfile::TempDir;

// =============================================================================
// Test Helpers
// =============================================================================

/// A temporary directory with one notebook in it.
struct TestNotebook {
    temp_dir: TempDir,
    notebook_path: PathBuf,
}

impl TestNotebook {
    fn new(filename: &str, cells: &[(&str, &str)]) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let notebook_path = temp_dir.path().join(filename);
        fs::write(&notebook_path, notebook_json(cells)).expect("Failed to write notebook");

        Self {
            temp_dir,
            notebook_path,
        }
    }

    fn raw(filename: &str, text: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let notebook_path = temp_dir.path().join(filename);
        fs::write(&notebook_path, text).expect("Failed to write notebook");

        Self {
            temp_dir,
            notebook_path,
        }
    }

    fn path(&self) -> &str {
        self.notebook_path.to_str().unwrap()
    }

    fn sibling(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }
}

fn notebook_json(cells: &[(&str, &str)]) -> String {
    let cells: Vec<Value> = cells
        .iter()
        .map(|(kind, source)| {
            json!({
                "cell_type": kind,
                "metadata": {},
                "source": source.split_inclusive('\n').collect::<Vec<_>>(),
            })
        })
        .collect();
    serde_json::to_string_pretty(&json!({
        "nbformat": 4,
        "nbformat_minor": 5,
        "metadata": {"language_info": {"name": "rust"}},
        "cells": cells,
    }))
    .unwrap()
}

fn nbimport() -> Command {
    Command::cargo_bin("nbimport").expect("Failed to find nbimport binary")
}

fn rustc_available() -> bool {
    std::process::Command::new("rustc")
        .arg("--version")
        .output()
        .is_ok_and(|output| output.status.success())
}

fn simple_notebook() -> TestNotebook {
    TestNotebook::new(
        "simple.ipynb",
        &[
            ("markdown", "Simple notebook.\n\nDoubles a number."),
            ("code", "let base: i32 = 21;"),
            ("code", "let doubled = base * 2;\nprintln!(\"doubled={doubled}\");"),
            ("code", "doubled + 1"),
        ],
    )
}

// =============================================================================
// nbimport check
// =============================================================================

#[test]
fn test_check_reports_cells_and_parameters() {
    let notebook = simple_notebook();

    nbimport()
        .args(["check", notebook.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("4 (3 code, 1 other)"))
        .stdout(predicate::str::contains("Simple notebook."))
        .stdout(predicate::str::contains("base: i32 = 21"));
}

#[test]
fn test_check_nonexistent_notebook() {
    nbimport()
        .args(["check", "/nonexistent/notebook.ipynb"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Notebook not found"));
}

#[test]
fn test_check_invalid_json_shows_hint() {
    let notebook = TestNotebook::raw("broken.ipynb", "{\n  \"cells\": [\n");

    nbimport()
        .args(["check", notebook.path()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("hint:"));
}

#[test]
fn test_check_syntax_error_names_line() {
    let notebook = TestNotebook::new("bad.ipynb", &[("code", "let x = ;")]);

    nbimport()
        .args(["check", notebook.path()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("line 7"));
}

// =============================================================================
// nbimport export
// =============================================================================

#[test]
fn test_export_keeps_notebook_lines() {
    let notebook = simple_notebook();
    let text = fs::read_to_string(&notebook.notebook_path).unwrap();
    let expected = text
        .lines()
        .position(|line| line.contains("let base"))
        .unwrap()
        + 1;

    let output = nbimport()
        .args(["export", notebook.path()])
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success());

    let program = String::from_utf8(output.stdout).unwrap();
    let actual = program
        .lines()
        .position(|line| line.contains("let base"))
        .unwrap()
        + 1;
    assert_eq!(actual, expected);
    assert!(program.starts_with("#![doc = "));
}

#[test]
fn test_export_to_file() {
    let notebook = simple_notebook();
    let target = notebook.sibling("simple.rs");

    nbimport()
        .args(["export", notebook.path(), "-o", target.to_str().unwrap()])
        .assert()
        .success();

    let program = fs::read_to_string(target).unwrap();
    assert!(program.contains("fn main() {"));
}

// =============================================================================
// nbimport run
// =============================================================================

#[test]
fn test_run_rejects_malformed_param() {
    let notebook = simple_notebook();

    nbimport()
        .args(["run", notebook.path(), "--param", "base"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("NAME=EXPR"));
}

#[test]
fn test_run_prints_outputs() {
    if !rustc_available() {
        eprintln!("rustc not found, skipping");
        return;
    }
    let notebook = simple_notebook();

    nbimport()
        .args(["run", notebook.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("doubled=42"))
        .stdout(predicate::str::contains("43"));
}

#[test]
fn test_run_with_param_and_write() {
    if !rustc_available() {
        eprintln!("rustc not found, skipping");
        return;
    }
    let notebook = simple_notebook();
    let target = notebook.sibling("executed.ipynb");

    nbimport()
        .args([
            "run",
            notebook.path(),
            "--param",
            "base=5",
            "--json",
            "--write",
            target.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("doubled=10"));

    let executed: Value = serde_json::from_str(&fs::read_to_string(target).unwrap()).unwrap();
    let last = &executed["cells"][3];
    assert_eq!(last["outputs"][0]["output_type"], "execute_result");
    assert_eq!(last["outputs"][0]["data"]["text/plain"], json!(["11"]));
    assert!(last["metadata"].get("computed_line").is_none());
}

#[test]
fn test_run_failure_exits_nonzero() {
    if !rustc_available() {
        eprintln!("rustc not found, skipping");
        return;
    }
    let notebook = TestNotebook::new(
        "panics.ipynb",
        &[
            ("code", "let empty: Option<i32> = None;"),
            ("code", "empty.unwrap();"),
            ("code", "println!(\"after\");"),
        ],
    );

    nbimport()
        .args(["run", notebook.path()])
        .assert()
        .failure()
        .stdout(predicate::str::contains("panic"))
        .stdout(predicate::str::contains("after").not());

    nbimport()
        .args(["run", notebook.path(), "--keep-going"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("after"))
        .stderr(predicate::str::contains("1 cell(s) failed"));
}
