//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};

/// Pretty-printed nbformat v4 notebook with one source line per array element,
/// the way Jupyter saves them.
pub fn notebook(cells: &[(&str, &str)]) -> String {
    let cells: Vec<Value> = cells
        .iter()
        .map(|(kind, source)| {
            let lines: Vec<&str> = source.split_inclusive('\n').collect();
            let mut cell = json!({
                "cell_type": kind,
                "metadata": {},
                "source": lines,
            });
            if *kind == "code" {
                cell["execution_count"] = Value::Null;
                cell["outputs"] = json!([]);
            }
            cell
        })
        .collect();

    let doc = json!({
        "nbformat": 4,
        "nbformat_minor": 5,
        "metadata": {
            "kernelspec": {"display_name": "Rust", "language": "rust", "name": "rust"},
            "language_info": {"name": "rust"}
        },
        "cells": cells,
    });
    serde_json::to_string_pretty(&doc).unwrap()
}

/// 1-based line of the first line of `text` containing `needle`.
pub fn line_of(text: &str, needle: &str) -> usize {
    text.lines()
        .position(|line| line.contains(needle))
        .map(|index| index + 1)
        .unwrap_or_else(|| panic!("`{needle}` not found"))
}

/// A temporary directory holding notebooks.
pub struct NotebookDir {
    dir: tempfile::TempDir,
}

impl NotebookDir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("Failed to create test directory"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a notebook built from `cells` at `relative`.
    pub fn write(&self, relative: &str, cells: &[(&str, &str)]) -> PathBuf {
        self.write_raw(relative, &notebook(cells))
    }

    pub fn write_raw(&self, relative: &str, text: &str) -> PathBuf {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        fs::write(&path, text).expect("Failed to write notebook");
        path
    }
}
