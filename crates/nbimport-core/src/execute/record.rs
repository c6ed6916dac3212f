//! Captured cell outputs and their nbformat representation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CellFailure;

/// Output stream of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamName {
    Stdout,
    Stderr,
}

impl StreamName {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamName::Stdout => "stdout",
            StreamName::Stderr => "stderr",
        }
    }
}

/// Representations of one displayed value, keyed by MIME type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MimeBundle(BTreeMap<String, Value>);

impl MimeBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bundle holding only `text/plain`.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new().with("text/plain", Value::String(text.into()))
    }

    pub fn with(mut self, mime: impl Into<String>, data: Value) -> Self {
        self.insert(mime, data);
        self
    }

    pub fn insert(&mut self, mime: impl Into<String>, data: Value) {
        self.0.insert(mime.into(), data);
    }

    pub fn get(&self, mime: &str) -> Option<&Value> {
        self.0.get(mime)
    }

    /// The `text/plain` representation, if present.
    pub fn plain_text(&self) -> Option<&str> {
        self.get("text/plain").and_then(Value::as_str)
    }

    pub fn mime_types(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// nbformat stores textual data as a list of lines.
    fn to_nbformat(&self) -> Map<String, Value> {
        self.0
            .iter()
            .map(|(mime, data)| {
                let data = match data {
                    Value::String(text) if mime.starts_with("text/") || mime.ends_with("+xml") => {
                        Value::from(split_lines(text))
                    }
                    other => other.clone(),
                };
                (mime.clone(), data)
            })
            .collect()
    }
}

/// One output of a cell, in the order it was produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Stream { name: StreamName, text: String },
    DisplayData { data: MimeBundle, metadata: Map<String, Value> },
    ExecuteResult { data: MimeBundle, metadata: Map<String, Value> },
    Error(CellFailure),
}

/// Everything a single cell produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRecord {
    /// Document index of the cell.
    pub cell_index: usize,
    /// Document line of the cell.
    pub line: usize,
    pub execution_count: u64,
    pub outputs: Vec<Output>,
}

impl CaptureRecord {
    pub fn new(cell_index: usize, line: usize, execution_count: u64) -> Self {
        Self {
            cell_index,
            line,
            execution_count,
            outputs: Vec::new(),
        }
    }

    /// Concatenated text of one stream.
    pub fn stream_text(&self, stream: StreamName) -> String {
        self.outputs
            .iter()
            .filter_map(|output| match output {
                Output::Stream { name, text } if *name == stream => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn stdout(&self) -> String {
        self.stream_text(StreamName::Stdout)
    }

    pub fn stderr(&self) -> String {
        self.stream_text(StreamName::Stderr)
    }

    /// Display data published by the cell.
    pub fn displays(&self) -> impl Iterator<Item = &MimeBundle> {
        self.outputs.iter().filter_map(|output| match output {
            Output::DisplayData { data, .. } => Some(data),
            _ => None,
        })
    }

    /// The value of the cell's trailing expression.
    pub fn result(&self) -> Option<&MimeBundle> {
        self.outputs.iter().find_map(|output| match output {
            Output::ExecuteResult { data, .. } => Some(data),
            _ => None,
        })
    }

    pub fn error(&self) -> Option<&CellFailure> {
        self.outputs.iter().find_map(|output| match output {
            Output::Error(failure) => Some(failure),
            _ => None,
        })
    }

    pub fn is_error(&self) -> bool {
        self.error().is_some()
    }

    /// The outputs as nbformat v4 `outputs` entries.
    pub fn to_nbformat(&self) -> Vec<NbOutput> {
        self.outputs
            .iter()
            .map(|output| match output {
                Output::Stream { name, text } => NbOutput::Stream {
                    name: *name,
                    text: split_lines(text),
                },
                Output::DisplayData { data, metadata } => NbOutput::DisplayData {
                    data: data.to_nbformat(),
                    metadata: metadata.clone(),
                },
                Output::ExecuteResult { data, metadata } => NbOutput::ExecuteResult {
                    execution_count: self.execution_count,
                    data: data.to_nbformat(),
                    metadata: metadata.clone(),
                },
                Output::Error(failure) => NbOutput::Error {
                    ename: failure.ename.clone(),
                    evalue: failure.evalue.clone(),
                    traceback: failure.traceback.clone(),
                },
            })
            .collect()
    }
}

/// nbformat v4 cell output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "output_type")]
pub enum NbOutput {
    /// Standard output/error
    #[serde(rename = "stream")]
    Stream { name: StreamName, text: Vec<String> },

    /// Value of the trailing expression
    #[serde(rename = "execute_result")]
    ExecuteResult {
        execution_count: u64,
        data: Map<String, Value>,
        metadata: Map<String, Value>,
    },

    /// Display data
    #[serde(rename = "display_data")]
    DisplayData {
        data: Map<String, Value>,
        metadata: Map<String, Value>,
    },

    /// Error output
    #[serde(rename = "error")]
    Error {
        ename: String,
        evalue: String,
        traceback: Vec<String>,
    },
}

fn split_lines(text: &str) -> Vec<String> {
    text.split_inclusive('\n').map(str::to_string).collect()
}
