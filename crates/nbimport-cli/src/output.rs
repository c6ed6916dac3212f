//! Terminal rendering of captured cell outputs.

use nbimport_core::execute::{CaptureRecord, Output, StreamName};

use crate::colors;

fn indented(text: &str, color: &str) {
    for line in text.lines() {
        println!("  {color}{line}{}", colors::RESET);
    }
}

/// Print everything one cell produced, in order.
pub fn print_record(record: &CaptureRecord) {
    println!(
        "\n{}[{}]{} {}line {}{}",
        colors::CYAN,
        record.execution_count,
        colors::RESET,
        colors::DIM,
        record.line,
        colors::RESET
    );

    for output in &record.outputs {
        match output {
            Output::Stream {
                name: StreamName::Stdout,
                text,
            } => indented(text, ""),
            Output::Stream {
                name: StreamName::Stderr,
                text,
            } => indented(text, colors::YELLOW),
            Output::DisplayData { data, .. } => match data.plain_text() {
                Some(text) => indented(text, ""),
                None => {
                    let mimes: Vec<&str> = data.mime_types().collect();
                    indented(&format!("<display {}>", mimes.join(", ")), colors::DIM);
                }
            },
            Output::ExecuteResult { data, .. } => {
                let text = data.plain_text().unwrap_or_default();
                println!(
                    "  {}Out[{}]:{} {text}",
                    colors::GREEN,
                    record.execution_count,
                    colors::RESET
                );
            }
            Output::Error(failure) => {
                println!(
                    "  {}{}: {}{}",
                    colors::RED,
                    failure.ename,
                    failure.evalue,
                    colors::RESET
                );
                for line in &failure.traceback {
                    indented(line, colors::DIM);
                }
            }
        }
    }
}
