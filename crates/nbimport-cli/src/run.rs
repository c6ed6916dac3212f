//! Run command implementation.
//!
//! Executes a notebook with rustc, cell by cell, capturing each cell's output.

use std::path::{Path, PathBuf};
use std::time::Instant;

use nbimport_core::execute::{
    CaptureOptions, CaptureRecord, Executor, FailurePolicy, RustcConfig, RustcKernel,
};
use serde_json::{Value, json};

use crate::check::compile_file;
use crate::colors;
use crate::output::print_record;

/// Flags of the run command.
pub struct RunOptions {
    pub keep_going: bool,
    pub params: Vec<String>,
    pub write: Option<PathBuf>,
    pub json: bool,
    pub release: bool,
    pub edition: String,
}

/// Split `NAME=EXPR` overrides.
fn parse_params(params: &[String]) -> anyhow::Result<Vec<(String, String)>> {
    params
        .iter()
        .map(|param| match param.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                Ok((name.trim().to_string(), value.to_string()))
            }
            _ => anyhow::bail!("Invalid parameter `{param}`: expected NAME=EXPR"),
        })
        .collect()
}

fn records_json(records: &[CaptureRecord]) -> Value {
    Value::Array(
        records
            .iter()
            .map(|record| {
                json!({
                    "cell_index": record.cell_index,
                    "line": record.line,
                    "execution_count": record.execution_count,
                    "outputs": record.to_nbformat(),
                })
            })
            .collect(),
    )
}

/// Execute the run command.
pub fn execute(path: &Path, options: &RunOptions) -> anyhow::Result<()> {
    let start = Instant::now();

    let (document, mut unit) = compile_file(path)?;
    let overrides = parse_params(&options.params)?;
    if !overrides.is_empty() {
        unit.parameterize(overrides)?;
    }

    let config = RustcConfig {
        edition: options.edition.clone(),
        opt_level: if options.release { 2 } else { 0 },
        ..RustcConfig::default()
    };
    let policy = if options.keep_going {
        FailurePolicy::ContinueAndRecord
    } else {
        FailurePolicy::StopOnError
    };

    let mut executor = Executor::new(RustcKernel::with_config(config)?)
        .policy(policy)
        .capture(CaptureOptions::all());

    let (records, stopped) = match executor.execute(&unit) {
        Ok(records) => (records, None),
        Err(failure) => (failure.records, Some(failure.error)),
    };

    if let Some(output) = &options.write {
        let executed = document.with_outputs(&records);
        std::fs::write(output, serde_json::to_string_pretty(&executed)? + "\n")?;
        tracing::info!("Wrote executed notebook to {}", output.display());
    }

    if options.json {
        println!("{}", serde_json::to_string_pretty(&records_json(&records))?);
    } else {
        println!(
            "\n{}Running{} {}",
            colors::BOLD,
            colors::RESET,
            path.display()
        );
        println!("{}", "─".repeat(50));

        for record in &records {
            print_record(record);
        }

        println!("\n{}", "─".repeat(50));
        let failed = records.iter().filter(|record| record.is_error()).count();
        let (color, label) = if failed == 0 {
            (colors::GREEN, "Completed")
        } else {
            (colors::RED, "Failed")
        };
        println!(
            "{color}{label}{} {} cells ({} failed) in {:.2}s",
            colors::RESET,
            records.len(),
            failed,
            start.elapsed().as_secs_f64()
        );
    }

    if let Some(error) = stopped {
        anyhow::bail!("{error}");
    }
    let failed = records.iter().filter(|record| record.is_error()).count();
    if failed > 0 {
        anyhow::bail!("{failed} cell(s) failed");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_params() {
        let parsed = parse_params(&["rate=0.5".to_string(), " n =2+2".to_string()]).unwrap();
        assert_eq!(
            parsed,
            vec![
                ("rate".to_string(), "0.5".to_string()),
                ("n".to_string(), "2+2".to_string())
            ]
        );

        assert!(parse_params(&["novalue".to_string()]).is_err());
        assert!(parse_params(&["=1".to_string()]).is_err());
    }
}
