//! Export command implementation.
//!
//! Prints the notebook as one Rust program whose line N is notebook line N.

use std::path::Path;

use nbimport_core::compile::export_program;

use crate::check::compile_file;
use crate::colors;

/// Execute the export command.
pub fn execute(path: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    let (_, unit) = compile_file(path)?;
    let program = export_program(&unit);

    match output {
        Some(output) => {
            std::fs::write(output, &program)?;
            eprintln!(
                "{}✓{} Exported {} → {}",
                colors::GREEN,
                colors::RESET,
                path.display(),
                output.display()
            );
        }
        None => print!("{program}"),
    }

    Ok(())
}
