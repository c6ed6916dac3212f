//! Check command implementation.
//!
//! Decodes and assembles a notebook without running it.

use std::path::Path;

use nbimport_core::compile::{Compiler, Parameters, ProgramUnit};
use nbimport_core::decode::Document;

use crate::colors;

/// Read and compile the notebook at `path`.
pub fn compile_file(path: &Path) -> anyhow::Result<(Document, ProgramUnit)> {
    if !path.is_file() {
        anyhow::bail!("Notebook not found: {}", path.display());
    }
    let bytes = std::fs::read(path)?;
    let compiled = Compiler::new().compile(&bytes, &path.display().to_string())?;
    Ok(compiled)
}

/// Execute the check command.
pub fn execute(path: &Path) -> anyhow::Result<()> {
    let (document, unit) = compile_file(path)?;

    println!(
        "\n{}Checking{} {}",
        colors::BOLD,
        colors::RESET,
        path.display()
    );
    println!("{}", "─".repeat(50));

    let code = document.code_cells().count();
    println!(
        "  cells       {} ({} code, {} other)",
        document.cells().len(),
        code,
        document.cells().len() - code
    );
    println!("  fragments   {}", unit.fragments().len());

    if let Some(doc) = unit.doc() {
        let first = doc.lines().next().unwrap_or_default();
        println!("  doc         {first}");
    }

    let params = Parameters::extract(&unit);
    if !params.is_empty() {
        println!("  parameters");
        for param in params.iter() {
            let ty = param
                .ty
                .as_deref()
                .map(|ty| format!(": {ty}"))
                .unwrap_or_default();
            println!(
                "    {}{ty} = {} {}(line {}){}",
                param.name,
                param.default,
                colors::DIM,
                param.line,
                colors::RESET
            );
        }
    }

    for violation in document.execution_order_violations() {
        println!(
            "  {}warning{}     cell {} (line {}) ran as [{}] after [{}]",
            colors::YELLOW,
            colors::RESET,
            violation.cell_index,
            violation.line,
            violation.slot,
            violation.previous_slot
        );
    }

    println!("{}✓{} ok", colors::GREEN, colors::RESET);
    Ok(())
}
