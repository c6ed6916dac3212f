//! nbimport CLI - check, export and run Rust notebooks.

mod check;
mod colors;
mod export;
mod output;
mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "nbimport")]
#[command(about = "Check, export and run Jupyter notebooks written in Rust")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode and assemble a notebook, reporting its cells and parameters
    Check {
        /// Path to the notebook (.ipynb file)
        notebook: PathBuf,
    },

    /// Print the notebook as a Rust program whose lines match the notebook's
    Export {
        /// Path to the notebook (.ipynb file)
        notebook: PathBuf,

        /// Write the program here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Execute a notebook with rustc and print each cell's output
    Run {
        /// Path to the notebook (.ipynb file)
        notebook: PathBuf,

        /// Record failing cells and keep going
        #[arg(long)]
        keep_going: bool,

        /// Override a parameter (NAME=EXPR), may be repeated
        #[arg(short, long = "param", value_name = "NAME=EXPR")]
        params: Vec<String>,

        /// Write the executed notebook (with outputs) to this path
        #[arg(short, long)]
        write: Option<PathBuf>,

        /// Print the cell outputs as nbformat JSON
        #[arg(long)]
        json: bool,

        /// Compile cells with optimizations
        #[arg(long)]
        release: bool,

        /// Rust edition for the cells
        #[arg(long, default_value = "2021")]
        edition: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Format nbimport-core errors with recovery hints
    let format_error = |err: anyhow::Error| -> anyhow::Error {
        if let Some(core_err) = err.downcast_ref::<nbimport_core::Error>() {
            anyhow::anyhow!("{}", core_err.with_hint())
        } else {
            err
        }
    };

    match cli.command {
        Commands::Check { notebook } => check::execute(&notebook).map_err(format_error)?,

        Commands::Export { notebook, output } => {
            export::execute(&notebook, output.as_deref()).map_err(format_error)?;
        }

        Commands::Run {
            notebook,
            keep_going,
            params,
            write,
            json,
            release,
            edition,
        } => {
            let options = run::RunOptions {
                keep_going,
                params,
                write,
                json,
                release,
                edition,
            };
            run::execute(&notebook, &options).map_err(format_error)?;
        }
    }

    Ok(())
}
