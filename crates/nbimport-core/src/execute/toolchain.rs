//! Rust toolchain discovery for the rustc kernel.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Error, Result};

/// A located `rustc` and its version.
#[derive(Debug, Clone)]
pub struct Toolchain {
    rustc_path: PathBuf,
    version: String,
}

impl Toolchain {
    /// Find `rustc` on `PATH`.
    pub fn detect() -> Result<Self> {
        let rustc_path = Self::find_rustc()?;
        Self::at(rustc_path)
    }

    /// Use a specific `rustc` binary.
    pub fn at(rustc_path: impl Into<PathBuf>) -> Result<Self> {
        let rustc_path = rustc_path.into();
        let version = Self::get_rustc_version(&rustc_path)?;
        tracing::debug!("Using {} ({})", rustc_path.display(), version);
        Ok(Self {
            rustc_path,
            version,
        })
    }

    /// Whether a usable `rustc` is on `PATH`.
    pub fn is_available() -> bool {
        Self::find_rustc().is_ok()
    }

    /// Get the rustc path.
    pub fn rustc_path(&self) -> &Path {
        &self.rustc_path
    }

    /// Get the toolchain version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// A `rustc` command ready for arguments.
    pub fn rustc(&self) -> Command {
        Command::new(&self.rustc_path)
    }

    fn find_rustc() -> Result<PathBuf> {
        which::which("rustc").map_err(|_| Error::Toolchain("rustc not found in PATH".to_string()))
    }

    fn get_rustc_version(rustc: &Path) -> Result<String> {
        let output = Command::new(rustc)
            .arg("--version")
            .output()
            .map_err(|e| Error::Toolchain(format!("Failed to run {}: {}", rustc.display(), e)))?;

        if !output.status.success() {
            return Err(Error::Toolchain(format!(
                "{} --version exited with {}",
                rustc.display(),
                output.status
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
