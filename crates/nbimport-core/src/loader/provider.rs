//! Where module bytes come from.

use std::io;

use super::finder::ModuleSpec;

/// Reads the bytes of a located module.
pub trait SourceProvider {
    fn read(&self, spec: &ModuleSpec) -> io::Result<Vec<u8>>;

    /// The origin reported in diagnostics and errors.
    fn location(&self, spec: &ModuleSpec) -> String {
        spec.origin().display().to_string()
    }
}

/// Reads modules from the filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsProvider;

impl SourceProvider for FsProvider {
    fn read(&self, spec: &ModuleSpec) -> io::Result<Vec<u8>> {
        std::fs::read(spec.origin())
    }
}
