//! The seam between the executor and whatever actually runs cell code.

use syn::Stmt;

use crate::error::CellFailure;

/// One unit of execution handed to a kernel.
#[derive(Debug, Clone, Copy)]
pub struct CellUnit<'a> {
    /// Document index of the cell (the first code cell when the whole unit
    /// runs as one).
    pub index: usize,
    /// Document line of the cell.
    pub line: usize,
    pub statements: &'a [Stmt],
    /// Origin of the program unit, for diagnostics.
    pub origin: &'a str,
}

/// Runs cells.
///
/// Kernels write through [`capture`](super::capture) so that the executor
/// can attribute output to the running cell. Returning an error stops the
/// cell; what happens next is up to the executor's policy.
pub trait Kernel {
    /// Short name used in logs.
    fn name(&self) -> &str;

    fn run_cell(&mut self, cell: &CellUnit<'_>) -> Result<(), CellFailure>;
}

impl<K: Kernel + ?Sized> Kernel for Box<K> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn run_cell(&mut self, cell: &CellUnit<'_>) -> Result<(), CellFailure> {
        (**self).run_cell(cell)
    }
}

/// A kernel backed by a closure, for hosts that evaluate cells themselves.
pub struct FnKernel<F> {
    name: String,
    f: F,
}

impl<F> FnKernel<F>
where
    F: FnMut(&CellUnit<'_>) -> Result<(), CellFailure>,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Kernel for FnKernel<F>
where
    F: FnMut(&CellUnit<'_>) -> Result<(), CellFailure>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run_cell(&mut self, cell: &CellUnit<'_>) -> Result<(), CellFailure> {
        (self.f)(cell)
    }
}

/// A kernel that accepts every cell without running anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullKernel;

impl Kernel for NullKernel {
    fn name(&self) -> &str {
        "null"
    }

    fn run_cell(&mut self, _cell: &CellUnit<'_>) -> Result<(), CellFailure> {
        Ok(())
    }
}
