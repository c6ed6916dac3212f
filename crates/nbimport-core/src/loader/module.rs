//! Loaded notebook modules.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::finder::ModuleSpec;
use super::handler::ModuleLoader;
use crate::compile::ProgramUnit;
use crate::decode::Document;
use crate::error::{ExecutionError, ImportError};
use crate::execute::ExecutionReport;

/// Where a module is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    /// Created but not run.
    Unexecuted,
    /// Execution waits for the first [`Module::report`] call.
    Deferred,
    Executed,
}

/// A compiled notebook and, once run, its execution report.
pub struct Module {
    spec: ModuleSpec,
    document: Document,
    unit: ProgramUnit,
    state: ModuleState,
    deferred: Option<Arc<dyn ModuleLoader>>,
    report: Option<ExecutionReport>,
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.spec.name())
            .field("origin", &self.spec.origin())
            .field("state", &self.state)
            .field("cells", &self.document.cells().len())
            .field("exception", &self.exception())
            .finish()
    }
}

impl Module {
    pub fn new(spec: ModuleSpec, document: Document, unit: ProgramUnit) -> Self {
        Self {
            spec,
            document,
            unit,
            state: ModuleState::Unexecuted,
            deferred: None,
            report: None,
        }
    }

    pub fn name(&self) -> &str {
        self.spec.name()
    }

    pub fn spec(&self) -> &ModuleSpec {
        &self.spec
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn unit(&self) -> &ProgramUnit {
        &self.unit
    }

    /// Module documentation taken from a leading prose cell.
    pub fn doc(&self) -> Option<&str> {
        self.unit.doc()
    }

    pub fn state(&self) -> ModuleState {
        self.state
    }

    /// The execution error kept by a partial import.
    pub fn exception(&self) -> Option<&ExecutionError> {
        self.report.as_ref().and_then(|report| report.error.as_ref())
    }

    /// The execution report, running a deferred module first.
    ///
    /// Returns `None` while the module has not been executed.
    pub fn report(&mut self) -> Result<Option<&ExecutionReport>, ImportError> {
        if let Some(loader) = self.deferred.take() {
            tracing::debug!("Running deferred module {}", self.name());
            self.state = ModuleState::Unexecuted;
            loader.exec_module(self)?;
        }
        Ok(self.report.as_ref())
    }

    /// The notebook JSON with this module's outputs filled in.
    pub fn executed_document(&mut self) -> Result<Option<Value>, ImportError> {
        self.report()?;
        Ok(self
            .report
            .as_ref()
            .map(|report| self.document.with_outputs(&report.records)))
    }

    pub(crate) fn defer(&mut self, loader: Arc<dyn ModuleLoader>) {
        self.deferred = Some(loader);
        self.state = ModuleState::Deferred;
    }

    pub(crate) fn set_report(&mut self, report: ExecutionReport) {
        self.report = Some(report);
        self.state = ModuleState::Executed;
    }
}
