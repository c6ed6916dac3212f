//! Sequential, policy-driven execution of a program unit.
//!
//! Every code fragment runs inside its own [`CaptureScope`], so output is
//! attributed to the cell that produced it even when executions nest.

use std::panic::{AssertUnwindSafe, catch_unwind};

use serde::{Deserialize, Serialize};
use syn::Stmt;
use thiserror::Error;

use super::capture::{CaptureOptions, CaptureScope};
use super::kernel::{CellUnit, Kernel};
use super::record::{CaptureRecord, Output};
use crate::compile::ProgramUnit;
use crate::error::{CellFailure, ExecutionError};

/// What to do when a cell fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the first failing cell and report it.
    #[default]
    StopOnError,
    /// Record the failure as the cell's last output and keep going.
    ContinueAndRecord,
}

/// Executor progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    NotStarted,
    /// Running the cell with this document index.
    Running(usize),
    Completed,
    /// Stopped at the cell with this document index.
    Failed(usize),
}

/// A stop-on-error run that hit a failing cell.
///
/// `records` holds every cell that ran, the failing one last.
#[derive(Debug, Clone, Error)]
#[error("{error}")]
pub struct ExecutionFailure {
    pub error: ExecutionError,
    pub records: Vec<CaptureRecord>,
}

/// Outcome of executing a module body.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub records: Vec<CaptureRecord>,
    /// The error that stopped execution, when it was kept rather than raised.
    pub error: Option<ExecutionError>,
}

impl ExecutionReport {
    /// Failures recorded in cell outputs.
    pub fn failures(&self) -> impl Iterator<Item = &CellFailure> {
        self.records.iter().filter_map(CaptureRecord::error)
    }

    /// Standard output of all cells, concatenated.
    pub fn stdout(&self) -> String {
        self.records.iter().map(CaptureRecord::stdout).collect()
    }

    pub fn stderr(&self) -> String {
        self.records.iter().map(CaptureRecord::stderr).collect()
    }
}

/// Callback trait for execution progress reporting.
pub trait ExecutionCallback {
    /// Called when a cell starts executing.
    fn on_cell_started(&self, _cell_index: usize, _line: usize) {}

    /// Called when a cell completes successfully.
    fn on_cell_completed(&self, _record: &CaptureRecord) {}

    /// Called when a cell fails.
    fn on_cell_error(&self, _error: &ExecutionError) {}
}

/// Runs the code fragments of a [`ProgramUnit`] through a [`Kernel`].
pub struct Executor<K> {
    kernel: K,
    policy: FailurePolicy,
    options: CaptureOptions,
    state: ExecutionState,
    execution_count: u64,
    callback: Option<Box<dyn ExecutionCallback>>,
}

impl<K: Kernel> Executor<K> {
    pub fn new(kernel: K) -> Self {
        Self {
            kernel,
            policy: FailurePolicy::default(),
            options: CaptureOptions::all(),
            state: ExecutionState::NotStarted,
            execution_count: 0,
            callback: None,
        }
    }

    pub fn policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Choose which channels are captured per cell.
    pub fn capture(mut self, options: CaptureOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the execution callback for progress reporting.
    pub fn set_callback(&mut self, callback: impl ExecutionCallback + 'static) {
        self.callback = Some(Box::new(callback));
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn kernel_mut(&mut self) -> &mut K {
        &mut self.kernel
    }

    pub fn into_kernel(self) -> K {
        self.kernel
    }

    /// Run every code fragment in order, one record per fragment.
    pub fn execute(&mut self, unit: &ProgramUnit) -> Result<Vec<CaptureRecord>, ExecutionFailure> {
        self.state = ExecutionState::NotStarted;
        self.execution_count = 0;

        tracing::debug!(
            "Executing {} with kernel `{}` ({:?})",
            unit.origin(),
            self.kernel.name(),
            self.policy
        );

        let mut records = Vec::new();

        for fragment in unit.code_fragments() {
            let cell = CellUnit {
                index: fragment.cell_index(),
                line: fragment.line(),
                statements: fragment.statements(),
                origin: unit.origin(),
            };

            let (record, error) = self.run_one(&cell);
            records.push(record);

            if let Some(error) = error
                && self.policy == FailurePolicy::StopOnError
            {
                self.state = ExecutionState::Failed(error.cell_index);
                return Err(ExecutionFailure { error, records });
            }
        }

        self.state = ExecutionState::Completed;
        Ok(records)
    }

    /// Run all code statements as a single cell with a single record.
    pub fn execute_as_unit(&mut self, unit: &ProgramUnit) -> Result<CaptureRecord, ExecutionFailure> {
        self.state = ExecutionState::NotStarted;
        self.execution_count = 0;

        let statements: Vec<Stmt> = unit
            .code_fragments()
            .flat_map(|fragment| fragment.statements().iter().cloned())
            .collect();
        let (index, line) = unit
            .code_fragments()
            .next()
            .map_or((0, 1), |fragment| (fragment.cell_index(), fragment.line()));

        let cell = CellUnit {
            index,
            line,
            statements: &statements,
            origin: unit.origin(),
        };

        let (record, error) = self.run_one(&cell);
        match error {
            Some(error) if self.policy == FailurePolicy::StopOnError => {
                self.state = ExecutionState::Failed(index);
                Err(ExecutionFailure {
                    error,
                    records: vec![record],
                })
            }
            _ => {
                self.state = ExecutionState::Completed;
                Ok(record)
            }
        }
    }

    fn run_one(&mut self, cell: &CellUnit<'_>) -> (CaptureRecord, Option<ExecutionError>) {
        self.state = ExecutionState::Running(cell.index);
        self.execution_count += 1;

        if let Some(callback) = &self.callback {
            callback.on_cell_started(cell.index, cell.line);
        }

        let scope = CaptureScope::enter(self.options);
        let kernel = &mut self.kernel;
        let result = catch_unwind(AssertUnwindSafe(|| kernel.run_cell(cell)))
            .unwrap_or_else(|payload| Err(CellFailure::new("panic", panic_message(&*payload))));

        let mut record = CaptureRecord::new(cell.index, cell.line, self.execution_count);
        record.outputs = scope.finish();

        match result {
            Ok(()) => {
                if let Some(callback) = &self.callback {
                    callback.on_cell_completed(&record);
                }
                (record, None)
            }
            Err(failure) => {
                record.outputs.push(Output::Error(failure.clone()));
                let error = ExecutionError {
                    cell_index: cell.index,
                    line: cell.line,
                    failure,
                };
                tracing::debug!("{}", error);
                if let Some(callback) = &self.callback {
                    callback.on_cell_error(&error);
                }
                (record, Some(error))
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
