//! Recording engine: accepts every submission, runs nothing.
//!
//! Used by the CLI `--dry-run` mode to show what a run would submit, and by
//! tests to assert on generated commands and dependency wiring. Handles
//! complete immediately as succeeded; actions are dropped unexecuted.

use crate::engine::{ExecutionEngine, ResourceSpec, TaskHandle, TaskSpec, Work};
use crate::error::EngineError;
use parking_lot::Mutex;
use std::path::PathBuf;

/// Record of one submission.
#[derive(Debug, Clone)]
pub struct SubmittedTask {
    pub name: String,
    /// Command text for `Work::Command` submissions, `None` for actions.
    pub command: Option<String>,
    pub log_path: Option<PathBuf>,
    pub input_names: Vec<String>,
    pub resources: ResourceSpec,
}

#[derive(Default)]
pub struct DryRunEngine {
    submitted: Mutex<Vec<SubmittedTask>>,
}

impl DryRunEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything submitted so far, in submission order.
    pub fn submitted(&self) -> Vec<SubmittedTask> {
        self.submitted.lock().clone()
    }
}

impl ExecutionEngine for DryRunEngine {
    fn submit(&self, spec: TaskSpec) -> Result<TaskHandle, EngineError> {
        let (command, log_path) = match &spec.work {
            Work::Command { command, log_path } => (Some(command.clone()), log_path.clone()),
            Work::Action(_) => (None, None),
        };
        self.submitted.lock().push(SubmittedTask {
            name: spec.name.clone(),
            command,
            log_path,
            input_names: spec.inputs.iter().map(|h| h.name().to_string()).collect(),
            resources: spec.resources,
        });
        Ok(TaskHandle::completed(spec.name))
    }
}
