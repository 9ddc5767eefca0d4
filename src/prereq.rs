//! Prerequisite Cache: at most one precompute task per visit.
//!
//! The cache is the single owner of precompute handles; chunk tasks only
//! borrow clones as dependency inputs. A visit whose artifact already
//! exists on disk memoizes an empty dependency list, so repeated and
//! restarted runs never resubmit finished precompute work.

use crate::catalog::OutputProbe;
use crate::command::CommandBuilder;
use crate::config::SchedulerConfig;
use crate::engine::{ExecutionEngine, ResourceSpec, TaskHandle, TaskSpec, Work};
use crate::error::SchedulerError;
use crate::types::VisitId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub struct PrerequisiteCache {
    engine: Arc<dyn ExecutionEngine>,
    probe: Arc<dyn OutputProbe>,
    commands: CommandBuilder,
    memory_mb: u64,
    cache: HashMap<VisitId, Vec<TaskHandle>>,
}

impl PrerequisiteCache {
    pub fn new(
        config: &SchedulerConfig,
        engine: Arc<dyn ExecutionEngine>,
        probe: Arc<dyn OutputProbe>,
        commands: CommandBuilder,
    ) -> Self {
        Self {
            engine,
            probe,
            commands,
            memory_mb: config.gb_per_psf * 1024,
            cache: HashMap::new(),
        }
    }

    /// The dependency list for a visit: empty if the precompute artifact is
    /// already on disk, otherwise exactly one task handle, submitted on
    /// first reference and shared by every later caller.
    pub fn resolve(&mut self, visit: VisitId) -> Result<&[TaskHandle], SchedulerError> {
        if !self.cache.contains_key(&visit) {
            let handles = if let Some(artifact) = self.probe.precompute_artifact(visit) {
                debug!(visit, artifact = %artifact.display(), "precompute artifact present, no prerequisite needed");
                Vec::new()
            } else {
                let name = CommandBuilder::precompute_name(visit);
                info!(visit, task = %name, "submitting precompute task");
                let handle = self.engine.submit(TaskSpec {
                    name: name.clone(),
                    work: Work::Command {
                        command: self.commands.precompute(visit),
                        log_path: Some(self.commands.log_path(&name)),
                    },
                    inputs: Vec::new(),
                    resources: ResourceSpec::megabytes(self.memory_mb),
                })?;
                vec![handle]
            };
            self.cache.insert(visit, handles);
        }
        Ok(self
            .cache
            .get(&visit)
            .map(Vec::as_slice)
            .unwrap_or(&[]))
    }

    /// Handles of every precompute task submitted so far.
    pub fn submitted(&self) -> impl Iterator<Item = &TaskHandle> {
        self.cache.values().flatten()
    }
}
