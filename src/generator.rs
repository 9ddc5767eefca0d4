//! Job generation: emits one chunk task per call, wires per-visit
//! precompute dependencies, and schedules deferred artifact cleanup.
//!
//! Generation is single-threaded and synchronous; parallelism lives
//! entirely inside the execution engine. For a fixed configuration and
//! on-disk discovery state, the submitted command sequence depends only on
//! call count.

use crate::catalog::OutputProbe;
use crate::command::CommandBuilder;
use crate::config::SchedulerConfig;
use crate::engine::{ExecutionEngine, ResourceSpec, TaskHandle, TaskSpec, TaskStatus, Work};
use crate::error::SchedulerError;
use crate::plan::{ChunkSpec, Cursor, Step, WorkPlan};
use crate::prereq::PrerequisiteCache;
use crate::types::VisitId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Counts of work submitted by one [`JobGenerator::run`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub render_jobs: usize,
    pub precompute_jobs: usize,
    pub cleanup_jobs: usize,
}

pub struct JobGenerator {
    config: SchedulerConfig,
    engine: Arc<dyn ExecutionEngine>,
    probe: Arc<dyn OutputProbe>,
    commands: CommandBuilder,
    plan: WorkPlan,
    cursor: Cursor,
    prereqs: PrerequisiteCache,
    chunk_tasks: HashMap<VisitId, Vec<TaskHandle>>,
    cleanup_tasks: Vec<TaskHandle>,
}

impl JobGenerator {
    /// Validate the configuration and assemble the work plan. No task is
    /// submitted until [`JobGenerator::next_job`] is first called.
    pub fn new(
        config: SchedulerConfig,
        engine: Arc<dyn ExecutionEngine>,
        probe: Arc<dyn OutputProbe>,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;
        let plan = WorkPlan::assemble(&config, probe.as_ref())?;
        info!(
            visits = config.visits.len(),
            total_jobs = plan.total_jobs(),
            "assembled work plan"
        );
        let commands = CommandBuilder::new(&config);
        let prereqs = PrerequisiteCache::new(
            &config,
            Arc::clone(&engine),
            Arc::clone(&probe),
            commands.clone(),
        );
        Ok(Self {
            config,
            engine,
            probe,
            commands,
            plan,
            cursor: Cursor::new(),
            prereqs,
            chunk_tasks: HashMap::new(),
            cleanup_tasks: Vec::new(),
        })
    }

    pub fn plan(&self) -> &WorkPlan {
        &self.plan
    }

    /// Total planned chunk count, fixed before any submission.
    pub fn total_jobs(&self) -> usize {
        self.plan.total_jobs()
    }

    /// Chunk tasks launched so far.
    pub fn launched_jobs(&self) -> usize {
        self.cursor.launched
    }

    pub fn cleanup_tasks(&self) -> &[TaskHandle] {
        &self.cleanup_tasks
    }

    pub fn chunk_tasks(&self, visit: VisitId) -> &[TaskHandle] {
        self.chunk_tasks
            .get(&visit)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Submit the next chunk task and return its handle, or `None` once
    /// every visit is exhausted. Passing a visit boundary schedules that
    /// visit's cleanup before the next visit's first chunk is considered.
    pub fn next_job(&mut self) -> Result<Option<TaskHandle>, SchedulerError> {
        loop {
            let step = self.cursor.step(&self.plan);
            match &step {
                Step::Done => return Ok(None),
                Step::FinishVisit(visit) => {
                    self.schedule_cleanup(*visit)?;
                    self.cursor.apply(&self.plan, &step);
                }
                Step::Emit(chunk) => {
                    let handle = self.submit_chunk(chunk)?;
                    self.cursor.apply(&self.plan, &step);
                    debug_assert!(self.cursor.launched <= self.plan.total_jobs());
                    return Ok(Some(handle));
                }
            }
        }
    }

    fn submit_chunk(&mut self, chunk: &ChunkSpec) -> Result<TaskHandle, SchedulerError> {
        // The prerequisite decision for the visit is fixed before any of
        // its chunks is submitted.
        let inputs = self.prereqs.resolve(chunk.visit)?.to_vec();
        let name = CommandBuilder::chunk_name(chunk);
        let memory_mb = self.config.gb_per_ccd * 1024 * self.config.nproc as u64;
        info!(
            task = %name,
            detectors = chunk.len(),
            memory_mb,
            "submitting render job"
        );
        let handle = self.engine.submit(TaskSpec {
            name: name.clone(),
            work: Work::Command {
                command: self.commands.render(chunk),
                log_path: Some(self.commands.log_path(&name)),
            },
            inputs,
            resources: ResourceSpec::megabytes(memory_mb),
        })?;
        self.chunk_tasks
            .entry(chunk.visit)
            .or_default()
            .push(handle.clone());
        Ok(handle)
    }

    fn schedule_cleanup(&mut self, visit: VisitId) -> Result<(), SchedulerError> {
        if !self.config.clean_up_psfs {
            return Ok(());
        }
        let inputs = self.chunk_tasks.get(&visit).cloned().unwrap_or_default();
        let name = CommandBuilder::cleanup_name(visit);
        info!(task = %name, dependencies = inputs.len(), "scheduling precompute artifact cleanup");
        let probe = Arc::clone(&self.probe);
        let handle = self.engine.submit(TaskSpec {
            name,
            work: Work::Action(Box::new(move || {
                remove_precompute_artifact(probe.as_ref(), visit)
            })),
            inputs,
            resources: ResourceSpec::megabytes(1),
        })?;
        self.cleanup_tasks.push(handle);
        Ok(())
    }

    /// Submit every planned job, then optionally block until completion.
    ///
    /// Submission never stops early on task failures; when blocking, the
    /// wait targets the cleanup tasks if any exist (their dependency chains
    /// already force the chunk tasks to finish first), otherwise the chunk
    /// tasks, and the first observed failure is returned.
    pub fn run(&mut self, block: bool) -> Result<RunSummary, SchedulerError> {
        info!(total_jobs = self.plan.total_jobs(), "generating render jobs");
        let mut chunk_handles = Vec::new();
        for _ in 0..=self.plan.total_jobs() {
            match self.next_job()? {
                Some(handle) => chunk_handles.push(handle),
                None => break,
            }
        }
        let summary = RunSummary {
            render_jobs: chunk_handles.len(),
            precompute_jobs: self.prereqs.submitted().count(),
            cleanup_jobs: self.cleanup_tasks.len(),
        };

        if block {
            if self.cleanup_tasks.is_empty() {
                info!(jobs = chunk_handles.len(), "waiting for render jobs");
                for handle in &chunk_handles {
                    handle.wait()?;
                }
            } else {
                info!(tasks = self.cleanup_tasks.len(), "waiting for clean-up tasks");
                for handle in &self.cleanup_tasks {
                    handle.wait()?;
                }
            }
        }
        Ok(summary)
    }

    /// Submit precompute tasks for the given visits without rendering
    /// anything. Visits whose artifact already exists are skipped.
    pub fn precompute_only(
        &mut self,
        visits: &[VisitId],
        block: bool,
    ) -> Result<Vec<TaskHandle>, SchedulerError> {
        let mut handles = Vec::new();
        for &visit in visits {
            handles.extend(self.prereqs.resolve(visit)?.iter().cloned());
        }
        if block {
            for handle in &handles {
                handle.wait()?;
            }
        }
        Ok(handles)
    }

    /// Name and status of every task submitted by this generator, in
    /// precompute, chunk, cleanup order.
    pub fn task_statuses(&self) -> Vec<(String, TaskStatus)> {
        let mut statuses: Vec<(String, TaskStatus)> = self
            .prereqs
            .submitted()
            .map(|h| (h.name().to_string(), h.status()))
            .collect();
        for visit in self.plan.visits() {
            for handle in self.chunk_tasks(*visit) {
                statuses.push((handle.name().to_string(), handle.status()));
            }
        }
        for handle in &self.cleanup_tasks {
            statuses.push((handle.name().to_string(), handle.status()));
        }
        statuses
    }
}

/// Delete a visit's precompute artifact. Best-effort housekeeping: a
/// missing artifact or a failed delete is reported but never fails the
/// cleanup task, so unrelated visits are unaffected.
pub(crate) fn remove_precompute_artifact(
    probe: &dyn OutputProbe,
    visit: VisitId,
) -> Result<(), String> {
    match probe.precompute_artifact(visit) {
        Some(artifact) => {
            info!(visit, artifact = %artifact.display(), "deleting precompute artifact");
            if let Err(e) = std::fs::remove_file(&artifact) {
                error!(
                    visit,
                    artifact = %artifact.display(),
                    error = %e,
                    "failed to delete precompute artifact"
                );
            }
        }
        None => {
            warn!(visit, "no precompute artifact found to clean up");
        }
    }
    Ok(())
}
