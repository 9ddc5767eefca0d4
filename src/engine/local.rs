//! Local execution engine: runs submitted commands on the host.
//!
//! Concurrency is capped by a worker-slot semaphore and a memory-budget
//! semaphore sized from `EngineConfig`; a task holds `memory_mb` permits of
//! budget for as long as it runs. Dependency edges are honored by awaiting
//! every input handle before the task starts; a failed input fails the task
//! without running it.

use crate::config::EngineConfig;
use crate::engine::{ExecutionEngine, TaskHandle, TaskSpec, TaskStatus, Work};
use crate::error::EngineError;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

pub struct LocalEngine {
    runtime: tokio::runtime::Runtime,
    slots: Arc<Semaphore>,
    memory: Arc<Semaphore>,
    memory_cap_mb: u64,
    shell: String,
}

impl LocalEngine {
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        if config.max_workers == 0 {
            return Err(EngineError::SubmitRejected(
                "engine requires at least one worker".to_string(),
            ));
        }
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("skybatch-engine")
            .build()?;
        let memory_cap_mb = config.memory_cap_mb.min(u32::MAX as u64);
        Ok(Self {
            runtime,
            slots: Arc::new(Semaphore::new(config.max_workers)),
            memory: Arc::new(Semaphore::new(memory_cap_mb as usize)),
            memory_cap_mb,
            shell: config.shell.clone(),
        })
    }
}

impl ExecutionEngine for LocalEngine {
    fn submit(&self, spec: TaskSpec) -> Result<TaskHandle, EngineError> {
        if spec.name.trim().is_empty() {
            return Err(EngineError::SubmitRejected(
                "task name cannot be empty".to_string(),
            ));
        }
        if let Work::Command { command, .. } = &spec.work {
            if command.trim().is_empty() {
                return Err(EngineError::SubmitRejected(format!(
                    "task {} has an empty command",
                    spec.name
                )));
            }
        }

        // A reservation above the whole budget would never be satisfiable;
        // clamp it so the task can still run alone.
        let mut memory_mb = spec.resources.memory_mb;
        if memory_mb > self.memory_cap_mb {
            warn!(
                task = %spec.name,
                requested_mb = memory_mb,
                cap_mb = self.memory_cap_mb,
                "memory reservation exceeds engine budget, clamping"
            );
            memory_mb = self.memory_cap_mb;
        }

        let handle = TaskHandle::new_pending(&spec.name);
        debug!(task = %spec.name, inputs = spec.inputs.len(), memory_mb, "submitting task");

        let task = handle.clone();
        let slots = Arc::clone(&self.slots);
        let memory = Arc::clone(&self.memory);
        let shell = self.shell.clone();
        let TaskSpec { work, inputs, .. } = spec;
        self.runtime.spawn(async move {
            run_task(task, work, inputs, memory_mb as u32, slots, memory, shell).await;
        });

        Ok(handle)
    }
}

async fn run_task(
    handle: TaskHandle,
    work: Work,
    inputs: Vec<TaskHandle>,
    memory_mb: u32,
    slots: Arc<Semaphore>,
    memory: Arc<Semaphore>,
    shell: String,
) {
    for input in &inputs {
        if input.wait_async().await == TaskStatus::Failed {
            warn!(
                task = %handle.name(),
                dependency = %input.name(),
                "dependency failed, task will not run"
            );
            handle.finish(Err(format!("dependency {} failed", input.name())));
            return;
        }
    }

    let _slot = match slots.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            handle.finish(Err("engine shut down".to_string()));
            return;
        }
    };
    let _memory = match memory.acquire_many_owned(memory_mb).await {
        Ok(permit) => permit,
        Err(_) => {
            handle.finish(Err("engine shut down".to_string()));
            return;
        }
    };

    handle.mark_running();
    let result = match work {
        Work::Command { command, log_path } => {
            run_command(&shell, &command, log_path.as_deref()).await
        }
        Work::Action(action) => tokio::task::spawn_blocking(action)
            .await
            .unwrap_or_else(|e| Err(format!("action panicked: {}", e))),
    };
    debug!(task = %handle.name(), ok = result.is_ok(), "task finished");
    handle.finish(result);
}

async fn run_command(shell: &str, command: &str, log_path: Option<&Path>) -> Result<(), String> {
    let mut cmd = tokio::process::Command::new(shell);
    cmd.arg("-c").arg(command).stdin(Stdio::null());

    if let Some(path) = log_path {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("failed to create log directory {:?}: {}", parent, e))?;
        }
        // Both output streams append to one per-job log file.
        let log = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| format!("failed to open log file {:?}: {}", path, e))?;
        let err_log = log
            .try_clone()
            .map_err(|e| format!("failed to clone log handle: {}", e))?;
        cmd.stdout(Stdio::from(log)).stderr(Stdio::from(err_log));
    } else {
        cmd.stdout(Stdio::null()).stderr(Stdio::null());
    }

    let status = cmd
        .status()
        .await
        .map_err(|e| format!("failed to spawn command: {}", e))?;
    if status.success() {
        Ok(())
    } else {
        match status.code() {
            Some(code) => Err(format!("exit status {}", code)),
            None => Err("terminated by signal".to_string()),
        }
    }
}
