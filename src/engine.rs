//! Execution Engine Interface
//!
//! The seam between the scheduling core and whatever actually runs tasks.
//! The core only submits `TaskSpec`s and later observes `TaskHandle`s; task
//! ordering across dependency edges is the engine's responsibility.

use crate::error::EngineError;
use parking_lot::{Condvar, Mutex};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

pub mod dry_run;
pub mod local;

pub use dry_run::DryRunEngine;
pub use local::LocalEngine;

/// Declared resource reservation for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceSpec {
    pub memory_mb: u64,
    pub cores: u32,
    pub disk_mb: u64,
}

impl ResourceSpec {
    /// The common reservation shape: a memory amount on one core with no
    /// scratch disk.
    pub fn megabytes(memory_mb: u64) -> Self {
        Self {
            memory_mb,
            cores: 1,
            disk_mb: 0,
        }
    }
}

/// Deferred side effect run by the engine once a task's dependencies have
/// completed.
pub type ActionFn = Box<dyn FnOnce() -> Result<(), String> + Send + 'static>;

/// What a task does when it runs.
pub enum Work {
    /// A shell command; stderr and stdout are both appended to `log_path`.
    Command {
        command: String,
        log_path: Option<PathBuf>,
    },
    /// An in-process action (used for artifact cleanup).
    Action(ActionFn),
}

impl std::fmt::Debug for Work {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Work::Command { command, log_path } => f
                .debug_struct("Command")
                .field("command", command)
                .field("log_path", log_path)
                .finish(),
            Work::Action(_) => f.write_str("Action"),
        }
    }
}

/// One unit of work submitted to an engine.
#[derive(Debug)]
pub struct TaskSpec {
    pub name: String,
    pub work: Work,
    /// Tasks that must complete before this one starts.
    pub inputs: Vec<TaskHandle>,
    pub resources: ResourceSpec,
}

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }
}

struct TaskInner {
    name: String,
    status: Mutex<TaskStatus>,
    failure: Mutex<Option<String>>,
    done: Condvar,
    wake: watch::Sender<()>,
}

/// Cheap-to-clone reference to a submitted task. Every clone observes the
/// same completion state.
#[derive(Clone)]
pub struct TaskHandle {
    inner: Arc<TaskInner>,
}

/// Handle equality is identity: two handles are equal when they observe
/// the same underlying task.
impl PartialEq for TaskHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for TaskHandle {}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("name", &self.inner.name)
            .field("status", &self.status())
            .finish()
    }
}

impl TaskHandle {
    pub(crate) fn new_pending(name: impl Into<String>) -> Self {
        let (wake, _) = watch::channel(());
        Self {
            inner: Arc::new(TaskInner {
                name: name.into(),
                status: Mutex::new(TaskStatus::Pending),
                failure: Mutex::new(None),
                done: Condvar::new(),
                wake,
            }),
        }
    }

    /// A handle that is already finished (dry-run submissions).
    pub(crate) fn completed(name: impl Into<String>) -> Self {
        let handle = Self::new_pending(name);
        handle.finish(Ok(()));
        handle
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn status(&self) -> TaskStatus {
        *self.inner.status.lock()
    }

    /// Failure message of a `Failed` task.
    pub fn failure(&self) -> Option<String> {
        self.inner.failure.lock().clone()
    }

    /// Block the calling thread until the task reaches a terminal state;
    /// surfaces the task's failure as an error.
    pub fn wait(&self) -> Result<(), EngineError> {
        let mut status = self.inner.status.lock();
        while !status.is_terminal() {
            self.inner.done.wait(&mut status);
        }
        let final_status = *status;
        drop(status);

        if final_status == TaskStatus::Failed {
            Err(EngineError::TaskFailed {
                task: self.inner.name.clone(),
                message: self
                    .failure()
                    .unwrap_or_else(|| "unknown failure".to_string()),
            })
        } else {
            Ok(())
        }
    }

    /// Await a terminal state without blocking a runtime thread.
    pub(crate) async fn wait_async(&self) -> TaskStatus {
        let mut rx = self.inner.wake.subscribe();
        loop {
            let status = self.status();
            if status.is_terminal() {
                return status;
            }
            if rx.changed().await.is_err() {
                return self.status();
            }
        }
    }

    pub(crate) fn mark_running(&self) {
        let mut status = self.inner.status.lock();
        if *status == TaskStatus::Pending {
            *status = TaskStatus::Running;
        }
        drop(status);
        let _ = self.inner.wake.send(());
    }

    pub(crate) fn finish(&self, result: Result<(), String>) {
        let mut status = self.inner.status.lock();
        if status.is_terminal() {
            return;
        }
        match result {
            Ok(()) => *status = TaskStatus::Succeeded,
            Err(message) => {
                *status = TaskStatus::Failed;
                *self.inner.failure.lock() = Some(message);
            }
        }
        self.inner.done.notify_all();
        drop(status);
        let _ = self.inner.wake.send(());
    }
}

/// An opaque task runner: accepts a command or action plus resource hints
/// and an input-dependency list, returns a handle that resolves when the
/// work finishes or fails.
pub trait ExecutionEngine: Send + Sync {
    fn submit(&self, spec: TaskSpec) -> Result<TaskHandle, EngineError>;
}
