//! Error types for the Skybatch job scheduling system.

use thiserror::Error;

/// Execution-engine boundary errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("submission rejected: {0}")]
    SubmitRejected(String),

    #[error("task {task} failed: {message}")]
    TaskFailed { task: String, message: String },

    #[error("engine I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Scheduling and configuration errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("output discovery failed for visit {visit}: {message}")]
    Discovery { visit: crate::types::VisitId, message: String },

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
