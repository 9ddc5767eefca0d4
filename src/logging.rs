//! Logging System
//!
//! Structured logging via the `tracing` crate: configurable level, text or
//! JSON output, and an optional log file. Job-level logs (one file per
//! submitted task) are handled by the execution engine, not here.

use crate::error::SchedulerError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json, text
    #[serde(default = "default_format")]
    pub format: String,

    /// Output destination: stdout, stderr, file
    #[serde(default = "default_output")]
    pub output: String,

    /// Log file path (if output is "file")
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Enable colored output (text format, terminal destinations only)
    #[serde(default = "default_true")]
    pub color: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_output() -> String {
    "stderr".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_format(),
            output: default_output(),
            file: None,
            color: default_true(),
        }
    }
}

/// Initialize the logging system.
///
/// Priority order (highest to lowest): `SKYBATCH_LOG*` environment
/// variables, then the configuration file, then defaults.
pub fn init_logging(config: &LoggingConfig) -> Result<(), SchedulerError> {
    let filter = build_env_filter(config)?;
    let format = determine_format(config)?;
    let output = determine_output(config)?;

    let base_subscriber = Registry::default().with(filter);

    let file_writer = |path: Option<&PathBuf>| -> Result<std::fs::File, SchedulerError> {
        let path = path.ok_or_else(|| {
            SchedulerError::Config("log output is 'file' but no log file path is set".to_string())
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(SchedulerError::from)
    };

    match (format.as_str(), output.as_str()) {
        ("json", "file") => {
            let writer = file_writer(config.file.as_ref())?;
            base_subscriber
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(ChronoUtc::rfc_3339())
                        .with_writer(writer),
                )
                .init();
        }
        ("json", "stdout") => {
            base_subscriber
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(ChronoUtc::rfc_3339())
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        ("json", _) => {
            base_subscriber
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(ChronoUtc::rfc_3339())
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        (_, "file") => {
            let writer = file_writer(config.file.as_ref())?;
            base_subscriber
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_timer(ChronoUtc::rfc_3339())
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
        }
        (_, "stdout") => {
            base_subscriber
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_timer(ChronoUtc::rfc_3339())
                        .with_ansi(config.color)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        _ => {
            base_subscriber
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_timer(ChronoUtc::rfc_3339())
                        .with_ansi(config.color)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    }

    Ok(())
}

fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter, SchedulerError> {
    if let Ok(filter) = EnvFilter::try_from_env("SKYBATCH_LOG") {
        return Ok(filter);
    }
    Ok(EnvFilter::new(config.level.as_str()))
}

fn determine_format(config: &LoggingConfig) -> Result<String, SchedulerError> {
    let format = std::env::var("SKYBATCH_LOG_FORMAT").unwrap_or_else(|_| config.format.clone());
    if format != "json" && format != "text" {
        return Err(SchedulerError::Config(format!(
            "invalid log format: {} (must be 'json' or 'text')",
            format
        )));
    }
    Ok(format)
}

fn determine_output(config: &LoggingConfig) -> Result<String, SchedulerError> {
    let output = std::env::var("SKYBATCH_LOG_OUTPUT").unwrap_or_else(|_| config.output.clone());
    match output.as_str() {
        "stdout" | "stderr" | "file" => Ok(output),
        _ => Err(SchedulerError::Config(format!(
            "invalid log output: {} (must be 'stdout', 'stderr', or 'file')",
            output
        ))),
    }
}
