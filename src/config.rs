//! Configuration System
//!
//! Constructor-time, immutable-per-run configuration for a job generation
//! campaign: visit list, target detector selection, batch geometry, resource
//! estimates, and artifact locations. Loaded from a TOML file with
//! environment variable overrides and validated before any task is submitted.

use crate::error::SchedulerError;
use crate::logging::LoggingConfig;
use crate::types::{DetectorId, VisitId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Number of science detectors in the simulated camera.
pub const CAMERA_DETECTOR_COUNT: DetectorId = 189;

/// Target detector selection: everything, an inclusive range, or an
/// explicit list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorSelection {
    /// All science detectors (`0..CAMERA_DETECTOR_COUNT`).
    All,
    /// Inclusive numeric range `[start, end]`.
    Range { start: DetectorId, end: DetectorId },
    /// Explicit detector ids; deduplicated and sorted on resolution.
    List(Vec<DetectorId>),
}

impl DetectorSelection {
    /// Resolve the selection into a sorted, deduplicated target set.
    pub fn resolve(&self) -> Vec<DetectorId> {
        match self {
            DetectorSelection::All => (0..CAMERA_DETECTOR_COUNT).collect(),
            DetectorSelection::Range { start, end } => (*start..=*end).collect(),
            DetectorSelection::List(items) => {
                let mut dets = items.clone();
                dets.sort_unstable();
                dets.dedup();
                dets
            }
        }
    }

    fn validate(&self) -> Result<(), String> {
        if let DetectorSelection::Range { start, end } = self {
            if start > end {
                return Err(format!(
                    "detector range start {} exceeds end {}",
                    start, end
                ));
            }
        }
        Ok(())
    }
}

impl Default for DetectorSelection {
    fn default() -> Self {
        DetectorSelection::All
    }
}

/// Local execution engine capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum concurrently running tasks
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Total memory available to running tasks (MB)
    #[serde(default = "default_memory_cap_mb")]
    pub memory_cap_mb: u64,

    /// Shell used to run task commands
    #[serde(default = "default_shell")]
    pub shell: String,
}

fn default_max_workers() -> usize {
    4
}

fn default_memory_cap_mb() -> u64 {
    16 * 1024
}

fn default_shell() -> String {
    "/bin/sh".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            memory_cap_mb: default_memory_cap_mb(),
            shell: default_shell(),
        }
    }
}

/// Root configuration for one generation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Simulation executable invoked by generated command lines
    #[serde(default = "default_program")]
    pub program: String,

    /// Simulation configuration file passed to every invocation
    pub sim_config: PathBuf,

    /// Visits to process, in submission order
    #[serde(default)]
    pub visits: Vec<VisitId>,

    /// Target detector selection
    #[serde(default)]
    pub detectors: DetectorSelection,

    /// Subtract already-rendered detectors found in the output directory
    #[serde(default = "default_true")]
    pub discover_finished: bool,

    /// Detectors per submitted job (batch width)
    #[serde(default = "default_nfiles")]
    pub nfiles: usize,

    /// Render parallelism inside one simulation instance
    #[serde(default = "default_nproc")]
    pub nproc: usize,

    /// Expected memory per rendered detector (GB)
    #[serde(default = "default_gb_per_ccd")]
    pub gb_per_ccd: u64,

    /// Expected memory for one precompute task (GB)
    #[serde(default = "default_gb_per_psf")]
    pub gb_per_psf: u64,

    /// Simulation output verbosity
    #[serde(default = "default_verbosity")]
    pub verbosity: u8,

    /// Per-visit rendered output directory; `{visit}` is replaced by the
    /// visit id
    pub output_dir: String,

    /// Filename prefix of rendered detector outputs
    #[serde(default = "default_output_prefix")]
    pub output_prefix: String,

    /// Directory holding per-visit precompute artifacts
    pub psf_dir: PathBuf,

    /// Precompute artifact file extension
    #[serde(default = "default_psf_ext")]
    pub psf_ext: String,

    /// Directory receiving one combined stderr/stdout log per job
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Delete a visit's precompute artifact once its jobs have finished
    #[serde(default = "default_true")]
    pub clean_up_psfs: bool,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Local engine configuration
    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_program() -> String {
    "simulate".to_string()
}

fn default_true() -> bool {
    true
}

fn default_nfiles() -> usize {
    10
}

fn default_nproc() -> usize {
    1
}

fn default_gb_per_ccd() -> u64 {
    6
}

fn default_gb_per_psf() -> u64 {
    8
}

fn default_verbosity() -> u8 {
    2
}

fn default_output_prefix() -> String {
    "amp".to_string()
}

fn default_psf_ext() -> String {
    "pkl".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logging")
}

impl SchedulerConfig {
    /// Load configuration from a TOML file, applying `SKYBATCH_*`
    /// environment overrides, and validate it.
    pub fn load(path: &Path) -> Result<Self, SchedulerError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix("SKYBATCH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| SchedulerError::Config(format!("failed to load {:?}: {}", path, e)))?;

        let config: SchedulerConfig = settings
            .try_deserialize()
            .map_err(|e| SchedulerError::Config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the parameter combination; fails before any submission.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        let mut errors = Vec::new();

        if self.nfiles == 0 {
            errors.push("nfiles must be at least 1".to_string());
        }
        if self.nproc == 0 {
            errors.push("nproc must be at least 1".to_string());
        }
        // Every process of a simulation instance must have a detector to
        // start on.
        if self.nfiles < self.nproc {
            errors.push(format!(
                "nfiles ({}) must not be smaller than nproc ({})",
                self.nfiles, self.nproc
            ));
        }
        if let Err(e) = self.detectors.validate() {
            errors.push(e);
        }
        if self.discover_finished && !self.output_dir.contains("{visit}") {
            errors.push(format!(
                "output_dir {:?} must contain a {{visit}} placeholder when discovery is enabled",
                self.output_dir
            ));
        }
        if self.program.trim().is_empty() {
            errors.push("program cannot be empty".to_string());
        }
        let mut seen = std::collections::HashSet::new();
        for &visit in &self.visits {
            if !seen.insert(visit) {
                errors.push(format!("visit {} listed more than once", visit));
                break;
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SchedulerError::Config(errors.join("; ")))
        }
    }

    /// Rendered output directory for one visit.
    pub fn output_dir_for(&self, visit: VisitId) -> PathBuf {
        PathBuf::from(self.output_dir.replace("{visit}", &visit.to_string()))
    }
}
