//! Simulation command-line and job-name construction.
//!
//! For a fixed configuration and plan, the produced command strings depend
//! only on the (visit, chunk) position, which keeps whole runs replayable.

use crate::config::SchedulerConfig;
use crate::plan::ChunkSpec;
use crate::types::VisitId;
use std::path::{Path, PathBuf};

/// Verbosity used for precompute invocations regardless of the configured
/// render verbosity.
const PRECOMPUTE_VERBOSITY: u8 = 2;

/// Builds simulation command lines and per-job log paths.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    program: String,
    sim_config: PathBuf,
    verbosity: u8,
    nproc: usize,
    log_dir: PathBuf,
}

impl CommandBuilder {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            program: config.program.clone(),
            sim_config: config.sim_config.clone(),
            verbosity: config.verbosity,
            nproc: config.nproc,
            log_dir: config.log_dir.clone(),
        }
    }

    /// Render command for one detector chunk. Parallelism is the configured
    /// `nproc` clipped to the chunk size so no render process sits idle.
    pub fn render(&self, chunk: &ChunkSpec) -> String {
        let detectors = chunk
            .detectors
            .iter()
            .map(|det| det.to_string())
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "{} -v {} {} input.visit={} output.count={} output.parallelism={} output.detector_selection=[{}]",
            self.program,
            self.verbosity,
            self.sim_config.display(),
            chunk.visit,
            chunk.len(),
            chunk.len().min(self.nproc),
            detectors,
        )
    }

    /// Precompute command: a zero-render-files invocation that only
    /// produces the visit's precompute artifact.
    pub fn precompute(&self, visit: VisitId) -> String {
        format!(
            "{} -v {} {} output.count=0 input.visit={}",
            self.program,
            PRECOMPUTE_VERBOSITY,
            self.sim_config.display(),
            visit,
        )
    }

    /// Name identifying one chunk job: zero-padded visit and detector
    /// bounds.
    pub fn chunk_name(chunk: &ChunkSpec) -> String {
        format!(
            "{:08}_{:03}_{:03}",
            chunk.visit,
            chunk.start(),
            chunk.end()
        )
    }

    pub fn precompute_name(visit: VisitId) -> String {
        format!("{}_psf", visit)
    }

    pub fn cleanup_name(visit: VisitId) -> String {
        format!("rm_psf_{}", visit)
    }

    /// Combined stderr/stdout log file for a named job.
    pub fn log_path(&self, job_name: &str) -> PathBuf {
        self.log_dir.join(format!("{}.log", job_name))
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectorSelection;
    use crate::plan::tests::test_config;

    fn builder() -> CommandBuilder {
        let mut config = test_config(vec![740000], DetectorSelection::All, 4);
        config.nproc = 4;
        CommandBuilder::new(&config)
    }

    fn chunk(visit: VisitId, detectors: Vec<u32>) -> ChunkSpec {
        ChunkSpec { visit, detectors }
    }

    #[test]
    fn render_command_embeds_chunk_parameters() {
        let command = builder().render(&chunk(740000, vec![90, 91, 92, 93]));
        assert_eq!(
            command,
            "simulate -v 2 sim.yaml input.visit=740000 output.count=4 \
             output.parallelism=4 output.detector_selection=[90,91,92,93]"
        );
    }

    #[test]
    fn render_parallelism_is_clipped_to_chunk_size() {
        let command = builder().render(&chunk(740000, vec![188]));
        assert!(command.contains("output.count=1"));
        assert!(command.contains("output.parallelism=1"));
    }

    #[test]
    fn precompute_command_renders_nothing() {
        let command = builder().precompute(740000);
        assert_eq!(
            command,
            "simulate -v 2 sim.yaml output.count=0 input.visit=740000"
        );
    }

    #[test]
    fn job_names_are_zero_padded() {
        let name = CommandBuilder::chunk_name(&chunk(740000, vec![0, 1, 2]));
        assert_eq!(name, "00740000_000_002");
        assert_eq!(CommandBuilder::precompute_name(740000), "740000_psf");
        assert_eq!(CommandBuilder::cleanup_name(740000), "rm_psf_740000");
    }

    #[test]
    fn log_path_is_under_log_dir() {
        let path = builder().log_path("00740000_000_002");
        assert_eq!(path, PathBuf::from("logging/00740000_000_002.log"));
    }
}
