//! Work Catalog: on-disk discovery of already-finished work.
//!
//! The probe is the single source of truth for resumability. It answers two
//! questions per visit: which detectors already have rendered output, and
//! whether the precompute artifact exists. Tests substitute an in-memory
//! implementation for the filesystem one.

use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::types::{DetectorId, VisitId};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::debug;
use walkdir::WalkDir;

/// Marker preceding the three-digit detector id in rendered output
/// filenames.
const DETECTOR_MARKER: &str = "det";

/// Pluggable "what's already done" predicate.
pub trait OutputProbe: Send + Sync {
    /// Detector ids with rendered output already present for a visit.
    fn finished_detectors(&self, visit: VisitId) -> Result<BTreeSet<DetectorId>, SchedulerError>;

    /// Path of the visit's precompute artifact, if one exists.
    fn precompute_artifact(&self, visit: VisitId) -> Option<PathBuf>;
}

/// Filesystem probe following the campaign's naming conventions.
pub struct FsProbe {
    output_dir: String,
    output_prefix: String,
    psf_dir: PathBuf,
    psf_ext: String,
}

impl FsProbe {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            output_prefix: config.output_prefix.clone(),
            psf_dir: config.psf_dir.clone(),
            psf_ext: config.psf_ext.clone(),
        }
    }

    fn output_dir_for(&self, visit: VisitId) -> PathBuf {
        PathBuf::from(self.output_dir.replace("{visit}", &visit.to_string()))
    }
}

impl OutputProbe for FsProbe {
    fn finished_detectors(&self, visit: VisitId) -> Result<BTreeSet<DetectorId>, SchedulerError> {
        let dir = self.output_dir_for(visit);
        let mut finished = BTreeSet::new();
        if !dir.exists() {
            return Ok(finished);
        }

        for entry in WalkDir::new(&dir) {
            let entry = entry.map_err(|e| SchedulerError::Discovery {
                visit,
                message: format!("failed to scan {:?}: {}", dir, e),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !name.starts_with(&self.output_prefix) {
                continue;
            }
            match parse_detector_id(&name) {
                Some(det) => {
                    finished.insert(det);
                }
                None => {
                    debug!(visit, file = %name, "skipping output file without a parsable detector id");
                }
            }
        }
        Ok(finished)
    }

    fn precompute_artifact(&self, visit: VisitId) -> Option<PathBuf> {
        let pattern = format!(
            "{}/*{}*.{}",
            self.psf_dir.display(),
            visit,
            self.psf_ext
        );
        glob::glob(&pattern).ok()?.flatten().next()
    }
}

/// Parse the detector id encoded after the `det` marker as three
/// characters. Returns `None` for names that do not follow the convention.
fn parse_detector_id(name: &str) -> Option<DetectorId> {
    let index = name.find(DETECTOR_MARKER)? + DETECTOR_MARKER.len();
    name.get(index..index + 3)?.parse().ok()
}
