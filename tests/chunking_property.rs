//! Property-based tests for chunk partitioning guarantees.

use proptest::prelude::*;
use skybatch::catalog::OutputProbe;
use skybatch::config::{DetectorSelection, EngineConfig, SchedulerConfig};
use skybatch::error::SchedulerError;
use skybatch::logging::LoggingConfig;
use skybatch::plan::{Cursor, Step, WorkPlan};
use skybatch::types::{DetectorId, VisitId};
use std::collections::BTreeSet;
use std::path::PathBuf;

struct FinishedProbe {
    finished: BTreeSet<DetectorId>,
}

impl OutputProbe for FinishedProbe {
    fn finished_detectors(&self, _visit: VisitId) -> Result<BTreeSet<DetectorId>, SchedulerError> {
        Ok(self.finished.clone())
    }

    fn precompute_artifact(&self, _visit: VisitId) -> Option<PathBuf> {
        None
    }
}

fn config_for(targets: &BTreeSet<DetectorId>, nfiles: usize) -> SchedulerConfig {
    SchedulerConfig {
        program: "simulate".to_string(),
        sim_config: PathBuf::from("sim.yaml"),
        visits: vec![1],
        detectors: DetectorSelection::List(targets.iter().copied().collect()),
        discover_finished: true,
        nfiles,
        nproc: 1,
        gb_per_ccd: 6,
        gb_per_psf: 8,
        verbosity: 2,
        output_dir: "output/{visit}".to_string(),
        output_prefix: "amp".to_string(),
        psf_dir: PathBuf::from("psf"),
        psf_ext: "pkl".to_string(),
        log_dir: PathBuf::from("logging"),
        clean_up_psfs: true,
        logging: LoggingConfig::default(),
        engine: EngineConfig::default(),
    }
}

fn emitted_chunks(plan: &WorkPlan) -> Vec<Vec<DetectorId>> {
    let mut cursor = Cursor::new();
    let mut chunks = Vec::new();
    loop {
        let step = cursor.step(plan);
        match &step {
            Step::Emit(chunk) => chunks.push(chunk.detectors.clone()),
            Step::FinishVisit(_) => {}
            Step::Done => break,
        }
        cursor.apply(plan, &step);
    }
    chunks
}

/// Emitted chunks partition the remaining set exactly: disjoint, ascending,
/// complete, and exactly `total_jobs()` of them.
#[test]
fn chunks_partition_remaining_detectors() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(
                prop::collection::btree_set(0u32..400, 0..80),
                prop::collection::btree_set(0u32..400, 0..80),
                1usize..=20,
            ),
            |(targets, finished, nfiles)| {
                let config = config_for(&targets, nfiles);
                let probe = FinishedProbe {
                    finished: finished.clone(),
                };
                let plan = WorkPlan::assemble(&config, &probe).unwrap();

                let expected: Vec<DetectorId> =
                    targets.difference(&finished).copied().collect();
                assert_eq!(plan.remaining(1), expected.as_slice());

                let chunks = emitted_chunks(&plan);
                assert_eq!(chunks.len(), plan.total_jobs());

                let mut flattened = Vec::new();
                for chunk in &chunks {
                    assert!(!chunk.is_empty());
                    assert!(chunk.len() <= nfiles);
                    flattened.extend_from_slice(chunk);
                }
                // Union equals the remaining set, in ascending order with
                // no overlaps.
                assert_eq!(flattened, expected);

                // Only the final chunk may be short.
                for chunk in chunks.iter().rev().skip(1) {
                    assert_eq!(chunk.len(), nfiles);
                }

                Ok(())
            },
        )
        .unwrap();
}

/// The planned total equals the sum of per-visit ceilings regardless of
/// how detectors split across visits.
#[test]
fn total_jobs_matches_ceiling_sum() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(prop::collection::btree_set(0u32..200, 0..50), 1usize..=10),
            |(targets, nfiles)| {
                let mut config = config_for(&targets, nfiles);
                config.visits = vec![1, 2, 3];
                let probe = FinishedProbe {
                    finished: BTreeSet::new(),
                };
                let plan = WorkPlan::assemble(&config, &probe).unwrap();

                let per_visit = targets.len().div_ceil(nfiles);
                assert_eq!(plan.total_jobs(), per_visit * 3);
                Ok(())
            },
        )
        .unwrap();
}
