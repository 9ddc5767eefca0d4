//! Chunk Planner: remaining work per visit and the emission state machine.
//!
//! `WorkPlan` is computed once, before any submission, and never changes
//! during a run. `Cursor` is the only mutable run state; `step` is a pure
//! function of the cursor and the plan, so the state machine is testable
//! without an execution engine.

use crate::catalog::OutputProbe;
use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::types::{DetectorId, VisitId};
use std::collections::HashMap;

/// Immutable per-run work inventory.
#[derive(Debug, Clone)]
pub struct WorkPlan {
    visits: Vec<VisitId>,
    remaining: HashMap<VisitId, Vec<DetectorId>>,
    nfiles: usize,
    total_jobs: usize,
}

impl WorkPlan {
    /// Compute the remaining detector list for every visit and the total
    /// chunk count. Discovery runs once here; the plan assumes nothing else
    /// modifies the output directories during the run.
    pub fn assemble(
        config: &SchedulerConfig,
        probe: &dyn OutputProbe,
    ) -> Result<Self, SchedulerError> {
        let target = config.detectors.resolve();
        let mut remaining = HashMap::with_capacity(config.visits.len());
        for &visit in &config.visits {
            let dets: Vec<DetectorId> = if config.discover_finished {
                let finished = probe.finished_detectors(visit)?;
                target
                    .iter()
                    .copied()
                    .filter(|det| !finished.contains(det))
                    .collect()
            } else {
                target.clone()
            };
            remaining.insert(visit, dets);
        }

        let total_jobs = remaining
            .values()
            .map(|dets| dets.len().div_ceil(config.nfiles))
            .sum();

        Ok(Self {
            visits: config.visits.clone(),
            remaining,
            nfiles: config.nfiles,
            total_jobs,
        })
    }

    pub fn visits(&self) -> &[VisitId] {
        &self.visits
    }

    pub fn visit_at(&self, index: usize) -> Option<VisitId> {
        self.visits.get(index).copied()
    }

    /// Sorted detector ids still needing work for a visit.
    pub fn remaining(&self, visit: VisitId) -> &[DetectorId] {
        self.remaining
            .get(&visit)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn nfiles(&self) -> usize {
        self.nfiles
    }

    /// Total planned chunk count across all visits.
    pub fn total_jobs(&self) -> usize {
        self.total_jobs
    }
}

/// A contiguous batch of detectors processed by one submitted task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpec {
    pub visit: VisitId,
    pub detectors: Vec<DetectorId>,
}

impl ChunkSpec {
    pub fn start(&self) -> DetectorId {
        self.detectors[0]
    }

    pub fn end(&self) -> DetectorId {
        self.detectors[self.detectors.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }
}

/// Next move of the emission state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Submit a chunk task for this batch.
    Emit(ChunkSpec),
    /// The visit's chunk sequence is exhausted; schedule its cleanup and
    /// move on.
    FinishVisit(VisitId),
    /// Every visit has been handled.
    Done,
}

/// Generator position: monotonically advancing, never rewound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    pub visit_index: usize,
    pub det_index: usize,
    pub launched: usize,
}

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the next move without mutating anything.
    pub fn step(&self, plan: &WorkPlan) -> Step {
        let Some(visit) = plan.visit_at(self.visit_index) else {
            return Step::Done;
        };
        let dets = plan.remaining(visit);
        if self.det_index >= dets.len() {
            return Step::FinishVisit(visit);
        }
        let end = (self.det_index + plan.nfiles()).min(dets.len());
        Step::Emit(ChunkSpec {
            visit,
            detectors: dets[self.det_index..end].to_vec(),
        })
    }

    /// Advance past a step previously returned by [`Cursor::step`].
    pub fn apply(&mut self, plan: &WorkPlan, step: &Step) {
        match step {
            Step::Emit(_) => {
                self.det_index += plan.nfiles();
                self.launched += 1;
            }
            Step::FinishVisit(_) => {
                self.visit_index += 1;
                self.det_index = 0;
            }
            Step::Done => {}
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{DetectorSelection, EngineConfig};
    use crate::logging::LoggingConfig;
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    pub(crate) fn test_config(
        visits: Vec<VisitId>,
        detectors: DetectorSelection,
        nfiles: usize,
    ) -> SchedulerConfig {
        SchedulerConfig {
            program: "simulate".to_string(),
            sim_config: PathBuf::from("sim.yaml"),
            visits,
            detectors,
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

    struct MapProbe {
        finished: HashMap<VisitId, BTreeSet<DetectorId>>,
    }

    impl MapProbe {
        fn empty() -> Self {
            Self {
                finished: HashMap::new(),
            }
        }

        fn with(visit: VisitId, dets: impl IntoIterator<Item = DetectorId>) -> Self {
            let mut finished = HashMap::new();
            finished.insert(visit, dets.into_iter().collect());
            Self { finished }
        }
    }

    impl OutputProbe for MapProbe {
        fn finished_detectors(
            &self,
            visit: VisitId,
        ) -> Result<BTreeSet<DetectorId>, SchedulerError> {
            Ok(self.finished.get(&visit).cloned().unwrap_or_default())
        }

        fn precompute_artifact(&self, _visit: VisitId) -> Option<PathBuf> {
            None
        }
    }

    #[test]
    fn total_jobs_rounds_up() {
        // 9 remaining detectors at nfiles=4 -> chunks of 4, 4, 1.
        let config = test_config(vec![1], DetectorSelection::Range { start: 0, end: 8 }, 4);
        let plan = WorkPlan::assemble(&config, &MapProbe::empty()).unwrap();
        assert_eq!(plan.total_jobs(), 3);
    }

    #[test]
    fn exact_division_has_no_short_chunk() {
        let config = test_config(vec![1], DetectorSelection::Range { start: 0, end: 7 }, 4);
        let plan = WorkPlan::assemble(&config, &MapProbe::empty()).unwrap();
        assert_eq!(plan.total_jobs(), 2);

        let mut cursor = Cursor::new();
        let mut sizes = Vec::new();
        loop {
            let step = cursor.step(&plan);
            if let Step::Emit(chunk) = &step {
                sizes.push(chunk.len());
            }
            if step == Step::Done {
                break;
            }
            cursor.apply(&plan, &step);
        }
        assert_eq!(sizes, vec![4, 4]);
    }

    #[test]
    fn discovery_subtracts_finished_detectors() {
        let config = test_config(vec![5], DetectorSelection::Range { start: 0, end: 18 }, 4);
        let plan = WorkPlan::assemble(&config, &MapProbe::with(5, 0..10)).unwrap();
        assert_eq!(plan.remaining(5), (10..=18).collect::<Vec<_>>());
    }

    #[test]
    fn discovery_disabled_reprocesses_everything() {
        let mut config = test_config(vec![5], DetectorSelection::Range { start: 0, end: 18 }, 4);
        config.discover_finished = false;
        let plan = WorkPlan::assemble(&config, &MapProbe::with(5, 0..10)).unwrap();
        assert_eq!(plan.remaining(5), (0..=18).collect::<Vec<_>>());
    }

    #[test]
    fn empty_target_set_contributes_zero_jobs() {
        let config = test_config(vec![5], DetectorSelection::List(vec![]), 4);
        let plan = WorkPlan::assemble(&config, &MapProbe::empty()).unwrap();
        assert_eq!(plan.total_jobs(), 0);
        assert!(plan.remaining(5).is_empty());
    }

    #[test]
    fn cursor_walks_visits_in_order_and_terminates() {
        let config = test_config(
            vec![100, 200],
            DetectorSelection::Range { start: 0, end: 5 },
            2,
        );
        let plan = WorkPlan::assemble(&config, &MapProbe::empty()).unwrap();
        assert_eq!(plan.total_jobs(), 6);

        let mut cursor = Cursor::new();
        let mut emitted: Vec<(VisitId, Vec<DetectorId>)> = Vec::new();
        let mut finished: Vec<VisitId> = Vec::new();
        loop {
            let step = cursor.step(&plan);
            match &step {
                Step::Emit(chunk) => emitted.push((chunk.visit, chunk.detectors.clone())),
                Step::FinishVisit(visit) => finished.push(*visit),
                Step::Done => break,
            }
            cursor.apply(&plan, &step);
        }

        assert_eq!(
            emitted,
            vec![
                (100, vec![0, 1]),
                (100, vec![2, 3]),
                (100, vec![4, 5]),
                (200, vec![0, 1]),
                (200, vec![2, 3]),
                (200, vec![4, 5]),
            ]
        );
        assert_eq!(finished, vec![100, 200]);
        assert_eq!(cursor.launched, plan.total_jobs());
    }

    #[test]
    fn cursor_passes_through_empty_visits() {
        let config = test_config(vec![1, 2, 3], DetectorSelection::List(vec![]), 4);
        let plan = WorkPlan::assemble(&config, &MapProbe::empty()).unwrap();

        let mut cursor = Cursor::new();
        let mut finished = Vec::new();
        loop {
            let step = cursor.step(&plan);
            match &step {
                Step::Emit(_) => panic!("no chunks expected"),
                Step::FinishVisit(visit) => finished.push(*visit),
                Step::Done => break,
            }
            cursor.apply(&plan, &step);
        }
        assert_eq!(finished, vec![1, 2, 3]);
        assert_eq!(cursor.launched, 0);
    }

    #[test]
    fn remainder_of_one_produces_final_chunk_of_one() {
        let config = test_config(vec![1], DetectorSelection::Range { start: 0, end: 4 }, 2);
        let plan = WorkPlan::assemble(&config, &MapProbe::empty()).unwrap();

        let mut cursor = Cursor::new();
        let mut last_len = 0;
        loop {
            let step = cursor.step(&plan);
            if let Step::Emit(chunk) = &step {
                last_len = chunk.len();
            }
            if step == Step::Done {
                break;
            }
            cursor.apply(&plan, &step);
        }
        assert_eq!(last_len, 1);
    }
}
