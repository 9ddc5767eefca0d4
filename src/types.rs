//! Core identifier types shared across the crate.

/// One simulated observational pointing, identified by survey id.
pub type VisitId = u64;

/// One sensor within the simulated camera.
pub type DetectorId = u32;
