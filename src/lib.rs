//! Skybatch: Dependency-Aware Simulation Job Generation
//!
//! Generates and submits large batches of detector-rendering jobs for
//! astronomical survey visits, wiring per-visit precompute dependencies,
//! skipping already-finished work, and cleaning up intermediate artifacts
//! once every consumer has completed.

pub mod catalog;
pub mod cli;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod generator;
pub mod logging;
pub mod plan;
pub mod prereq;
pub mod types;
