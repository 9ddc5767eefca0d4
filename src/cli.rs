//! Command-line interface: argument definitions and command dispatch.

use crate::catalog::{FsProbe, OutputProbe};
use crate::config::SchedulerConfig;
use crate::engine::{DryRunEngine, ExecutionEngine, LocalEngine, TaskStatus};
use crate::error::SchedulerError;
use crate::generator::{JobGenerator, RunSummary};
use crate::plan::WorkPlan;
use crate::types::VisitId;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

/// Skybatch CLI - dependency-aware batch job generation for survey image
/// simulation
#[derive(Parser)]
#[command(name = "skybatch")]
#[command(about = "Generate and submit detector-rendering simulation jobs")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Campaign configuration file
    #[arg(long, default_value = "skybatch.toml")]
    pub config: PathBuf,

    /// Enable verbose logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Submit every planned render job
    Run {
        /// Submit all jobs and exit without waiting for completion
        #[arg(long)]
        no_block: bool,

        /// Show what would be submitted without running anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Show remaining work per visit without submitting
    Plan {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Generate precompute artifacts without rendering
    Psf {
        /// Visit to precompute; repeatable (defaults to the configured
        /// visit list)
        #[arg(long = "visit")]
        visits: Vec<VisitId>,

        /// Submit and exit without waiting for completion
        #[arg(long)]
        no_block: bool,
    },
}

/// Load the configuration and execute the selected command, returning the
/// text to print.
pub fn execute(cli: &Cli) -> Result<String, SchedulerError> {
    let config = SchedulerConfig::load(&cli.config)?;
    match &cli.command {
        Commands::Run { no_block, dry_run } => run_jobs(&config, !no_block, *dry_run),
        Commands::Plan { format } => show_plan(&config, format),
        Commands::Psf { visits, no_block } => run_precompute(&config, visits, !no_block),
    }
}

fn run_jobs(config: &SchedulerConfig, block: bool, dry_run: bool) -> Result<String, SchedulerError> {
    let probe: Arc<dyn OutputProbe> = Arc::new(FsProbe::new(config));

    if dry_run {
        let recorder = Arc::new(DryRunEngine::new());
        let engine: Arc<dyn ExecutionEngine> = Arc::clone(&recorder) as _;
        let mut generator = JobGenerator::new(config.clone(), engine, probe)?;
        let summary = generator.run(false)?;

        let mut out = summary_line("Dry run", &summary);
        for task in recorder.submitted() {
            out.push_str(&format!(
                "\n  {}  {}",
                task.name,
                task.command.as_deref().unwrap_or("<clean-up action>")
            ));
        }
        return Ok(out);
    }

    let engine: Arc<dyn ExecutionEngine> = Arc::new(LocalEngine::new(&config.engine)?);
    let mut generator = JobGenerator::new(config.clone(), engine, probe)?;
    let summary = generator.run(block)?;
    if block {
        Ok(summary_line("Completed", &summary))
    } else {
        Ok(format!(
            "{}\n{}",
            summary_line("Submitted", &summary),
            format_statuses(&generator.task_statuses())
        ))
    }
}

fn show_plan(config: &SchedulerConfig, format: &str) -> Result<String, SchedulerError> {
    let probe = FsProbe::new(config);
    let plan = WorkPlan::assemble(config, &probe)?;

    if format == "json" {
        let visits: Vec<serde_json::Value> = plan
            .visits()
            .iter()
            .map(|&visit| {
                let remaining = plan.remaining(visit).len();
                serde_json::json!({
                    "visit": visit,
                    "remaining_detectors": remaining,
                    "jobs": remaining.div_ceil(plan.nfiles()),
                })
            })
            .collect();
        let out = serde_json::json!({
            "nfiles": plan.nfiles(),
            "total_jobs": plan.total_jobs(),
            "visits": visits,
        });
        return serde_json::to_string_pretty(&out)
            .map_err(|e| SchedulerError::Config(e.to_string()));
    }

    use comfy_table::Table;
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Visit", "Remaining Detectors", "Jobs"]);
    for &visit in plan.visits() {
        let remaining = plan.remaining(visit).len();
        table.add_row(vec![
            visit.to_string(),
            remaining.to_string(),
            remaining.div_ceil(plan.nfiles()).to_string(),
        ]);
    }
    Ok(format!("{}\nTotal jobs: {}", table, plan.total_jobs()))
}

fn run_precompute(
    config: &SchedulerConfig,
    visits: &[VisitId],
    block: bool,
) -> Result<String, SchedulerError> {
    let probe: Arc<dyn OutputProbe> = Arc::new(FsProbe::new(config));
    let engine: Arc<dyn ExecutionEngine> = Arc::new(LocalEngine::new(&config.engine)?);
    let visits = if visits.is_empty() {
        config.visits.clone()
    } else {
        visits.to_vec()
    };

    let mut generator = JobGenerator::new(config.clone(), engine, probe)?;
    let handles = generator.precompute_only(&visits, block)?;
    Ok(format!(
        "Precompute tasks submitted: {} ({} visits already had artifacts)",
        handles.len(),
        visits.len() - handles.len()
    ))
}

fn summary_line(prefix: &str, summary: &RunSummary) -> String {
    format!(
        "{}: {} render jobs, {} precompute tasks, {} clean-up tasks",
        prefix, summary.render_jobs, summary.precompute_jobs, summary.cleanup_jobs
    )
}

fn format_statuses(statuses: &[(String, TaskStatus)]) -> String {
    use comfy_table::Table;
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Task", "Status"]);
    for (name, status) in statuses {
        table.add_row(vec![name.clone(), format!("{:?}", status)]);
    }
    table.to_string()
}
