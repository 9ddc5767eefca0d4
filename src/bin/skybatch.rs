//! Skybatch CLI Binary
//!
//! Entry point for the job generation tool: initialize logging, load the
//! campaign configuration, and dispatch the selected command.

use anyhow::Context;
use clap::Parser;
use skybatch::cli::{self, Cli};
use skybatch::config::SchedulerConfig;
use skybatch::logging::{init_logging, LoggingConfig};
use std::process;
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();

    let logging_config = build_logging_config(&cli);
    if let Err(e) = init_logging(&logging_config) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    info!("skybatch starting");

    match cli::execute(&cli).with_context(|| format!("using configuration {:?}", cli.config)) {
        Ok(output) => {
            info!("command completed");
            println!("{}", output);
        }
        Err(e) => {
            error!("command failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

/// Build logging configuration from CLI args and the config file.
/// Precedence: CLI flags override config file override defaults.
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let mut config = SchedulerConfig::load(&cli.config)
        .ok()
        .map(|c| c.logging)
        .unwrap_or_default();

    if cli.verbose {
        config.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }

    config
}
