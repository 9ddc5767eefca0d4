//! Configuration loading and CLI dispatch against real files.

use clap::Parser;
use skybatch::cli::{self, Cli};
use skybatch::config::{DetectorSelection, SchedulerConfig};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_campaign_toml(root: &Path) -> std::path::PathBuf {
    let path = root.join("skybatch.toml");
    fs::write(
        &path,
        format!(
            r#"
program = "simulate"
sim_config = "{root}/sim.yaml"
visits = [740000, 740001]
nfiles = 4
nproc = 2
gb_per_ccd = 5
output_dir = "{root}/output/{{visit}}"
psf_dir = "{root}/psf"
log_dir = "{root}/logging"

[detectors]
range = {{ start = 90, end = 98 }}

[logging]
level = "warn"

[engine]
max_workers = 2
memory_cap_mb = 4096
"#,
            root = root.display()
        ),
    )
    .unwrap();
    path
}

#[test]
fn loads_full_campaign_file() {
    let temp = TempDir::new().unwrap();
    let path = write_campaign_toml(temp.path());

    let config = SchedulerConfig::load(&path).unwrap();
    assert_eq!(config.visits, vec![740000, 740001]);
    assert_eq!(config.nfiles, 4);
    assert_eq!(config.nproc, 2);
    assert_eq!(config.gb_per_ccd, 5);
    assert_eq!(
        config.detectors,
        DetectorSelection::Range { start: 90, end: 98 }
    );
    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.engine.max_workers, 2);
    // Untouched fields keep their defaults.
    assert_eq!(config.gb_per_psf, 8);
    assert!(config.clean_up_psfs);
}

#[test]
fn load_rejects_invalid_batch_geometry() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("bad.toml");
    fs::write(
        &path,
        r#"
sim_config = "sim.yaml"
visits = [1]
nfiles = 2
nproc = 8
output_dir = "output/{visit}"
psf_dir = "psf"
"#,
    )
    .unwrap();

    let err = SchedulerConfig::load(&path).unwrap_err();
    assert!(err.to_string().contains("nproc"));
}

#[test]
fn cli_dry_run_reports_planned_submissions() {
    let temp = TempDir::new().unwrap();
    let path = write_campaign_toml(temp.path());

    let cli = Cli::try_parse_from([
        "skybatch",
        "--config",
        path.to_str().unwrap(),
        "run",
        "--dry-run",
    ])
    .unwrap();

    let output = cli::execute(&cli).unwrap();
    // 9 detectors per visit at nfiles=4 -> 3 jobs per visit.
    assert!(output.starts_with("Dry run: 6 render jobs, 2 precompute tasks, 2 clean-up tasks"));
    assert!(output.contains("output.detector_selection=[90,91,92,93]"));
    assert!(output.contains("00740000_090_093"));
    assert!(output.contains("rm_psf_740001"));
    assert!(output.contains("<clean-up action>"));
}

#[test]
fn cli_plan_emits_json() {
    let temp = TempDir::new().unwrap();
    let path = write_campaign_toml(temp.path());

    let cli = Cli::try_parse_from([
        "skybatch",
        "--config",
        path.to_str().unwrap(),
        "plan",
        "--format",
        "json",
    ])
    .unwrap();

    let output = cli::execute(&cli).unwrap();
    let value: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(value["total_jobs"], 6);
    assert_eq!(value["visits"][0]["visit"], 740000);
    assert_eq!(value["visits"][0]["remaining_detectors"], 9);
    assert_eq!(value["visits"][0]["jobs"], 3);
}

#[test]
fn cli_errors_on_missing_config() {
    let cli = Cli::try_parse_from(["skybatch", "--config", "/nonexistent/skybatch.toml", "plan"])
        .unwrap();
    assert!(cli::execute(&cli).is_err());
}
