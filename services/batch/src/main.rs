//! Batch Service - Extracts preferential tariffs from a directory of agreement workbooks
//!
//! Responsibilities:
//! - Discover workbooks under the data directory (blacklist, duplicate names)
//! - Load the country reference table once and share it across workers
//! - Extract each workbook, applying the error policy per failure kind
//! - Write the concatenated records (full or partial) and a run manifest
//!
//! Usage:
//!   cargo run --bin rta-batch -- --data-dir data/rta --reference data/country_codes.csv
//!
//!   # Parallel, with a batch config:
//!   cargo run --bin rta-batch -- --config config/rta.json --jobs 4

mod config;
mod discover;
mod manifest;
mod run;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use rta_parser::{init_tracing, load_reference_table};

use crate::config::{load_batch_config, Config};
use crate::discover::discover_workbooks;
use crate::manifest::{content_hash, RunManifest, RunStatus, WorkbookStatus};
use crate::run::{run_batch, write_output};

#[derive(Parser, Debug)]
#[command(name = "rta-batch", about = "Extracts preferential tariffs from a directory of workbooks")]
struct Args {
    /// Directory walked for workbooks (overrides RTA_DATA_DIR)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Country reference table (overrides RTA_REFERENCE_TABLE)
    #[arg(long)]
    reference: Option<PathBuf>,

    /// Output directory (overrides RTA_OUTPUT_DIR)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Batch config file (overrides RTA_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Workbooks extracted at once (overrides RTA_JOBS)
    #[arg(long)]
    jobs: Option<usize>,

    /// List the workbooks that would be processed and exit
    #[arg(long, default_value = "false")]
    dry_run: bool,
}

impl Args {
    fn apply(self, mut config: Config) -> (Config, bool) {
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(reference) = self.reference {
            config.reference_table = reference;
        }
        if let Some(output_dir) = self.output_dir {
            config.output_dir = output_dir;
        }
        if let Some(batch_config) = self.config {
            config.batch_config = batch_config;
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        (config, self.dry_run)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing("rta_batch=info,rta_parser=info");
    let (config, dry_run) = Args::parse().apply(Config::from_env()?);

    println!("=== RTA Batch Extraction ===");
    println!("Data dir: {}", config.data_dir.display());
    println!("Reference: {}", config.reference_table.display());
    println!("Jobs: {}", config.jobs);

    let batch_config = load_batch_config(&config.batch_config).await?;
    info!(
        config = %config.batch_config.display(),
        version = %batch_config.version,
        blacklist = batch_config.blacklist.len(),
        "batch config loaded"
    );

    let discovery = discover_workbooks(&config.data_dir, &batch_config)?;
    println!(
        "\nFound {} workbook(s), {} excluded",
        discovery.workbooks.len(),
        discovery.excluded.len()
    );

    if dry_run {
        for path in &discovery.workbooks {
            println!("  {}", path.display());
        }
        println!("\nDry run - nothing extracted");
        return Ok(());
    }

    let mut manifest = RunManifest::start(&config.data_dir, &config.reference_table);
    manifest.excluded = discovery.excluded.clone();
    manifest.reference_hash = std::fs::read(&config.reference_table)
        .ok()
        .map(|bytes| content_hash(&bytes));

    let reference = load_reference_table(
        &config.reference_table,
        batch_config.economic_blocks.iter().cloned(),
    )
    .context("Failed to load country reference table")?;
    info!(
        countries = reference.country_count(),
        blocks = reference.block_count(),
        "reference table loaded"
    );

    let run = run_batch(
        discovery.workbooks,
        Arc::new(reference),
        &batch_config,
        config.jobs,
    )
    .await?;

    let output = write_output(&config.output_dir, &run)?;
    let status = if run.is_aborted() {
        RunStatus::Aborted
    } else {
        RunStatus::Completed
    };
    manifest.workbooks = run.entries.clone();
    manifest.finish(status, Some(output.clone()), run.records.len());
    let manifest_path = manifest.write(&config.output_dir)?;

    println!("\n=== Batch Summary ===");
    println!("Run: {}", manifest.run_id);
    println!("Extracted: {}", manifest.count(WorkbookStatus::Ok));
    println!("Skipped: {}", manifest.count(WorkbookStatus::Skipped));
    println!("Failed: {}", manifest.count(WorkbookStatus::Failed));
    println!("Records: {}", run.records.len());
    println!("Output: {}", output.display());
    println!("Manifest: {}", manifest_path.display());

    if let Some(reason) = &run.aborted_by {
        anyhow::bail!("Batch aborted, partial output kept: {}", reason);
    }

    Ok(())
}
