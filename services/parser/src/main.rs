//! Parser binary - extract preferential tariff records from one workbook
//!
//! Responsibilities:
//! - Load the country reference table
//! - Read the workbook and run every preferential sheet through the pipeline
//! - Print a summary and a few sample records
//! - Optionally write the records as CSV or JSON
//!
//! Same workbook + same reference table = same output.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{error, info};

use rta_parser::{
    extract_workbook, init_tracing, load_reference_table, write_csv, LoadedWorkbook, TariffRecord,
    WorkbookOptions, DEFAULT_ECONOMIC_BLOCKS,
};

#[derive(Parser, Debug)]
#[command(name = "rta-parser", about = "Extracts preferential tariffs from an agreement workbook")]
struct Args {
    /// Workbook to parse (xls, xlsx, xlsb, ods)
    #[arg(long)]
    workbook: PathBuf,

    /// Country reference table (CSV or spreadsheet)
    #[arg(long, env = "RTA_REFERENCE_TABLE")]
    reference: PathBuf,

    /// Return no records instead of failing when there is no preferential sheet
    #[arg(long, default_value = "false")]
    allow_empty: bool,

    /// Write records to this file instead of only printing a sample
    #[arg(long)]
    output: Option<PathBuf>,

    /// Write JSON instead of CSV
    #[arg(long, default_value = "false")]
    json: bool,

    /// Number of sample records to print
    #[arg(long, default_value = "3")]
    sample: usize,
}

fn write_json<W: Write>(records: &[TariffRecord], writer: W) -> Result<()> {
    let rows: Vec<_> = records.iter().map(TariffRecord::row).collect();
    serde_json::to_writer_pretty(writer, &rows).context("Failed to serialize records as JSON")?;
    Ok(())
}

fn print_sample(records: &[TariffRecord], sample: usize) {
    for (i, record) in records.iter().take(sample).enumerate() {
        println!(
            "  [{}] {} | {} | {} -> {} | {}",
            i + 1,
            record.tariff_line.as_deref().unwrap_or("-"),
            record.year.as_ref().map(|y| y.to_string()).unwrap_or_else(|| "-".to_string()),
            record.reporter,
            record.partner,
            record.tariff_rate.as_deref().unwrap_or("-"),
        );
    }
    if records.len() > sample {
        println!("  ... and {} more", records.len() - sample);
    }
}

fn run(args: &Args) -> Result<usize> {
    let reference = load_reference_table(&args.reference, DEFAULT_ECONOMIC_BLOCKS.iter().copied())?;
    info!(
        countries = reference.country_count(),
        blocks = reference.block_count(),
        "reference table loaded"
    );

    let workbook = LoadedWorkbook::open(&args.workbook)?;
    let options = WorkbookOptions {
        allow_empty: args.allow_empty,
    };
    let records = extract_workbook(&workbook, &reference, options)?;

    println!("\nExtracted {} records from {}", records.len(), workbook.name);
    print_sample(&records, args.sample);

    if let Some(path) = &args.output {
        let file = File::create(path)
            .with_context(|| format!("Failed to create output file {}", path.display()))?;
        let writer = BufWriter::new(file);
        if args.json {
            write_json(&records, writer)?;
        } else {
            write_csv(&records, writer)?;
        }
        println!("Wrote {}", path.display());
    }

    Ok(records.len())
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing("rta_parser=info");
    let args = Args::parse();

    println!("=== RTA Parser ===");
    println!("Workbook: {}", args.workbook.display());
    println!("Reference: {}", args.reference.display());

    let count = run(&args).map_err(|e| {
        error!(workbook = %args.workbook.display(), "extraction failed: {:#}", e);
        e
    })?;

    println!("\n=== Parsing Complete ===");
    println!("Records: {}", count);
    Ok(())
}
