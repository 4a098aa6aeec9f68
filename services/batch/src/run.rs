//! Batch execution - extract every discovered workbook, apply the error
//! policy, concatenate the records in walk order

use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task;
use tracing::{error, info, warn};

use rta_parser::{
    extract_workbook, write_csv, ExtractError, LoadedWorkbook, ReferenceData, TariffRecord,
    WorkbookOptions,
};

use crate::config::{BatchConfig, ErrorPolicy};
use crate::manifest::{content_hash, WorkbookEntry, WorkbookStatus};

pub const FULL_OUTPUT_FILE: &str = "full_rta_file.csv";
pub const PARTIAL_OUTPUT_FILE: &str = "partial_rta_file.csv";

/// Result of extracting one workbook
#[derive(Debug)]
pub struct Extraction {
    pub path: PathBuf,
    pub content_hash: Option<String>,
    pub result: Result<Vec<TariffRecord>, ExtractError>,
}

/// Hash and extract one workbook (blocking)
pub fn extract_one(path: &Path, reference: &ReferenceData, options: WorkbookOptions) -> Extraction {
    let content_hash = match std::fs::read(path) {
        Ok(bytes) => Some(content_hash(&bytes)),
        Err(e) => {
            warn!(path = %path.display(), "cannot hash workbook: {}", e);
            None
        }
    };

    let result = LoadedWorkbook::open(path)
        .and_then(|workbook| extract_workbook(&workbook, reference, options));

    Extraction {
        path: path.to_path_buf(),
        content_hash,
        result,
    }
}

#[derive(Debug, Default)]
pub struct BatchRun {
    /// All records, workbook after workbook in walk order
    pub records: Vec<TariffRecord>,
    pub entries: Vec<WorkbookEntry>,
    /// Set when a failure stopped the run
    pub aborted_by: Option<String>,
}

impl BatchRun {
    pub fn is_aborted(&self) -> bool {
        self.aborted_by.is_some()
    }

    /// Fold one extraction into the run. Returns `false` when the run must stop.
    pub fn absorb(&mut self, extraction: Extraction, config: &BatchConfig) -> bool {
        let Extraction {
            path,
            content_hash,
            result,
        } = extraction;

        match result {
            Ok(records) => {
                info!(path = %path.display(), records = records.len(), "workbook extracted");
                self.entries.push(WorkbookEntry {
                    path,
                    content_hash,
                    status: WorkbookStatus::Ok,
                    error_kind: None,
                    error: None,
                    records: records.len(),
                });
                self.records.extend(records);
                true
            }
            Err(err) => {
                let kind = err.kind();
                let policy = config.policy_for(kind);
                let status = match policy {
                    ErrorPolicy::Skip => {
                        warn!(path = %path.display(), %kind, "workbook skipped: {}", err);
                        WorkbookStatus::Skipped
                    }
                    ErrorPolicy::Abort => {
                        error!(path = %path.display(), %kind, "workbook failed: {}", err);
                        self.aborted_by = Some(format!("{}: {}", path.display(), err));
                        WorkbookStatus::Failed
                    }
                };
                self.entries.push(WorkbookEntry {
                    path,
                    content_hash,
                    status,
                    error_kind: Some(kind.to_string()),
                    error: Some(err.to_string()),
                    records: 0,
                });
                policy == ErrorPolicy::Skip
            }
        }
    }
}

/// Extract `workbooks` with at most `jobs` running at once
pub async fn run_batch(
    workbooks: Vec<PathBuf>,
    reference: Arc<ReferenceData>,
    config: &BatchConfig,
    jobs: usize,
) -> Result<BatchRun> {
    let semaphore = Arc::new(Semaphore::new(jobs.max(1)));
    let cancelled = Arc::new(AtomicBool::new(false));
    let options = config.workbook_options();

    let handles: Vec<_> = workbooks
        .into_iter()
        .map(|path| {
            let semaphore = semaphore.clone();
            let cancelled = cancelled.clone();
            let reference = reference.clone();
            tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .context("Extraction semaphore closed")?;
                if cancelled.load(Ordering::SeqCst) {
                    return Ok::<_, anyhow::Error>(None);
                }
                let extraction =
                    task::spawn_blocking(move || extract_one(&path, &reference, options))
                        .await
                        .context("Extraction task panicked")?;
                Ok(Some(extraction))
            })
        })
        .collect();

    // Handles are awaited in walk order, so the output order does not depend
    // on which workbook finished first
    let mut run = BatchRun::default();
    for handle in handles {
        let Some(extraction) = handle.await.context("Extraction task failed")?? else {
            continue;
        };
        if !run.absorb(extraction, config) {
            cancelled.store(true, Ordering::SeqCst);
            break;
        }
    }

    Ok(run)
}

/// Write the run's records: partial file on abort, full file otherwise
pub fn write_output(dir: &Path, run: &BatchRun) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output dir {}", dir.display()))?;

    let file_name = if run.is_aborted() {
        PARTIAL_OUTPUT_FILE
    } else {
        FULL_OUTPUT_FILE
    };
    let path = dir.join(file_name);
    let file = File::create(&path)
        .with_context(|| format!("Failed to create output file {}", path.display()))?;
    write_csv(&run.records, BufWriter::new(file))?;
    Ok(path)
}
