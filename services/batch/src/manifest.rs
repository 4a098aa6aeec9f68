//! Run manifest - what a batch run read, what it produced, what it skipped

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::discover::ExcludedFile;

pub const MANIFEST_FILE: &str = "rta_manifest.json";

pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{:x}", hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkbookStatus {
    Ok,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Aborted,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkbookEntry {
    pub path: PathBuf,
    pub content_hash: Option<String>,
    pub status: WorkbookStatus,
    /// "structural" or "semantic"
    pub error_kind: Option<String>,
    pub error: Option<String>,
    pub records: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub data_dir: PathBuf,
    pub reference_table: PathBuf,
    pub reference_hash: Option<String>,
    pub output: Option<PathBuf>,
    pub total_records: usize,
    pub workbooks: Vec<WorkbookEntry>,
    pub excluded: Vec<ExcludedFile>,
}

impl RunManifest {
    pub fn start(data_dir: &Path, reference_table: &Path) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Completed,
            data_dir: data_dir.to_path_buf(),
            reference_table: reference_table.to_path_buf(),
            reference_hash: None,
            output: None,
            total_records: 0,
            workbooks: Vec::new(),
            excluded: Vec::new(),
        }
    }

    pub fn finish(&mut self, status: RunStatus, output: Option<PathBuf>, total_records: usize) {
        self.finished_at = Some(Utc::now());
        self.status = status;
        self.output = output;
        self.total_records = total_records;
    }

    pub fn count(&self, status: WorkbookStatus) -> usize {
        self.workbooks.iter().filter(|w| w.status == status).count()
    }

    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(self).context("Failed to serialize run manifest")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write run manifest {}", path.display()))?;
        Ok(path)
    }
}
