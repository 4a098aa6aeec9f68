//! Workbook discovery under the data directory

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::BatchConfig;

pub const WORKBOOK_EXTENSIONS: &[&str] = &["xls", "xlsx", "xlsm", "xlsb", "ods"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    Blacklisted,
    /// Same file name already taken from another directory
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExcludedFile {
    pub path: PathBuf,
    pub reason: ExclusionReason,
}

#[derive(Debug, Default)]
pub struct Discovery {
    /// Workbooks to process, in walk order
    pub workbooks: Vec<PathBuf>,
    pub excluded: Vec<ExcludedFile>,
}

fn has_workbook_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            WORKBOOK_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Walk `root` in sorted order and pick the workbooks to process
pub fn discover_workbooks(root: &Path, config: &BatchConfig) -> Result<Discovery> {
    let mut discovery = Discovery::default();
    let mut seen: HashSet<String> = HashSet::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if !has_workbook_extension(path) {
            debug!(path = %path.display(), "not a workbook, ignored");
            continue;
        }

        let file_name = entry.file_name().to_string_lossy().to_string();
        let reason = if config.is_blacklisted(&file_name) {
            Some(ExclusionReason::Blacklisted)
        } else if !seen.insert(file_name) {
            Some(ExclusionReason::Duplicate)
        } else {
            None
        };

        match reason {
            Some(reason) => {
                warn!(path = %path.display(), ?reason, "workbook excluded");
                discovery.excluded.push(ExcludedFile {
                    path: path.to_path_buf(),
                    reason,
                });
            }
            None => discovery.workbooks.push(path.to_path_buf()),
        }
    }

    Ok(discovery)
}
