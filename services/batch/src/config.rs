use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;

use rta_parser::{ErrorKind, WorkbookOptions, DEFAULT_ECONOMIC_BLOCKS};

// =============================================================================
// Environment
// =============================================================================

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub reference_table: PathBuf,
    pub output_dir: PathBuf,
    pub batch_config: PathBuf,
    pub jobs: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            data_dir: PathBuf::from(
                std::env::var("RTA_DATA_DIR").unwrap_or_else(|_| "./data/rta".to_string()),
            ),
            reference_table: PathBuf::from(
                std::env::var("RTA_REFERENCE_TABLE")
                    .unwrap_or_else(|_| "./data/country_codes.csv".to_string()),
            ),
            output_dir: PathBuf::from(
                std::env::var("RTA_OUTPUT_DIR").unwrap_or_else(|_| "./data/out".to_string()),
            ),
            batch_config: PathBuf::from(
                std::env::var("RTA_CONFIG").unwrap_or_else(|_| "config/rta.json".to_string()),
            ),
            jobs: match std::env::var("RTA_JOBS") {
                Ok(value) => value
                    .parse()
                    .with_context(|| format!("RTA_JOBS is not a number: {}", value))?,
                Err(_) => 1,
            },
        })
    }
}

// =============================================================================
// Batch configuration file
// =============================================================================

/// What to do when a workbook fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Persist what was gathered so far and fail the run
    #[default]
    Abort,
    /// Log the failure and continue with the next workbook
    Skip,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub version: String,
    /// File names excluded from the run wherever they are found
    pub blacklist: Vec<String>,
    pub economic_blocks: Vec<String>,
    pub allow_empty: bool,
    pub on_structural_error: ErrorPolicy,
    pub on_semantic_error: ErrorPolicy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            blacklist: Vec::new(),
            economic_blocks: DEFAULT_ECONOMIC_BLOCKS.iter().map(|b| b.to_string()).collect(),
            allow_empty: false,
            on_structural_error: ErrorPolicy::Abort,
            on_semantic_error: ErrorPolicy::Abort,
        }
    }
}

impl BatchConfig {
    pub fn policy_for(&self, kind: ErrorKind) -> ErrorPolicy {
        match kind {
            ErrorKind::Structural => self.on_structural_error,
            ErrorKind::Semantic => self.on_semantic_error,
        }
    }

    pub fn workbook_options(&self) -> WorkbookOptions {
        WorkbookOptions {
            allow_empty: self.allow_empty,
        }
    }

    pub fn is_blacklisted(&self, file_name: &str) -> bool {
        self.blacklist.iter().any(|b| b == file_name)
    }
}

/// Load the batch configuration; a missing file means defaults
pub async fn load_batch_config(path: &Path) -> Result<BatchConfig> {
    if !fs::try_exists(path).await.unwrap_or(false) {
        return Ok(BatchConfig::default());
    }
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read batch config {}", path.display()))?;
    let config: BatchConfig =
        serde_json::from_str(&content).context("Failed to parse batch config")?;
    Ok(config)
}
