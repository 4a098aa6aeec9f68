//! Error types for workbook extraction
//!
//! The batch driver picks a policy per failure kind:
//! - structural: the sheet layout cannot be classified (`SheetParseError`)
//! - semantic: the layout is fine but the tariff content cannot be attributed
//!   (`PreferentialParseError`)

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which policy bucket an error falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Structural,
    Semantic,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Structural => write!(f, "structural"),
            ErrorKind::Semantic => write!(f, "semantic"),
        }
    }
}

/// A sheet's header/column shape could not be classified into identifying
/// and rate columns, even after the single-row fallback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot parse sheet '{sheet}': {reason}")]
pub struct SheetParseError {
    pub sheet: String,
    pub reason: String,
}

impl SheetParseError {
    pub fn new(sheet: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            sheet: sheet.into(),
            reason: reason.into(),
        }
    }
}

/// What exactly went wrong when attributing preferential content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreferentialFailure {
    /// Workbook has no sheet carrying the marker
    NoPreferentialSheet,
    /// Marker columns were found but every one of them was empty, or the
    /// preferential sheets yielded no records at all
    NoPreferentialContent,
    UnresolvedReporter,
    UnresolvedPartner,
}

impl fmt::Display for PreferentialFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreferentialFailure::NoPreferentialSheet => write!(f, "no preferential sheet found"),
            PreferentialFailure::NoPreferentialContent => {
                write!(f, "preferential columns hold no values")
            }
            PreferentialFailure::UnresolvedReporter => write!(f, "reporter cannot be resolved"),
            PreferentialFailure::UnresolvedPartner => write!(f, "partner cannot be resolved"),
        }
    }
}

/// The sheet parsed, but its preferential content cannot be attributed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{failure} (sheet: {}, agreement: {}, reporter token: {}, candidates: {candidates:?})",
    .sheet.as_deref().unwrap_or("-"),
    .agreement.as_deref().unwrap_or("-"),
    .reporter_token.as_deref().unwrap_or("-"))]
pub struct PreferentialParseError {
    pub failure: PreferentialFailure,
    pub sheet: Option<String>,
    pub agreement: Option<String>,
    pub reporter_token: Option<String>,
    pub candidates: Vec<String>,
}

impl PreferentialParseError {
    pub fn new(failure: PreferentialFailure) -> Self {
        Self {
            failure,
            sheet: None,
            agreement: None,
            reporter_token: None,
            candidates: Vec::new(),
        }
    }

    pub fn with_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet = Some(sheet.into());
        self
    }

    pub fn with_agreement(mut self, agreement: impl Into<String>) -> Self {
        self.agreement = Some(agreement.into());
        self
    }

    pub fn with_reporter_token(mut self, token: Option<&str>) -> Self {
        self.reporter_token = token.map(str::to_string);
        self
    }

    pub fn with_candidates(mut self, candidates: &[String]) -> Self {
        self.candidates = candidates.to_vec();
        self
    }
}

/// Everything extracting a workbook can fail with
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Sheet(#[from] SheetParseError),

    #[error(transparent)]
    Preferential(#[from] PreferentialParseError),

    #[error("malformed metadata sheet in '{workbook}': {reason}")]
    Metadata { workbook: String, reason: String },

    #[error("failed to read workbook {}: {source}", .path.display())]
    Workbook {
        path: PathBuf,
        #[source]
        source: calamine::Error,
    },
}

impl ExtractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractError::Preferential(_) => ErrorKind::Semantic,
            ExtractError::Sheet(_) | ExtractError::Metadata { .. } | ExtractError::Workbook { .. } => {
                ErrorKind::Structural
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_distinct() {
        let structural: ExtractError = SheetParseError::new("S", "no header").into();
        let semantic: ExtractError =
            PreferentialParseError::new(PreferentialFailure::UnresolvedPartner).into();
        assert_eq!(structural.kind(), ErrorKind::Structural);
        assert_eq!(semantic.kind(), ErrorKind::Semantic);
    }

    #[test]
    fn test_preferential_error_message_carries_context() {
        let err = PreferentialParseError::new(PreferentialFailure::UnresolvedPartner)
            .with_sheet("Mexico_Chile")
            .with_agreement("Mexico-Chile FTA")
            .with_candidates(&["Mexico".to_string(), "Chile".to_string()]);
        let msg = err.to_string();
        assert!(msg.contains("partner cannot be resolved"));
        assert!(msg.contains("Mexico_Chile"));
        assert!(msg.contains("Mexico-Chile FTA"));
        assert!(msg.contains("\"Chile\""));
    }
}
