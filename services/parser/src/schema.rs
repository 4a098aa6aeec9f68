//! Schema detection - which columns identify a tariff line and which carry rates
//!
//! Two header shapes are understood:
//! - two-level: outer row names the column (or the rate kind), inner row names
//!   the year; a placeholder inner cell means the outer label is the real name
//! - single-row: one header row, rate headers carry the marker (and usually a
//!   year token)
//!
//! Two-level is tried first. When it does not fit the sheet, single-row is
//! tried; when neither fits, the sheet is rejected with `SheetParseError`.

use std::collections::HashSet;
use tracing::debug;

use crate::error::SheetParseError;
use crate::sheet::{Cell, RawSheet};

/// Substring marking a rate-bearing column (and a preferential sheet name)
pub const RATE_MARKER: &str = "Preferential";

pub const TARIFF_LINE_COLUMN: &str = "TL";
pub const TARIFF_LINE_STATUS_COLUMN: &str = "TLS";
pub const YEAR_COLUMN: &str = "Year";
pub const REPORTER_COLUMN: &str = "Reporter";

/// Column names recognized as identifying columns
pub const IDENTIFYING_COLUMNS: &[&str] = &[
    TARIFF_LINE_COLUMN,
    TARIFF_LINE_STATUS_COLUMN,
    YEAR_COLUMN,
    REPORTER_COLUMN,
];

/// Prefix spreadsheet exports use for blank header cells
const PLACEHOLDER_PREFIX: &str = "Unnamed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderShape {
    TwoLevel,
    SingleRow,
}

impl HeaderShape {
    pub fn header_rows(self) -> usize {
        match self {
            HeaderShape::TwoLevel => 2,
            HeaderShape::SingleRow => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRole {
    /// Held key, named after its header
    Identifying(String),
    /// Rate column; `year_label` is what lands in `Tariff_Year` when melted
    Rate { year_label: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedColumn {
    /// Position in the sheet grid
    pub index: usize,
    /// Header text (outer label for two-level headers)
    pub header: String,
    pub role: ColumnRole,
}

impl ClassifiedColumn {
    pub fn is_rate(&self) -> bool {
        matches!(self.role, ColumnRole::Rate { .. })
    }

    pub fn identifying_name(&self) -> Option<&str> {
        match &self.role {
            ColumnRole::Identifying(name) => Some(name),
            ColumnRole::Rate { .. } => None,
        }
    }

    pub fn year_label(&self) -> Option<&str> {
        match &self.role {
            ColumnRole::Rate { year_label } => year_label.as_deref(),
            ColumnRole::Identifying(_) => None,
        }
    }
}

/// Column classification of one sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetLayout {
    pub shape: HeaderShape,
    pub columns: Vec<ClassifiedColumn>,
}

impl SheetLayout {
    pub fn identifying_columns(&self) -> impl Iterator<Item = &ClassifiedColumn> {
        self.columns.iter().filter(|c| !c.is_rate())
    }

    pub fn rate_columns(&self) -> impl Iterator<Item = &ClassifiedColumn> {
        self.columns.iter().filter(|c| c.is_rate())
    }

    pub fn identifying_column(&self, name: &str) -> Option<&ClassifiedColumn> {
        self.identifying_columns()
            .find(|c| c.identifying_name() == Some(name))
    }
}

fn is_identifying_name(name: &str) -> bool {
    IDENTIFYING_COLUMNS.contains(&name)
}

fn is_placeholder(cell: &Cell) -> bool {
    match cell {
        None => true,
        Some(text) => text.starts_with(PLACEHOLDER_PREFIX),
    }
}

/// First four-digit year (1900..=2100) found in a header such as "2020 Preferential"
pub fn year_token(header: &str) -> Option<String> {
    header
        .split(|c: char| !c.is_ascii_digit())
        .filter(|token| token.len() == 4)
        .filter_map(|token| token.parse::<i32>().ok())
        .find(|year| (1900..=2100).contains(year))
        .map(|year| year.to_string())
}

/// Outer header labels after deduplication, in first-seen order
fn keep_list<'a>(labels: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut keep: Vec<&str> = Vec::new();
    for label in labels {
        if (is_identifying_name(label) || label.contains(RATE_MARKER)) && !keep.contains(&label) {
            keep.push(label);
        }
    }
    keep
}

/// Merged header cells leave blanks to the right of the label
fn forward_fill(row: &[Cell]) -> Vec<Cell> {
    let mut last: Cell = None;
    row.iter()
        .map(|cell| {
            if cell.is_some() {
                last = cell.clone();
            }
            last.clone()
        })
        .collect()
}

// =============================================================================
// CLASSIFIERS
// =============================================================================

/// Classify a two-level header. `Err` carries the reason the header does not
/// fit, which is a signal to try the single-row shape.
pub fn classify_two_level(
    outer: &[Cell],
    inner: &[Cell],
) -> Result<Vec<ClassifiedColumn>, String> {
    let outer = forward_fill(outer);
    let keep = keep_list(outer.iter().flatten().map(String::as_str));

    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut columns = Vec::new();
    let mut inner_year_labels: Vec<String> = Vec::new();

    for (index, label) in outer.iter().enumerate() {
        let Some(label) = label.as_deref() else {
            continue;
        };
        if !keep.contains(&label) {
            continue;
        }

        let inner_cell = inner.get(index).cloned().flatten();
        let placeholder = is_placeholder(&inner_cell);

        let (role, key) = if label.contains(RATE_MARKER) {
            let year_label = if placeholder {
                year_token(label)
            } else {
                let inner_label = inner_cell.unwrap_or_default();
                // An outer label that already names its year has no year row below it
                if year_token(label).is_some() {
                    return Err(format!(
                        "rate column '{}' carries its year but has second-row value '{}'",
                        label, inner_label
                    ));
                }
                inner_year_labels.push(inner_label.clone());
                Some(inner_label)
            };
            let key = year_label.clone().unwrap_or_default();
            (ColumnRole::Rate { year_label }, key)
        } else {
            if !placeholder {
                return Err(format!(
                    "identifying column '{}' has second-row value '{}'",
                    label,
                    inner_cell.unwrap_or_default()
                ));
            }
            (ColumnRole::Identifying(label.to_string()), String::new())
        };

        // A repeated (label, year) pair would duplicate melt keys
        if !seen.insert((label.to_string(), key)) {
            continue;
        }

        columns.push(ClassifiedColumn {
            index,
            header: label.to_string(),
            role,
        });
    }

    if !columns.iter().any(ClassifiedColumn::is_rate) {
        return Err(format!("no header contains '{}'", RATE_MARKER));
    }

    if !inner_year_labels.is_empty()
        && !inner_year_labels.iter().any(|l| year_token(l).is_some())
    {
        return Err(format!(
            "second-row rate labels {:?} hold no year",
            inner_year_labels
        ));
    }

    Ok(columns)
}

/// Classify a single header row. Repeated names keep their first column.
pub fn classify_single_row(header: &[Cell]) -> Result<Vec<ClassifiedColumn>, String> {
    let keep = keep_list(header.iter().flatten().map(String::as_str));

    let mut taken: HashSet<&str> = HashSet::new();
    let mut columns = Vec::new();

    for (index, label) in header.iter().enumerate() {
        let Some(label) = label.as_deref() else {
            continue;
        };
        if !keep.contains(&label) || !taken.insert(label) {
            continue;
        }

        let role = if label.contains(RATE_MARKER) {
            ColumnRole::Rate {
                year_label: year_token(label),
            }
        } else {
            ColumnRole::Identifying(label.to_string())
        };

        columns.push(ClassifiedColumn {
            index,
            header: label.to_string(),
            role,
        });
    }

    if !columns.iter().any(ClassifiedColumn::is_rate) {
        return Err(format!("no header contains '{}'", RATE_MARKER));
    }

    Ok(columns)
}

/// Detect the layout of a sheet: two-level header first, single-row second
pub fn detect_layout(sheet: &RawSheet) -> Result<SheetLayout, SheetParseError> {
    let two_level = if sheet.rows.len() < 2 {
        Err("fewer than two rows".to_string())
    } else {
        classify_two_level(&sheet.header_row(0), &sheet.header_row(1))
    };

    let two_level_reason = match two_level {
        Ok(columns) => {
            return Ok(SheetLayout {
                shape: HeaderShape::TwoLevel,
                columns,
            })
        }
        Err(reason) => reason,
    };

    debug!(
        sheet = %sheet.name,
        reason = %two_level_reason,
        "two-level header does not fit, trying single-row header"
    );

    if sheet.rows.is_empty() {
        return Err(SheetParseError::new(&sheet.name, "sheet is empty"));
    }

    match classify_single_row(&sheet.header_row(0)) {
        Ok(columns) => Ok(SheetLayout {
            shape: HeaderShape::SingleRow,
            columns,
        }),
        Err(reason) => Err(SheetParseError::new(
            &sheet.name,
            format!(
                "two-level header: {}; single-row header: {}",
                two_level_reason, reason
            ),
        )),
    }
}
