//! Sheet reshaping - wide year-keyed matrix to long (tariff line, year, rate) rows

use serde::Serialize;
use std::fmt;
use tracing::debug;

use crate::error::{ExtractError, PreferentialFailure, PreferentialParseError, SheetParseError};
use crate::schema::{detect_layout, ClassifiedColumn, HeaderShape, SheetLayout, YEAR_COLUMN};
use crate::sheet::{Cell, RawSheet};

pub const TARIFF_YEAR_COLUMN: &str = "Tariff_Year";
pub const TARIFF_COLUMN: &str = "Tariff";

/// Rate cell content that stands for "no value"
pub const MISSING_MARKER: &str = "*";

/// Year label of a long row. Labels that are not integral stay text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TariffYear {
    Year(i32),
    Label(String),
}

impl TariffYear {
    pub fn parse(label: &str) -> Self {
        let label = label.trim();
        match label.parse::<i32>() {
            Ok(year) => TariffYear::Year(year),
            Err(_) => TariffYear::Label(label.to_string()),
        }
    }
}

impl fmt::Display for TariffYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TariffYear::Year(year) => write!(f, "{}", year),
            TariffYear::Label(label) => write!(f, "{}", label),
        }
    }
}

/// One (tariff line, year) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongRow {
    /// Values of the held columns, aligned with `ReshapedSheet::id_columns`
    pub ids: Vec<Cell>,
    pub year: Option<TariffYear>,
    pub tariff: Cell,
}

/// Long-format rows of one sheet: `{identifying columns..., Tariff_Year, Tariff}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReshapedSheet {
    pub sheet: String,
    pub id_columns: Vec<String>,
    pub rows: Vec<LongRow>,
}

impl ReshapedSheet {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.id_columns.iter().position(|c| c == name)
    }

    /// Value of held column `name` in `row`
    pub fn value<'a>(&self, row: &'a LongRow, name: &str) -> Option<&'a str> {
        self.column_index(name)
            .and_then(|idx| row.ids.get(idx))
            .and_then(|cell| cell.as_deref())
    }

    /// First non-missing value of held column `name`
    pub fn first_value(&self, name: &str) -> Option<&str> {
        let idx = self.column_index(name)?;
        self.rows
            .iter()
            .find_map(|row| row.ids.get(idx).and_then(|cell| cell.as_deref()))
    }
}

/// A column pulled out of the grid, rate cells already cleaned
struct ColumnValues<'a> {
    column: &'a ClassifiedColumn,
    values: Vec<Cell>,
}

impl ColumnValues<'_> {
    fn is_empty(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }
}

fn clean_rate(cell: &Cell) -> Cell {
    match cell.as_deref() {
        Some(text) if text.trim() == MISSING_MARKER => None,
        _ => cell.clone(),
    }
}

/// Detect the layout of `sheet` and reshape it. Blank rows go first, so a
/// spacer row under the header is never read as a second header level.
pub fn reshape_sheet(sheet: &RawSheet) -> Result<ReshapedSheet, ExtractError> {
    let sheet = sheet.without_blank_rows();
    let layout = detect_layout(&sheet)?;
    reshape(&sheet, &layout)
}

/// Reshape `sheet` according to an already detected layout.
///
/// All rate columns carry a year label: melt, one row per (row, rate column).
/// A single rate column without a year label (or any single rate column under
/// a single-row header with a `Year` column) keeps the row count and copies
/// the `Year` value into `Tariff_Year`.
pub fn reshape(sheet: &RawSheet, layout: &SheetLayout) -> Result<ReshapedSheet, ExtractError> {
    let data: Vec<&[Cell]> = sheet.data_rows(layout.shape.header_rows()).collect();

    let mut columns: Vec<ColumnValues> = layout
        .columns
        .iter()
        .map(|column| {
            let values = data
                .iter()
                .map(|row| {
                    let cell = row.get(column.index).cloned().flatten();
                    if column.is_rate() {
                        clean_rate(&cell)
                    } else {
                        cell
                    }
                })
                .collect();
            ColumnValues { column, values }
        })
        .collect();

    // Columns left without a single value carry nothing
    if !data.is_empty() {
        let before = columns.len();
        columns.retain(|c| !c.is_empty());
        if columns.len() < before {
            debug!(sheet = %sheet.name, dropped = before - columns.len(), "dropped empty columns");
        }
    }

    let (ids, rates): (Vec<ColumnValues>, Vec<ColumnValues>) =
        columns.into_iter().partition(|c| !c.column.is_rate());

    if rates.is_empty() {
        return Err(PreferentialParseError::new(PreferentialFailure::NoPreferentialContent)
            .with_sheet(&sheet.name)
            .into());
    }

    let id_columns: Vec<String> = ids
        .iter()
        .filter_map(|c| c.column.identifying_name().map(str::to_string))
        .collect();
    let held = |row: usize| -> Vec<Cell> { ids.iter().map(|c| c.values[row].clone()).collect() };
    let year_column = ids
        .iter()
        .position(|c| c.column.identifying_name() == Some(YEAR_COLUMN));

    let unlabelled = rates.iter().filter(|c| c.column.year_label().is_none()).count();
    let copy_year = rates.len() == 1
        && (unlabelled == 1 || (layout.shape == HeaderShape::SingleRow && year_column.is_some()));

    let rows = if copy_year {
        let year_column = year_column.ok_or_else(|| {
            SheetParseError::new(
                &sheet.name,
                format!(
                    "rate column '{}' has no year label and there is no '{}' column",
                    rates[0].column.header, YEAR_COLUMN
                ),
            )
        })?;
        let rate = &rates[0];
        (0..data.len())
            .map(|row| LongRow {
                ids: held(row),
                year: ids[year_column].values[row].as_deref().map(TariffYear::parse),
                tariff: rate.values[row].clone(),
            })
            .collect()
    } else {
        if unlabelled > 0 {
            return Err(SheetParseError::new(
                &sheet.name,
                format!(
                    "{} of {} rate columns have no year label",
                    unlabelled,
                    rates.len()
                ),
            )
            .into());
        }
        let mut rows = Vec::with_capacity(data.len() * rates.len());
        for rate in &rates {
            let year = rate.column.year_label().map(TariffYear::parse);
            for row in 0..data.len() {
                rows.push(LongRow {
                    ids: held(row),
                    year: year.clone(),
                    tariff: rate.values[row].clone(),
                });
            }
        }
        rows
    };

    debug!(
        sheet = %sheet.name,
        rows = rows.len(),
        rate_columns = rates.len(),
        melted = !copy_year,
        "sheet reshaped"
    );

    Ok(ReshapedSheet {
        sheet: sheet.name.clone(),
        id_columns,
        rows,
    })
}
