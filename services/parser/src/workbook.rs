//! Workbook driver - metadata sheet, preferential sheet discovery, per-sheet pipeline
//!
//! Reading happens once in `LoadedWorkbook::open`; everything after that works
//! on in-memory sheets.

use calamine::{open_workbook_auto, Reader};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{ExtractError, PreferentialFailure, PreferentialParseError};
use crate::record::{assemble, TariffRecord};
use crate::reference::ReferenceData;
use crate::reshape::reshape_sheet;
use crate::resolver::{Resolver, SheetContext};
use crate::schema::{RATE_MARKER, REPORTER_COLUMN};
use crate::sheet::RawSheet;

/// Metadata labels naming the agreement
pub const AGREEMENT_LABELS: &[&str] = &["RTA", "FTA", "Agreement", "PTA"];
/// Metadata label naming the reporting country (absent in older files)
pub const COUNTRY_LABEL: &str = "Country";

const METADATA_LABEL_COLUMN: usize = 0;
const METADATA_VALUE_COLUMN: usize = 2;

/// Agreement-level facts read from the metadata sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkbookMetadata {
    pub agreement_name: String,
    pub declared_country: Option<String>,
}

/// Behaviour switches for workbook extraction
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkbookOptions {
    /// Return an empty record set instead of failing when the workbook has
    /// no preferential sheet
    pub allow_empty: bool,
}

/// All sheets of one workbook, in workbook order
#[derive(Debug, Clone)]
pub struct LoadedWorkbook {
    pub name: String,
    pub sheets: Vec<RawSheet>,
}

impl LoadedWorkbook {
    pub fn new(name: impl Into<String>, sheets: Vec<RawSheet>) -> Self {
        Self {
            name: name.into(),
            sheets,
        }
    }

    /// Read every sheet (xls, xlsx, xlsb, ods)
    pub fn open(path: &Path) -> Result<Self, ExtractError> {
        let workbook_error = |source: calamine::Error| ExtractError::Workbook {
            path: path.to_path_buf(),
            source,
        };

        let mut workbook = open_workbook_auto(path).map_err(workbook_error)?;
        let sheet_names = workbook.sheet_names().to_vec();

        let mut sheets = Vec::with_capacity(sheet_names.len());
        for sheet_name in &sheet_names {
            let range = workbook.worksheet_range(sheet_name).map_err(workbook_error)?;
            sheets.push(RawSheet::from_range(sheet_name.as_str(), &range));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        debug!(workbook = %name, sheets = sheets.len(), "workbook loaded");
        Ok(Self::new(name, sheets))
    }

    /// Sheets whose name, or any first-row header, carries the marker
    pub fn preferential_sheets(&self) -> Vec<&RawSheet> {
        self.sheets
            .iter()
            .filter(|sheet| {
                sheet.name.contains(RATE_MARKER)
                    || sheet
                        .rows
                        .first()
                        .map(|header| header.iter().flatten().any(|h| h.contains(RATE_MARKER)))
                        .unwrap_or(false)
            })
            .collect()
    }
}

/// Read agreement name and declared country from the first sheet, laid out
/// as `label | separator | value` rows
pub fn read_metadata(workbook: &LoadedWorkbook) -> Result<WorkbookMetadata, ExtractError> {
    let metadata_error = |reason: &str| ExtractError::Metadata {
        workbook: workbook.name.clone(),
        reason: reason.to_string(),
    };

    let sheet = workbook
        .sheets
        .first()
        .ok_or_else(|| metadata_error("workbook has no sheets"))?;

    let value_for = |labels: &[&str]| -> Option<String> {
        (0..sheet.rows.len())
            .find(|&row| {
                sheet
                    .cell(row, METADATA_LABEL_COLUMN)
                    .map(|label| labels.contains(&label.trim()))
                    .unwrap_or(false)
            })
            .and_then(|row| sheet.cell(row, METADATA_VALUE_COLUMN))
            .map(|value| value.trim().to_string())
    };

    let agreement_name = value_for(AGREEMENT_LABELS).ok_or_else(|| {
        metadata_error(&format!(
            "no agreement value under any of {:?} in sheet '{}'",
            AGREEMENT_LABELS, sheet.name
        ))
    })?;
    let declared_country = value_for(&[COUNTRY_LABEL]);

    Ok(WorkbookMetadata {
        agreement_name,
        declared_country,
    })
}

/// Run one preferential sheet through reshape, resolution and assembly
pub fn extract_sheet(
    sheet: &RawSheet,
    metadata: &WorkbookMetadata,
    resolver: &Resolver<'_>,
) -> Result<Vec<TariffRecord>, ExtractError> {
    let reshaped = reshape_sheet(sheet)?;

    let ctx = SheetContext {
        sheet_name: &sheet.name,
        agreement_name: &metadata.agreement_name,
        declared_country: metadata.declared_country.as_deref(),
    };
    let (reporter, partner) = resolver.resolve(&ctx, reshaped.first_value(REPORTER_COLUMN))?;

    Ok(assemble(&reshaped, &reporter, &partner, &metadata.agreement_name))
}

/// Extract all preferential records of a workbook
pub fn extract_workbook(
    workbook: &LoadedWorkbook,
    reference: &ReferenceData,
    options: WorkbookOptions,
) -> Result<Vec<TariffRecord>, ExtractError> {
    let sheets = workbook.preferential_sheets();

    if sheets.is_empty() {
        if options.allow_empty {
            warn!(workbook = %workbook.name, "no preferential sheet found, returning no records");
            return Ok(Vec::new());
        }
        return Err(PreferentialParseError::new(PreferentialFailure::NoPreferentialSheet).into());
    }

    let metadata = read_metadata(workbook)?;
    info!(
        workbook = %workbook.name,
        agreement = %metadata.agreement_name,
        country = metadata.declared_country.as_deref().unwrap_or("-"),
        sheets = sheets.len(),
        "extracting workbook"
    );

    let resolver = Resolver::new(reference);
    let mut records = Vec::new();
    for sheet in sheets {
        let sheet_records = extract_sheet(sheet, &metadata, &resolver)?;
        debug!(sheet = %sheet.name, records = sheet_records.len(), "sheet extracted");
        records.extend(sheet_records);
    }

    if records.is_empty() && !options.allow_empty {
        return Err(PreferentialParseError::new(PreferentialFailure::NoPreferentialContent)
            .with_agreement(&metadata.agreement_name)
            .into());
    }

    Ok(records)
}
