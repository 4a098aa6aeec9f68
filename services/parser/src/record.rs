//! Tariff records - the flat output unit, and its CSV form

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;

use crate::reference::Party;
use crate::reshape::{ReshapedSheet, TariffYear};
use crate::schema::{TARIFF_LINE_COLUMN, TARIFF_LINE_STATUS_COLUMN};

/// One (tariff line, year) rate between a reporter and a partner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TariffRecord {
    pub tariff_line: Option<String>,
    pub tariff_line_status: Option<String>,
    pub year: Option<TariffYear>,
    /// Raw cell text; never parsed, cells may carry annotations
    pub tariff_rate: Option<String>,
    pub reporter: Party,
    pub partner: Party,
    pub agreement_name: String,
    pub source_sheet: String,
}

/// Cross the reshaped rows of a sheet with its resolved parties
pub fn assemble(
    reshaped: &ReshapedSheet,
    reporter: &Party,
    partner: &Party,
    agreement_name: &str,
) -> Vec<TariffRecord> {
    reshaped
        .rows
        .iter()
        .map(|row| TariffRecord {
            tariff_line: reshaped.value(row, TARIFF_LINE_COLUMN).map(str::to_string),
            tariff_line_status: reshaped
                .value(row, TARIFF_LINE_STATUS_COLUMN)
                .map(str::to_string),
            year: row.year.clone(),
            tariff_rate: row.tariff.clone(),
            reporter: reporter.clone(),
            partner: partner.clone(),
            agreement_name: agreement_name.to_string(),
            source_sheet: reshaped.sheet.clone(),
        })
        .collect()
}

/// Output columns, in order
pub const RECORD_COLUMNS: &[&str] = &[
    "TL",
    "TLS",
    "Tariff_Year",
    "Tariff",
    "Reporter",
    "Reporter_Code",
    "Partner",
    "Partner_Code",
    "RTA",
    "Sheet",
];

/// Serialized shape of a record; field names follow `RECORD_COLUMNS`
#[derive(Debug, Serialize)]
pub struct RecordRow<'a> {
    #[serde(rename = "TL")]
    pub tariff_line: Option<&'a str>,
    #[serde(rename = "TLS")]
    pub tariff_line_status: Option<&'a str>,
    #[serde(rename = "Tariff_Year")]
    pub year: Option<&'a TariffYear>,
    #[serde(rename = "Tariff")]
    pub tariff: Option<&'a str>,
    #[serde(rename = "Reporter")]
    pub reporter: &'a str,
    #[serde(rename = "Reporter_Code")]
    pub reporter_code: Option<i32>,
    #[serde(rename = "Partner")]
    pub partner: &'a str,
    #[serde(rename = "Partner_Code")]
    pub partner_code: Option<i32>,
    #[serde(rename = "RTA")]
    pub agreement: &'a str,
    #[serde(rename = "Sheet")]
    pub sheet: &'a str,
}

impl TariffRecord {
    pub fn row(&self) -> RecordRow<'_> {
        RecordRow {
            tariff_line: self.tariff_line.as_deref(),
            tariff_line_status: self.tariff_line_status.as_deref(),
            year: self.year.as_ref(),
            tariff: self.tariff_rate.as_deref(),
            reporter: self.reporter.name(),
            reporter_code: self.reporter.code(),
            partner: self.partner.name(),
            partner_code: self.partner.code(),
            agreement: &self.agreement_name,
            sheet: &self.source_sheet,
        }
    }
}

/// Write records as CSV with a header row, also when there are no records
pub fn write_csv<W: Write>(records: &[TariffRecord], writer: W) -> Result<()> {
    let mut csv = csv::WriterBuilder::new().has_headers(true).from_writer(writer);
    if records.is_empty() {
        csv.write_record(RECORD_COLUMNS)
            .context("Failed to write CSV header")?;
    }
    for record in records {
        csv.serialize(record.row())
            .context("Failed to serialize tariff record")?;
    }
    csv.flush().context("Failed to flush CSV output")?;
    Ok(())
}
