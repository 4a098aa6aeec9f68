//! Preferential tariff extraction from agreement workbooks
//!
//! Pipeline per workbook:
//! - `workbook` reads the metadata sheet and picks the preferential sheets
//! - `schema` classifies each sheet's header columns
//! - `reshape` turns the wide year-keyed matrix into long rows
//! - `resolver` names the reporter and partner against `reference`
//! - `record` crosses the two into flat tariff records
//!
//! Extraction is DETERMINISTIC: same workbook + same reference table = same
//! records, in the same order.

pub mod error;
pub mod record;
pub mod reference;
pub mod reshape;
pub mod resolver;
pub mod schema;
pub mod sheet;
pub mod workbook;

pub use error::{ErrorKind, ExtractError, PreferentialFailure, PreferentialParseError, SheetParseError};
pub use record::{write_csv, TariffRecord};
pub use reference::{load_reference_table, ReferenceData, DEFAULT_ECONOMIC_BLOCKS};
pub use reshape::TariffYear;
pub use workbook::{extract_workbook, LoadedWorkbook, WorkbookOptions};

/// Install the tracing subscriber shared by the service binaries.
/// `RUST_LOG` overrides the default filter.
pub fn init_tracing(default_filter: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    // A second call (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
