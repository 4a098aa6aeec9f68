//! Reference tables - country identities and economic blocks
//!
//! Loaded once per process and shared read-only afterwards. Every lookup is a
//! case-sensitive exact match against one alias set.

use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Range, Reader};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::sheet::cell_text;

/// Economic blocks recognized when no configuration overrides them
pub const DEFAULT_ECONOMIC_BLOCKS: &[&str] = &[
    "EU", // European Union
    "European Union",
    "SACU",              // Southern African Customs Union
    "Trans-Pacific SEP", // Trans-Pacific Strategic Economic Partnership Agreement
    "CAFTA",             // Central America Free Trade Agreement
    "Agadir Agreement",
    "EFTA",
    "EAEU", // Eurasian Economic Union
    "MERCOSUR",
    "ASEAN",
];

// Reference table column names (matched after trimming)
pub const COL_FULL_NAME: &str = "Country Name, Full";
pub const COL_ABBREVIATION: &str = "Country Name, Abbreviation";
pub const COL_OTHER_NAME: &str = "Country Name, Other";
pub const COL_OTHER_ABBREVIATION: &str = "Country Name, Other Abbreviation";
pub const COL_CODE: &str = "Country Code";
pub const COL_ISO3: &str = "ISO3-digit Alpha";

// =============================================================================
// IDENTITIES
// =============================================================================

/// Canonical country identity with all of its aliases
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryIdentity {
    pub canonical_name: String,
    pub numeric_code: i32,
    pub full_names: Vec<String>,
    pub abbreviations: Vec<String>,
    pub other_names: Vec<String>,
    pub other_abbreviations: Vec<String>,
    pub iso3_codes: Vec<String>,
}

impl CountryIdentity {
    /// Identity whose only alias is its full name
    pub fn new(canonical_name: impl Into<String>, numeric_code: i32) -> Self {
        let canonical_name = canonical_name.into();
        Self {
            full_names: vec![canonical_name.clone()],
            canonical_name,
            numeric_code,
            abbreviations: Vec::new(),
            other_names: Vec::new(),
            other_abbreviations: Vec::new(),
            iso3_codes: Vec::new(),
        }
    }

    pub fn with_abbreviation(mut self, alias: impl Into<String>) -> Self {
        self.abbreviations.push(alias.into());
        self
    }

    pub fn with_other_name(mut self, alias: impl Into<String>) -> Self {
        self.other_names.push(alias.into());
        self
    }

    pub fn with_other_abbreviation(mut self, alias: impl Into<String>) -> Self {
        self.other_abbreviations.push(alias.into());
        self
    }

    pub fn with_iso3(mut self, alias: impl Into<String>) -> Self {
        self.iso3_codes.push(alias.into());
        self
    }

    fn aliases(&self, kind: AliasKind) -> &[String] {
        match kind {
            AliasKind::FullName => &self.full_names,
            AliasKind::Abbreviation => &self.abbreviations,
            AliasKind::OtherName => &self.other_names,
            AliasKind::OtherAbbreviation => &self.other_abbreviations,
            AliasKind::Iso3 => &self.iso3_codes,
        }
    }
}

/// Multi-country entity, known by name only
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EconomicBlock {
    pub name: String,
}

impl EconomicBlock {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A resolved reporter or partner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Party {
    Country(Arc<CountryIdentity>),
    Block(Arc<EconomicBlock>),
}

impl Party {
    pub fn name(&self) -> &str {
        match self {
            Party::Country(country) => &country.canonical_name,
            Party::Block(block) => &block.name,
        }
    }

    /// Numeric code; economic blocks have none
    pub fn code(&self) -> Option<i32> {
        match self {
            Party::Country(country) => Some(country.numeric_code),
            Party::Block(_) => None,
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(self, Party::Block(_))
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code() {
            Some(code) => write!(f, "{} ({})", self.name(), code),
            None => write!(f, "{}", self.name()),
        }
    }
}

/// The alias sets of a country identity, in no particular priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AliasKind {
    FullName,
    Abbreviation,
    OtherName,
    OtherAbbreviation,
    Iso3,
}

// =============================================================================
// REFERENCE DATA
// =============================================================================

/// Indexed, immutable view over all known countries and economic blocks
#[derive(Debug, Default)]
pub struct ReferenceData {
    countries: Vec<Arc<CountryIdentity>>,
    alias_index: HashMap<AliasKind, HashMap<String, usize>>,
    code_index: HashMap<i32, usize>,
    blocks: HashMap<String, Arc<EconomicBlock>>,
}

impl ReferenceData {
    /// Build the lookup indexes. When two identities share an alias, the
    /// first one listed keeps it.
    pub fn new<I, S>(countries: Vec<CountryIdentity>, blocks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut alias_index: HashMap<AliasKind, HashMap<String, usize>> = HashMap::new();
        let mut code_index = HashMap::new();

        for (idx, country) in countries.iter().enumerate() {
            for kind in [
                AliasKind::FullName,
                AliasKind::Abbreviation,
                AliasKind::OtherName,
                AliasKind::OtherAbbreviation,
                AliasKind::Iso3,
            ] {
                let index = alias_index.entry(kind).or_default();
                for alias in country.aliases(kind) {
                    if let Some(&existing) = index.get(alias) {
                        if existing != idx {
                            debug!(
                                alias = %alias,
                                ?kind,
                                kept = %countries[existing].canonical_name,
                                dropped = %country.canonical_name,
                                "duplicate alias in reference table"
                            );
                        }
                        continue;
                    }
                    index.insert(alias.clone(), idx);
                }
            }
            code_index.entry(country.numeric_code).or_insert(idx);
        }

        let blocks = blocks
            .into_iter()
            .map(|name| {
                let block = EconomicBlock::new(name);
                (block.name.clone(), Arc::new(block))
            })
            .collect();

        Self {
            countries: countries.into_iter().map(Arc::new).collect(),
            alias_index,
            code_index,
            blocks,
        }
    }

    pub fn country_count(&self) -> usize {
        self.countries.len()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Exact match of `token` against one alias set
    pub fn lookup(&self, kind: AliasKind, token: &str) -> Option<&Arc<CountryIdentity>> {
        self.alias_index
            .get(&kind)
            .and_then(|index| index.get(token))
            .map(|&idx| &self.countries[idx])
    }

    pub fn by_code(&self, code: i32) -> Option<&Arc<CountryIdentity>> {
        self.code_index.get(&code).map(|&idx| &self.countries[idx])
    }

    pub fn block(&self, token: &str) -> Option<&Arc<EconomicBlock>> {
        self.blocks.get(token)
    }
}

// =============================================================================
// LOADING
// =============================================================================

/// Load the country table from a spreadsheet (first sheet) or a CSV file
pub fn load_reference_table<I, S>(path: &Path, blocks: I) -> Result<ReferenceData>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    info!(path = %path.display(), "loading reference table");

    let is_csv = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);

    let countries = if is_csv {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read reference table {}", path.display()))?;
        countries_from_csv(&bytes)?
    } else {
        let (headers, rows) = read_first_sheet(path)?;
        countries_from_rows(&headers, &rows)?
    };

    let reference = ReferenceData::new(countries, blocks);
    info!(
        countries = reference.country_count(),
        blocks = reference.block_count(),
        "reference table loaded"
    );
    Ok(reference)
}

fn read_first_sheet(path: &Path) -> Result<(Vec<String>, Vec<Vec<Option<String>>>)> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open reference table {}", path.display()))?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .context("Reference table has no sheets")?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .with_context(|| format!("Failed to read sheet '{}'", sheet_name))?;
    table_from_range(&range)
}

/// Split a sheet range into trimmed header names and data rows
fn table_from_range(range: &Range<Data>) -> Result<(Vec<String>, Vec<Vec<Option<String>>>)> {
    let mut rows = range.rows();
    let headers = rows
        .next()
        .context("Reference table has no header row")?
        .iter()
        .map(|cell| cell_text(cell).unwrap_or_default())
        .collect();
    let rows = rows
        .map(|row| row.iter().map(cell_text).collect())
        .collect();
    Ok((headers, rows))
}

/// Parse CSV bytes; input that is not UTF-8 is read as Windows-1252
pub fn countries_from_csv(bytes: &[u8]) -> Result<Vec<CountryIdentity>> {
    let content = match std::str::from_utf8(bytes) {
        Ok(text) => std::borrow::Cow::Borrowed(text),
        Err(_) => {
            warn!("reference table is not UTF-8, decoding as Windows-1252");
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded
        }
    };
    let content = content.strip_prefix('\u{feff}').unwrap_or(&content);

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .context("Failed to read CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for (line_idx, result) in reader.records().enumerate() {
        let record =
            result.with_context(|| format!("CSV parse error at line {}", line_idx + 2))?;
        rows.push(
            record
                .iter()
                .map(|field| {
                    let field = field.trim();
                    (!field.is_empty()).then(|| field.to_string())
                })
                .collect(),
        );
    }

    countries_from_rows(&headers, &rows)
}

/// Build identities from a header row plus data rows
pub fn countries_from_rows(
    headers: &[String],
    rows: &[Vec<Option<String>>],
) -> Result<Vec<CountryIdentity>> {
    let column = |name: &str| -> Result<usize> {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .with_context(|| {
                format!(
                    "Reference table is missing column '{}'. Headers: {:?}",
                    name, headers
                )
            })
    };

    let full_col = column(COL_FULL_NAME)?;
    let abbr_col = column(COL_ABBREVIATION)?;
    let other_col = column(COL_OTHER_NAME)?;
    let other_abbr_col = column(COL_OTHER_ABBREVIATION)?;
    let code_col = column(COL_CODE)?;
    let iso3_col = column(COL_ISO3)?;

    let get = |row: &[Option<String>], col: usize| -> Option<String> {
        row.get(col).cloned().flatten()
    };

    let mut countries = Vec::with_capacity(rows.len());
    let mut skipped = 0;

    for (row_idx, row) in rows.iter().enumerate() {
        let Some(name) = get(row, full_col) else {
            skipped += 1;
            continue;
        };
        let Some(code) = get(row, code_col).as_deref().and_then(parse_code) else {
            warn!(row = row_idx + 2, country = %name, "reference row has no usable country code");
            skipped += 1;
            continue;
        };

        let mut country = CountryIdentity::new(name, code);
        country.abbreviations.extend(get(row, abbr_col));
        country.other_names.extend(get(row, other_col));
        country.other_abbreviations.extend(get(row, other_abbr_col));
        country.iso3_codes.extend(get(row, iso3_col));
        countries.push(country);
    }

    if skipped > 0 {
        debug!(skipped, "reference rows skipped");
    }

    Ok(countries)
}

/// Integer code, also accepting integral floats such as "842.0"
pub fn parse_code(text: &str) -> Option<i32> {
    let text = text.trim();
    if let Ok(code) = text.parse::<i32>() {
        return Some(code);
    }
    match text.parse::<f64>() {
        Ok(f) if f.fract() == 0.0 && f >= i32::MIN as f64 && f <= i32::MAX as f64 => Some(f as i32),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_reference() -> ReferenceData {
        ReferenceData::new(
            vec![
                CountryIdentity::new("United States", 842)
                    .with_abbreviation("USA")
                    .with_iso3("USA"),
                CountryIdentity::new("Chile", 152).with_iso3("CHL"),
            ],
            DEFAULT_ECONOMIC_BLOCKS.iter().copied(),
        )
    }

    #[test]
    fn test_lookup_by_alias_kind() {
        let reference = sample_reference();
        let usa = reference.lookup(AliasKind::Abbreviation, "USA").unwrap();
        assert_eq!(usa.canonical_name, "United States");
        assert_eq!(usa.numeric_code, 842);
        assert!(reference.lookup(AliasKind::FullName, "USA").is_none());
        assert_eq!(
            reference.lookup(AliasKind::Iso3, "CHL").unwrap().canonical_name,
            "Chile"
        );
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let reference = sample_reference();
        assert!(reference.lookup(AliasKind::FullName, "chile").is_none());
        assert!(reference.block("Efta").is_none());
        assert!(reference.block("EFTA").is_some());
    }

    #[test]
    fn test_duplicate_alias_first_wins() {
        let reference = ReferenceData::new(
            vec![
                CountryIdentity::new("Korea, Rep.", 410).with_abbreviation("Korea"),
                CountryIdentity::new("Korea, Dem. Rep.", 408).with_abbreviation("Korea"),
            ],
            Vec::<String>::new(),
        );
        assert_eq!(
            reference.lookup(AliasKind::Abbreviation, "Korea").unwrap().numeric_code,
            410
        );
    }

    #[test]
    fn test_by_code() {
        let reference = sample_reference();
        assert_eq!(reference.by_code(152).unwrap().canonical_name, "Chile");
        assert!(reference.by_code(999).is_none());
    }

    #[test]
    fn test_parse_code_variants() {
        assert_eq!(parse_code("842"), Some(842));
        assert_eq!(parse_code(" 842 "), Some(842));
        assert_eq!(parse_code("842.0"), Some(842));
        assert_eq!(parse_code("842.5"), None);
        assert_eq!(parse_code("USA"), None);
    }

    #[test]
    fn test_countries_from_csv_trims_headers() {
        let csv = "Country Code,\"Country Name, Full \",\"Country Name, Abbreviation\",\"Country Name, Other\",\"Country Name, Other Abbreviation\",ISO3-digit Alpha\n\
                   842,United States,USA,,,USA\n\
                   152,Chile,,,,CHL\n";

        let countries = countries_from_csv(csv.as_bytes()).unwrap();
        assert_eq!(countries.len(), 2);
        assert_eq!(countries[0].canonical_name, "United States");
        assert_eq!(countries[0].abbreviations, vec!["USA".to_string()]);
        assert!(countries[0].other_names.is_empty());
        assert_eq!(countries[1].iso3_codes, vec!["CHL".to_string()]);
    }

    #[test]
    fn test_countries_from_csv_windows_1252() {
        let mut bytes = b"\"Country Name, Full\",\"Country Name, Abbreviation\",\"Country Name, Other\",\"Country Name, Other Abbreviation\",Country Code,ISO3-digit Alpha\n".to_vec();
        // "Côte d'Ivoire" with 0xF4 for 'ô'
        bytes.extend_from_slice(b"C\xF4te d'Ivoire,,,,384,CIV\n");

        let countries = countries_from_csv(&bytes).unwrap();
        assert_eq!(countries[0].canonical_name, "Côte d'Ivoire");
        assert_eq!(countries[0].numeric_code, 384);
    }

    #[test]
    fn test_missing_column_fails() {
        let csv = "\"Country Name, Full\",Country Code\nChile,152\n";
        let err = countries_from_csv(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("missing column"));
    }

    #[test]
    fn test_rows_without_code_are_skipped() {
        let headers: Vec<String> = [
            COL_FULL_NAME,
            COL_ABBREVIATION,
            COL_OTHER_NAME,
            COL_OTHER_ABBREVIATION,
            COL_CODE,
            COL_ISO3,
        ]
        .iter()
        .map(|h| h.to_string())
        .collect();
        let rows = vec![
            vec![Some("Chile".to_string()), None, None, None, Some("152".to_string()), None],
            vec![Some("Nowhere".to_string()), None, None, None, None, None],
            vec![None, None, None, None, Some("1".to_string()), None],
        ];
        let countries = countries_from_rows(&headers, &rows).unwrap();
        assert_eq!(countries.len(), 1);
        assert_eq!(countries[0].canonical_name, "Chile");
    }

    #[test]
    fn test_spreadsheet_reference_table() {
        let mut range: Range<Data> = Range::new((0, 0), (2, 5));
        let headers = [
            "Country Name, Full ",
            "Country Name, Abbreviation",
            "Country Name, Other",
            "Country Name, Other Abbreviation",
            "Country Code",
            "ISO3-digit Alpha",
        ];
        for (col, header) in headers.iter().enumerate() {
            range.set_value((0, col as u32), Data::String(header.to_string()));
        }
        range.set_value((1, 0), Data::String("United States".to_string()));
        range.set_value((1, 1), Data::String("USA".to_string()));
        range.set_value((1, 4), Data::Float(842.0));
        range.set_value((1, 5), Data::String("USA".to_string()));
        range.set_value((2, 0), Data::String("Chile".to_string()));
        range.set_value((2, 4), Data::Int(152));
        range.set_value((2, 5), Data::String("CHL".to_string()));

        let (headers, rows) = table_from_range(&range).unwrap();
        assert_eq!(headers[0], "Country Name, Full");
        let countries = countries_from_rows(&headers, &rows).unwrap();
        let reference = ReferenceData::new(countries, DEFAULT_ECONOMIC_BLOCKS.iter().copied());

        assert_eq!(reference.country_count(), 2);
        assert_eq!(reference.lookup(AliasKind::Abbreviation, "USA").unwrap().numeric_code, 842);
        assert_eq!(reference.by_code(152).unwrap().iso3_codes, vec!["CHL".to_string()]);
    }

    #[test]
    fn test_empty_range_has_no_header_row() {
        let range: Range<Data> = Range::empty();
        assert!(table_from_range(&range).is_err());
    }

    #[test]
    fn test_party_accessors() {
        let reference = sample_reference();
        let chile = Party::Country(reference.by_code(152).unwrap().clone());
        let efta = Party::Block(reference.block("EFTA").unwrap().clone());
        assert_eq!(chile.name(), "Chile");
        assert_eq!(chile.code(), Some(152));
        assert_eq!(efta.code(), None);
        assert!(efta.is_block());
        assert_eq!(chile.to_string(), "Chile (152)");
    }
}
