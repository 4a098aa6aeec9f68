//! Raw sheet grid - the tabular form handed to the core
//!
//! Every cell is optional text. Numbers are rendered as text so tariff
//! annotations survive untouched; blank cells are `None`.

use calamine::{Data, Range};

pub type Cell = Option<String>;

/// Convert a calamine cell into optional text
pub fn cell_text(cell: &Data) -> Cell {
    let text = match cell {
        Data::Empty => return None,
        Data::String(s) => s.trim().to_string(),
        // Display drops the fractional part of integral floats (2020.0 -> "2020")
        other => other.to_string().trim().to_string(),
    };
    (!text.is_empty()).then_some(text)
}

/// A sheet as read from a workbook: name plus a rectangular-ish grid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSheet {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
}

impl RawSheet {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    pub fn from_range(name: impl Into<String>, range: &Range<Data>) -> Self {
        let rows = range
            .rows()
            .map(|row| row.iter().map(cell_text).collect())
            .collect();
        Self::new(name, rows)
    }

    /// Build a sheet from string literals; `""` is a blank cell
    pub fn from_text_rows(name: impl Into<String>, rows: &[&[&str]]) -> Self {
        let rows = rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| (!cell.is_empty()).then(|| cell.to_string()))
                    .collect()
            })
            .collect();
        Self::new(name, rows)
    }

    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .and_then(|c| c.as_deref())
    }

    /// Header row `idx`, padded to the sheet width
    pub fn header_row(&self, idx: usize) -> Vec<Cell> {
        let mut row = self.rows.get(idx).cloned().unwrap_or_default();
        row.resize(self.width(), None);
        row
    }

    /// Copy of the sheet with rows that are blank throughout removed, header
    /// rows included
    pub fn without_blank_rows(&self) -> Self {
        Self::new(
            self.name.clone(),
            self.rows
                .iter()
                .filter(|row| !is_blank_row(row))
                .cloned()
                .collect(),
        )
    }

    /// Data rows after `header_rows`, skipping rows that are blank throughout
    pub fn data_rows(&self, header_rows: usize) -> impl Iterator<Item = &[Cell]> {
        self.rows
            .iter()
            .skip(header_rows)
            .filter(|row| !is_blank_row(row))
            .map(Vec::as_slice)
    }
}

pub fn is_blank_row(row: &[Cell]) -> bool {
    row.iter().all(Option::is_none)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_text_numbers() {
        assert_eq!(cell_text(&Data::Float(2020.0)), Some("2020".to_string()));
        assert_eq!(cell_text(&Data::Float(5.5)), Some("5.5".to_string()));
        assert_eq!(cell_text(&Data::Int(842)), Some("842".to_string()));
    }

    #[test]
    fn test_cell_text_blank() {
        assert_eq!(cell_text(&Data::Empty), None);
        assert_eq!(cell_text(&Data::String("   ".to_string())), None);
        assert_eq!(
            cell_text(&Data::String(" 5% (a) ".to_string())),
            Some("5% (a)".to_string())
        );
    }

    #[test]
    fn test_data_rows_skip_blank_rows() {
        let sheet = RawSheet::from_text_rows(
            "Preferential",
            &[&["TL", "Year"], &["0101", "2020"], &["", ""], &["0102", "2020"]],
        );
        let rows: Vec<_> = sheet.data_rows(1).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][0].as_deref(), Some("0102"));
    }

    #[test]
    fn test_without_blank_rows_drops_spacers_under_header() {
        let sheet = RawSheet::from_text_rows(
            "S",
            &[&["TL", "Year"], &["", ""], &["0101", "2020"], &["", ""]],
        );
        let cleaned = sheet.without_blank_rows();
        assert_eq!(cleaned.name, "S");
        assert_eq!(cleaned.rows.len(), 2);
        assert_eq!(cleaned.cell(1, 0), Some("0101"));
    }

    #[test]
    fn test_from_range() {
        let mut range: Range<Data> = Range::new((0, 0), (2, 2));
        range.set_value((0, 0), Data::String("TL".to_string()));
        range.set_value((0, 2), Data::String("Preferential 2020".to_string()));
        range.set_value((1, 0), Data::String("0101".to_string()));
        range.set_value((1, 2), Data::Float(5.0));
        range.set_value((2, 2), Data::String(" * ".to_string()));

        let sheet = RawSheet::from_range("Chile_Mexico", &range);
        assert_eq!(sheet.rows.len(), 3);
        assert_eq!(sheet.width(), 3);
        assert_eq!(sheet.cell(0, 1), None);
        assert_eq!(sheet.cell(0, 2), Some("Preferential 2020"));
        assert_eq!(sheet.cell(1, 2), Some("5"));
        assert_eq!(sheet.cell(2, 2), Some("*"));
        assert_eq!(sheet.cell(2, 0), None);
    }

    #[test]
    fn test_header_row_is_padded() {
        let sheet = RawSheet::from_text_rows("S", &[&["TL"], &["0101", "2020", "5"]]);
        assert_eq!(sheet.width(), 3);
        assert_eq!(sheet.header_row(0), vec![Some("TL".to_string()), None, None]);
        assert_eq!(sheet.cell(1, 2), Some("5"));
        assert_eq!(sheet.cell(0, 2), None);
    }
}
