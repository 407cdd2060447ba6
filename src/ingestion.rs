use crate::error::Result;
use crate::grid::{CellValue, RawGrid};
use chrono::NaiveDate;
use log::debug;
use std::io::Read;
use std::path::Path;

/// Types one raw CSV field. Thousands-separated amounts stay text; the
/// engine's amount parser handles them.
pub fn parse_cell(raw: &str) -> CellValue {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return CellValue::Blank;
    }
    if let Ok(n) = trimmed.parse::<f64>() {
        if n.is_finite() {
            return CellValue::Number(n);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return CellValue::Date(date);
    }
    CellValue::Text(trimmed.to_string())
}

impl RawGrid {
    /// Reads a header-less CSV export into a cleaned grid.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            rows.push(record.iter().map(parse_cell).collect());
        }

        let grid = RawGrid::from_rows(rows);
        let cleaned = grid.cleaned();
        debug!(
            "Read {}x{} CSV grid ({}x{} after cleaning)",
            grid.height(),
            grid.width(),
            cleaned.height(),
            cleaned.width()
        );
        Ok(cleaned)
    }

    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(file)
    }
}
