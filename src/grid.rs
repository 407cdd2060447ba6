//! Tagged cell model and the rectangular grid handed over by the spreadsheet reader.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    #[default]
    Blank,
    Number(f64),
    Text(String),
    Date(NaiveDate),
}

static BLANK: CellValue = CellValue::Blank;

impl CellValue {
    pub fn text(&self) -> String {
        match self {
            CellValue::Blank => String::new(),
            CellValue::Number(n) => {
                if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }

    /// Lowercased, trimmed text used by every keyword match.
    pub fn match_text(&self) -> String {
        self.text().to_lowercase()
    }

    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Blank => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(_) | CellValue::Date(_) => false,
        }
    }

    pub fn is_date(&self) -> bool {
        matches!(self, CellValue::Date(_))
    }

    /// Monetary reading of a cell. Never fails: anything unparseable is 0.0.
    pub fn amount(&self) -> Option<f64> {
        let value = match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => {
                let cleaned: String = s
                    .chars()
                    .filter(|c| *c != ',' && !c.is_whitespace())
                    .collect();
                if cleaned.is_empty() {
                    None
                } else {
                    cleaned.parse::<f64>().ok()
                }
            }
            CellValue::Blank | CellValue::Date(_) => None,
        };
        value.filter(|v| v.is_finite())
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        if value.trim().is_empty() {
            CellValue::Blank
        } else {
            CellValue::Text(value.to_string())
        }
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::from(value.as_str())
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(value: NaiveDate) -> Self {
        CellValue::Date(value)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "GridRows")]
pub struct RawGrid {
    rows: Vec<Vec<CellValue>>,
    width: usize,
}

/// Deserialized form. Any stored width is ignored and recomputed by padding.
#[derive(Deserialize)]
struct GridRows {
    rows: Vec<Vec<CellValue>>,
}

impl From<GridRows> for RawGrid {
    fn from(raw: GridRows) -> Self {
        RawGrid::from_rows(raw.rows)
    }
}

impl RawGrid {
    /// Builds a rectangular grid, padding short rows with blanks.
    pub fn from_rows(rows: Vec<Vec<CellValue>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, CellValue::Blank);
                row
            })
            .collect();
        Self { rows, width }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.width == 0
    }

    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&BLANK)
    }

    pub fn row(&self, row: usize) -> &[CellValue] {
        self.rows.get(row).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Row indices `0..n` clipped to the grid height.
    pub fn leading_rows(&self, n: usize) -> Vec<usize> {
        (0..n.min(self.height())).collect()
    }

    /// Drops fully-empty rows and columns, re-indexing contiguously from 0.
    pub fn cleaned(&self) -> Self {
        let keep_cols: Vec<usize> = (0..self.width)
            .filter(|&c| (0..self.height()).any(|r| !self.cell(r, c).is_blank()))
            .collect();

        let rows: Vec<Vec<CellValue>> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.iter().any(|cell| !cell.is_blank()))
            .map(|(i, _)| keep_cols.iter().map(|&c| self.cell(i, c).clone()).collect())
            .collect();

        let width = if rows.is_empty() { 0 } else { keep_cols.len() };
        Self { rows, width }
    }
}
