use crate::locator::ColumnRole;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UtilizationError {
    #[error("Required column '{role}' not found in header rows {rows:?}")]
    MissingColumn { role: ColumnRole, rows: Vec<usize> },

    #[error("No month columns found in header rows {rows:?}")]
    NoMonthColumns { rows: Vec<usize> },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Reconciliation violation in {scope}: expected {expected}, got {actual}")]
    ReconciliationViolation {
        scope: String,
        expected: f64,
        actual: f64,
    },

    #[error("Invalid month pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, UtilizationError>;
