//! # Utilization Variance Builder
//!
//! A library for turning arbitrarily-shaped budget utilization spreadsheets
//! into a reconciled monthly time series of planned vs. actual spend.
//!
//! ## Core Concepts
//!
//! - **Raw Grid**: The cell matrix handed over by a spreadsheet reader, with no header row applied
//! - **Column Discovery**: Budget head, vendor/role, cost head and plan total columns are found by keyword in a small header window
//! - **Month Columns**: Month headers in any spelling ("Apr-25", "April 2025", "4/25") are normalized to `YYYY-MM` and tagged as plan, claims or external (D365) actuals
//! - **Budget Lines**: Rows are grouped by budget head (and vendor/role) and accumulated month by month
//! - **Reconciliation**: Line totals, monthly aggregates, cumulative series and grand totals always agree
//! - **Funding**: Optional funding tranches give a cash-flow view of cumulative planned spend
//!
//! ## Example
//!
//! ```rust,ignore
//! use utilization_variance_builder::*;
//!
//! let grid = RawGrid::from_rows(vec![
//!     vec!["Budget Head".into(), "Vendor/Role".into(), "Cost Head".into(),
//!          "Plan Apr-25".into(), "Claims Apr-25".into(), "D365 Apr-25".into()],
//!     vec!["Salaries".into(), "PM".into(), "Base Pay".into(),
//!          100000.0.into(), 40000.0.into(), 10000.0.into()],
//! ]);
//!
//! let report = process_utilization_sheet(&grid, &UtilizationConfig::default()).unwrap();
//! assert_eq!(report.budget_lines["Salaries - PM"].total_variance, 50000.0);
//! ```

pub mod engine;
pub mod error;
pub mod funding;
pub mod grid;
pub mod ingestion;
pub mod locator;
pub mod month;
pub mod month_columns;
pub mod reconcile;
pub mod report;
pub mod schema;
pub mod signals;
pub mod utils;

pub use engine::VarianceAggregator;
pub use error::{Result, UtilizationError};
pub use funding::{
    CostShare, FundingSchedule, FundingSummary, FundingTranche, DEFAULT_TOP_LINES,
};
pub use grid::{CellValue, RawGrid};
pub use ingestion::parse_cell;
pub use locator::{
    find_cell_by_role, find_column_by_role, locate_columns, CellRef, ColumnLayout, ColumnRole,
};
pub use month::{normalize_month, MonthKey, MonthNormalizer};
pub use month_columns::{
    classify_month_role, find_month_columns, DuplicateHeader, MonthColumnMap, MonthColumnSet,
    MonthRole,
};
pub use reconcile::{verify_reconciliation, ReconciliationChecker};
pub use report::{BudgetLine, CumulativeFigures, GrandTotals, MonthlyFigures, UtilizationReport};
pub use schema::{default_month_names, MonthName, RoleKeywords, UtilizationConfig};
pub use signals::{detect_cash_flow_deficits, detect_variance_signals, VarianceSignal};
pub use utils::*;

use log::{debug, info};

pub struct UtilizationProcessor;

impl UtilizationProcessor {
    pub fn process(grid: &RawGrid, config: &UtilizationConfig) -> Result<UtilizationReport> {
        config.validate()?;

        info!(
            "Processing utilization sheet: {} rows x {} columns",
            grid.height(),
            grid.width()
        );

        let header_rows = grid.leading_rows(config.header_search_rows);
        let layout = locate_columns(grid, config)?;

        let normalizer = MonthNormalizer::new(&config.month_names)?;
        let month_columns = find_month_columns(grid, &header_rows, &normalizer, &config.keywords);
        if month_columns.is_empty() {
            return Err(UtilizationError::NoMonthColumns { rows: header_rows });
        }
        debug!(
            "Found {} month(s), {} duplicate header(s) ignored",
            month_columns.len(),
            month_columns.duplicates.len()
        );

        let first_probe_row = month_columns
            .header_row
            .map_or(layout.last_header_row(), |row| row.max(layout.last_header_row()))
            + 1;

        let aggregator = VarianceAggregator::new(config);
        let data_start_row =
            aggregator.detect_data_start(grid, layout.budget_head.col, first_probe_row);
        debug!("Data rows start at row {}", data_start_row);

        let report = aggregator.aggregate(grid, &layout, &month_columns, data_start_row)?;

        info!(
            "Processed {} budget line(s) over {} month(s): planned {:.2}, spent {:.2}, variance {:.2}",
            report.budget_lines.len(),
            report.monthly_data.len(),
            report.grand_totals.total_planned,
            report.grand_totals.total_spent,
            report.grand_totals.total_variance
        );

        Ok(report)
    }

    pub fn process_with_verification(
        grid: &RawGrid,
        config: &UtilizationConfig,
        tolerance: f64,
    ) -> Result<UtilizationReport> {
        let report = Self::process(grid, config)?;

        verify_reconciliation(&report, tolerance)?;

        Ok(report)
    }
}

pub fn process_utilization_sheet(
    grid: &RawGrid,
    config: &UtilizationConfig,
) -> Result<UtilizationReport> {
    UtilizationProcessor::process(grid, config)
}

pub fn process_with_verification(
    grid: &RawGrid,
    config: &UtilizationConfig,
    tolerance: f64,
) -> Result<UtilizationReport> {
    UtilizationProcessor::process_with_verification(grid, config, tolerance)
}
