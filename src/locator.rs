use crate::error::{Result, UtilizationError};
use crate::grid::RawGrid;
use crate::schema::UtilizationConfig;
use crate::utils::{contains_any, first_match};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    BudgetHead,
    VendorRole,
    CostHead,
    PlanTotal,
}

impl ColumnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnRole::BudgetHead => "budget_head",
            ColumnRole::VendorRole => "vendor_role",
            ColumnRole::CostHead => "cost_head",
            ColumnRole::PlanTotal => "plan_total",
        }
    }

    pub fn keywords<'a>(&self, config: &'a UtilizationConfig) -> &'a [String] {
        match self {
            ColumnRole::BudgetHead => &config.keywords.budget_head,
            ColumnRole::VendorRole => &config.keywords.vendor_role,
            ColumnRole::CostHead => &config.keywords.cost_head,
            ColumnRole::PlanTotal => &config.keywords.plan_total,
        }
    }
}

impl ColumnRole {
    /// Whether a lowercased header cell names this role. A plan total header
    /// must also carry one of the plan-total qualifiers.
    pub fn matches(&self, text: &str, config: &UtilizationConfig) -> bool {
        if !contains_any(text, self.keywords(config)) {
            return false;
        }
        match self {
            ColumnRole::PlanTotal => {
                let qualifiers = &config.keywords.plan_total_qualifiers;
                qualifiers.is_empty() || contains_any(text, qualifiers)
            }
            _ => true,
        }
    }
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRef {
    pub row: usize,
    pub col: usize,
}

/// Fixed (non-month) columns of one sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnLayout {
    pub budget_head: CellRef,
    pub vendor_role: Option<CellRef>,
    pub cost_head: CellRef,
    pub plan_total: Option<CellRef>,
}

impl ColumnLayout {
    /// Deepest header row among the required columns.
    pub fn last_header_row(&self) -> usize {
        self.budget_head.row.max(self.cost_head.row)
    }
}

/// Row-major scan: earlier rows win, then leftmost column.
fn find_cell_where<F>(grid: &RawGrid, search_rows: &[usize], is_match: F) -> Option<CellRef>
where
    F: Fn(&str) -> bool,
{
    first_match(search_rows.iter().copied(), |row| {
        first_match(0..grid.width(), |col| {
            let cell = grid.cell(row, col);
            if cell.is_blank() {
                return None;
            }
            is_match(&cell.match_text()).then_some(CellRef { row, col })
        })
    })
}

pub fn find_cell_by_role(
    grid: &RawGrid,
    role_keywords: &[String],
    search_rows: &[usize],
) -> Option<CellRef> {
    find_cell_where(grid, search_rows, |text| contains_any(text, role_keywords))
}

pub fn find_column_by_role(
    grid: &RawGrid,
    role_keywords: &[String],
    search_rows: &[usize],
) -> Option<usize> {
    find_cell_by_role(grid, role_keywords, search_rows).map(|cell| cell.col)
}

/// Resolves every fixed role inside the header window. Budget head and cost
/// head are required; vendor/role and plan total are optional.
pub fn locate_columns(grid: &RawGrid, config: &UtilizationConfig) -> Result<ColumnLayout> {
    let rows = grid.leading_rows(config.header_search_rows);

    let find = |role: ColumnRole| {
        let found = find_cell_where(grid, &rows, |text| role.matches(text, config));
        match found {
            Some(cell) => debug!("Column '{}' found at row {}, col {}", role, cell.row, cell.col),
            None => debug!("Column '{}' not found in rows {:?}", role, rows),
        }
        found
    };

    let required = |role: ColumnRole| {
        find(role).ok_or_else(|| UtilizationError::MissingColumn {
            role,
            rows: rows.clone(),
        })
    };

    Ok(ColumnLayout {
        budget_head: required(ColumnRole::BudgetHead)?,
        vendor_role: find(ColumnRole::VendorRole),
        cost_head: required(ColumnRole::CostHead)?,
        plan_total: find(ColumnRole::PlanTotal),
    })
}
