//! Discovers month-labelled columns in the header window and classifies each
//! one as a plan, claims or externally sourced actuals column.

use crate::grid::RawGrid;
use crate::month::{MonthKey, MonthNormalizer};
use crate::schema::RoleKeywords;
use crate::utils::{contains_any, first_match};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonthRole {
    Plan,
    Claims,
    ExternalActuals,
}

impl MonthRole {
    /// Classification priority when a header matches several keyword lists.
    pub const PRIORITY: [MonthRole; 3] = [
        MonthRole::Plan,
        MonthRole::Claims,
        MonthRole::ExternalActuals,
    ];

    pub fn keywords<'a>(&self, keywords: &'a RoleKeywords) -> &'a [String] {
        match self {
            MonthRole::Plan => &keywords.plan,
            MonthRole::Claims => &keywords.claims,
            MonthRole::ExternalActuals => &keywords.external_actuals,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthColumnSet {
    pub plan: Option<usize>,
    pub claims: Option<usize>,
    pub external_actuals: Option<usize>,
}

impl MonthColumnSet {
    pub fn get(&self, role: MonthRole) -> Option<usize> {
        match role {
            MonthRole::Plan => self.plan,
            MonthRole::Claims => self.claims,
            MonthRole::ExternalActuals => self.external_actuals,
        }
    }

    /// Binds `col` unless the role already has a column; returns the column
    /// that was kept in that case.
    pub fn bind(&mut self, role: MonthRole, col: usize) -> Result<(), usize> {
        let slot = match role {
            MonthRole::Plan => &mut self.plan,
            MonthRole::Claims => &mut self.claims,
            MonthRole::ExternalActuals => &mut self.external_actuals,
        };
        match slot {
            Some(existing) => Err(*existing),
            None => {
                *slot = Some(col);
                Ok(())
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.plan.is_none() && self.claims.is_none() && self.external_actuals.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateHeader {
    pub month: MonthKey,
    pub role: MonthRole,
    pub column: usize,
    pub kept_column: usize,
    pub header: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthColumnMap {
    /// Rows that were searched for month headers.
    pub searched_rows: Vec<usize>,
    /// Row the month headers were read from, if any row had one.
    pub header_row: Option<usize>,
    pub columns: BTreeMap<MonthKey, MonthColumnSet>,
    pub duplicates: Vec<DuplicateHeader>,
}

impl MonthColumnMap {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn get(&self, month: &MonthKey) -> Option<&MonthColumnSet> {
        self.columns.get(month)
    }

    /// Month keys in chronological order.
    pub fn months(&self) -> impl Iterator<Item = &MonthKey> {
        self.columns.keys()
    }
}

pub fn classify_month_role(header: &str, keywords: &RoleKeywords) -> Option<MonthRole> {
    let text = header.to_lowercase();
    first_match(MonthRole::PRIORITY, |role| {
        contains_any(&text, role.keywords(keywords)).then_some(role)
    })
}

/// Date part of a month header, with the actuals marker removed.
fn date_text(header: &str, marker: &str) -> String {
    let lowered = header.to_lowercase();
    let marker = marker.trim().to_lowercase();
    if !marker.is_empty() && lowered.contains(&marker) {
        lowered.replacen(&marker, " ", 1).trim().to_string()
    } else {
        lowered
    }
}

pub fn find_month_columns(
    grid: &RawGrid,
    search_rows: &[usize],
    normalizer: &MonthNormalizer,
    keywords: &RoleKeywords,
) -> MonthColumnMap {
    let month_like = |row: usize, col: usize| {
        let cell = grid.cell(row, col);
        !cell.is_blank() && (cell.is_date() || normalizer.is_month_like(&cell.text()))
    };

    let header_row = first_match(search_rows.iter().copied(), |row| {
        (0..grid.width()).any(|col| month_like(row, col)).then_some(row)
    });

    let mut map = MonthColumnMap {
        searched_rows: search_rows.to_vec(),
        header_row,
        ..MonthColumnMap::default()
    };
    let Some(row) = header_row else {
        debug!("No month headers in rows {:?}", search_rows);
        return map;
    };

    for col in 0..grid.width() {
        if !month_like(row, col) {
            continue;
        }
        let header = grid.cell(row, col).text();

        let Some(month) = normalizer.normalize(&date_text(&header, &keywords.actuals_marker))
        else {
            warn!("Skipping month header '{}' at col {}: unparseable date", header, col);
            continue;
        };

        let Some(role) = classify_month_role(&header, keywords) else {
            warn!("Skipping month header '{}' at col {}: no plan/claims/actuals keyword", header, col);
            continue;
        };

        let set = map.columns.entry(month).or_default();
        if let Err(kept_column) = set.bind(role, col) {
            warn!(
                "Duplicate {:?} header '{}' for {} at col {}; keeping col {}",
                role, header, month, col, kept_column
            );
            map.duplicates.push(DuplicateHeader {
                month,
                role,
                column: col,
                kept_column,
                header,
            });
        }
    }

    map.columns.retain(|_, set| !set.is_empty());
    debug!(
        "Mapped {} month(s) from header row {} ({} duplicate header(s))",
        map.columns.len(),
        row,
        map.duplicates.len()
    );
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CellValue;
    use crate::schema::default_month_names;
    use chrono::NaiveDate;

    fn grid(rows: &[&[&str]]) -> RawGrid {
        RawGrid::from_rows(
            rows.iter()
                .map(|r| r.iter().map(|s| CellValue::from(*s)).collect())
                .collect(),
        )
    }

    fn map_for(g: &RawGrid) -> MonthColumnMap {
        let normalizer = MonthNormalizer::new(&default_month_names()).unwrap();
        find_month_columns(g, &[0, 1, 2, 3, 4, 5], &normalizer, &RoleKeywords::default())
    }

    fn key(s: &str) -> MonthKey {
        s.parse().unwrap()
    }

    #[test]
    fn test_duplicate_month_merge_keeps_first_column() {
        let g = grid(&[&["Budget Head", "Plan Apr-25", "Plan April-2025"]]);
        let map = map_for(&g);

        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&key("2025-04")).unwrap().plan, Some(1));
        assert_eq!(map.duplicates.len(), 1);
        assert_eq!(map.duplicates[0].column, 2);
        assert_eq!(map.duplicates[0].kept_column, 1);
        assert_eq!(map.duplicates[0].role, MonthRole::Plan);
    }

    #[test]
    fn test_roles_merge_independently() {
        let g = grid(&[&["Plan Apr-25", "Claims April 2025", "D365 Apr-25", "Claims 4/25 Apr"]]);
        let map = map_for(&g);

        let set = map.get(&key("2025-04")).unwrap();
        assert_eq!(set.plan, Some(0));
        assert_eq!(set.claims, Some(1));
        assert_eq!(set.external_actuals, Some(2));
        assert_eq!(map.duplicates.len(), 1);
    }

    #[test]
    fn test_only_first_month_row_is_used() {
        let g = grid(&[
            &["Budget Head", "Plan May-25", ""],
            &["", "Plan Jun-25", "Claims Jun-25"],
        ]);
        let map = map_for(&g);

        assert_eq!(map.header_row, Some(0));
        assert_eq!(map.months().cloned().collect::<Vec<_>>(), vec![key("2025-05")]);
    }

    #[test]
    fn test_unparseable_and_unclassified_headers_are_skipped() {
        let g = grid(&[&["Plan Mar", "Notes Apr-25", "Plan Jan-26", "Claims Dec-25"]]);
        let map = map_for(&g);

        assert_eq!(
            map.months().cloned().collect::<Vec<_>>(),
            vec![key("2025-12"), key("2026-01")]
        );
        assert!(map.get(&key("2025-04")).is_none());
    }

    #[test]
    fn test_marker_is_stripped_before_parsing() {
        let g = grid(&[&["D365 Sep-24", "D365 2024-10"]]);
        let map = map_for(&g);

        assert_eq!(map.get(&key("2024-09")).unwrap().external_actuals, Some(0));
        // Not month-like by name, so never considered.
        assert!(map.get(&key("2024-10")).is_none());
    }

    #[test]
    fn test_date_cells_are_month_headers_but_need_a_role() {
        let g = RawGrid::from_rows(vec![vec![
            CellValue::from("Budget Head"),
            CellValue::Date(NaiveDate::from_ymd_opt(2025, 4, 1).unwrap()),
        ]]);
        let map = map_for(&g);
        assert_eq!(map.header_row, Some(0));
        assert!(map.is_empty());
    }

    #[test]
    fn test_no_month_row() {
        let g = grid(&[&["Budget Head", "Cost Head"], &["Salaries", "Pay"]]);
        let map = map_for(&g);
        assert!(map.header_row.is_none());
        assert!(map.is_empty());
    }

    #[test]
    fn test_classification_priority() {
        let kw = RoleKeywords::default();
        assert_eq!(classify_month_role("Plan Apr-25", &kw), Some(MonthRole::Plan));
        assert_eq!(classify_month_role("Budget vs Claims Apr-25", &kw), Some(MonthRole::Plan));
        assert_eq!(classify_month_role("Claims Actual Apr-25", &kw), Some(MonthRole::Claims));
        assert_eq!(classify_month_role("D365 Apr-25", &kw), Some(MonthRole::ExternalActuals));
        assert_eq!(classify_month_role("Apr-25", &kw), None);
    }

    #[test]
    fn test_default_month_role_vocabulary() {
        let kw = RoleKeywords::default();
        assert_eq!(classify_month_role("Planned Apr-25", &kw), Some(MonthRole::Plan));
        assert_eq!(classify_month_role("Actual Apr-25", &kw), Some(MonthRole::Claims));
        assert_eq!(classify_month_role("Invoice Apr-25", &kw), Some(MonthRole::Claims));
        assert_eq!(classify_month_role("System Apr-25", &kw), Some(MonthRole::ExternalActuals));
        assert_eq!(classify_month_role("ERP Apr-25", &kw), Some(MonthRole::ExternalActuals));
        assert_eq!(classify_month_role("Utilization Certificate for April 2025", &kw), None);
    }

    #[test]
    fn test_title_row_with_a_month_yields_no_columns() {
        let g = grid(&[
            &["Utilization Certificate for April 2025", "", ""],
            &["Budget Head", "Plan Apr-25", "Claims Apr-25"],
        ]);
        let map = map_for(&g);
        assert_eq!(map.header_row, Some(0));
        assert!(map.is_empty());
    }
}
