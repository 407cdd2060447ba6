use crate::error::{Result, UtilizationError};
use crate::grid::RawGrid;
use crate::locator::ColumnLayout;
use crate::month::MonthKey;
use crate::month_columns::{MonthColumnMap, MonthRole};
use crate::report::{
    BudgetLine, CumulativeFigures, GrandTotals, MonthlyFigures, UtilizationReport,
};
use crate::schema::UtilizationConfig;
use crate::utils::{contains_any, first_match, round_to};
use log::debug;
use std::collections::BTreeMap;

pub struct VarianceAggregator<'a> {
    config: &'a UtilizationConfig,
}

impl<'a> VarianceAggregator<'a> {
    pub fn new(config: &'a UtilizationConfig) -> Self {
        Self { config }
    }

    fn places(&self) -> u32 {
        self.config.decimal_places
    }

    /// First row at or after `first_probe_row` whose budget-head cell is
    /// neither blank nor a leftover header label. Falls back to the
    /// configured row when the probe window has none.
    pub fn detect_data_start(
        &self,
        grid: &RawGrid,
        budget_head_col: usize,
        first_probe_row: usize,
    ) -> usize {
        let probe_end = first_probe_row
            .saturating_add(self.config.data_probe_rows)
            .min(grid.height());
        let keywords = &self.config.keywords;

        let found = first_match(first_probe_row..probe_end, |row| {
            let cell = grid.cell(row, budget_head_col);
            if cell.is_blank() {
                return None;
            }
            let text = cell.match_text();
            let is_row_number = keywords
                .row_number_markers
                .iter()
                .any(|m| m.trim().to_lowercase() == text);
            if is_row_number || contains_any(&text, &keywords.header_label_markers) {
                debug!("Row {}: '{}' looks like a header, probing on", row, cell.text());
                return None;
            }
            Some(row)
        });

        match found {
            Some(row) => row,
            None => {
                debug!(
                    "No data row in probe window {}..{}; falling back to row {}",
                    first_probe_row, probe_end, self.config.fallback_data_start_row
                );
                self.config.fallback_data_start_row
            }
        }
    }

    pub fn aggregate(
        &self,
        grid: &RawGrid,
        layout: &ColumnLayout,
        month_columns: &MonthColumnMap,
        data_start_row: usize,
    ) -> Result<UtilizationReport> {
        if month_columns.is_empty() {
            return Err(UtilizationError::NoMonthColumns {
                rows: month_columns.searched_rows.clone(),
            });
        }

        let mut lines: BTreeMap<String, BudgetLine> = BTreeMap::new();

        for row in data_start_row..grid.height() {
            self.process_row(grid, layout, month_columns, row, &mut lines);
        }

        Ok(self.finalize(lines))
    }

    fn process_row(
        &self,
        grid: &RawGrid,
        layout: &ColumnLayout,
        month_columns: &MonthColumnMap,
        row: usize,
        lines: &mut BTreeMap<String, BudgetLine>,
    ) {
        let places = self.places();
        let head_cell = grid.cell(row, layout.budget_head.col);
        if head_cell.is_blank() {
            return;
        }

        let budget_head = head_cell.text();
        if contains_any(&head_cell.match_text(), &self.config.keywords.subtotal_markers) {
            debug!("Row {}: skipping subtotal row '{}'", row, budget_head);
            return;
        }

        let vendor_role = layout
            .vendor_role
            .map(|cell| grid.cell(row, cell.col))
            .filter(|cell| !cell.is_blank())
            .map(|cell| cell.text());

        let key = BudgetLine::composite_key(&budget_head, vendor_role.as_deref());
        let line = lines
            .entry(key)
            .or_insert_with(|| BudgetLine::new(budget_head.clone(), vendor_role.clone()));

        for (month, set) in &month_columns.columns {
            let value = |role: MonthRole| self.amount(grid, row, set.get(role), month);
            let figures = MonthlyFigures::new(
                value(MonthRole::Plan),
                value(MonthRole::Claims),
                value(MonthRole::ExternalActuals),
                places,
            );

            line.total_planned = round_to(line.total_planned + figures.planned, places);
            line.total_spent = round_to(line.total_spent + figures.total_spent, places);

            if self.config.sparse_storage
                && figures.is_zero()
                && !line.monthly_data.contains_key(month)
            {
                continue;
            }
            line.monthly_data
                .entry(*month)
                .or_default()
                .accumulate(&figures, places);
        }

        if let Some(plan_total) = layout.plan_total {
            if let Some(declared) = grid.cell(row, plan_total.col).amount() {
                let sum = line.declared_total_planned.unwrap_or(0.0) + declared;
                line.declared_total_planned = Some(round_to(sum, places));
            }
        }

        line.add_cost_head(&grid.cell(row, layout.cost_head.col).text());
    }

    fn amount(&self, grid: &RawGrid, row: usize, col: Option<usize>, month: &MonthKey) -> f64 {
        let Some(col) = col else {
            return 0.0;
        };
        let cell = grid.cell(row, col);
        match cell.amount() {
            Some(value) => value,
            None => {
                if !cell.is_blank() {
                    debug!(
                        "Row {}, col {} ({}): unparseable amount '{}', using 0.0",
                        row,
                        col,
                        month,
                        cell.text()
                    );
                }
                0.0
            }
        }
    }

    fn finalize(&self, mut lines: BTreeMap<String, BudgetLine>) -> UtilizationReport {
        let places = self.places();

        for line in lines.values_mut() {
            if self.config.sparse_storage {
                line.monthly_data.retain(|_, figures| !figures.is_zero());
            }
            line.total_variance = round_to(line.total_planned - line.total_spent, places);
        }

        let mut monthly_data: BTreeMap<MonthKey, MonthlyFigures> = BTreeMap::new();
        for line in lines.values() {
            for (month, figures) in &line.monthly_data {
                monthly_data
                    .entry(*month)
                    .or_default()
                    .accumulate(figures, places);
            }
        }

        let mut cumulative_data = BTreeMap::new();
        let (mut planned, mut spent) = (0.0, 0.0);
        for (month, figures) in &monthly_data {
            planned = round_to(planned + figures.planned, places);
            spent = round_to(spent + figures.total_spent, places);
            cumulative_data.insert(
                *month,
                CumulativeFigures {
                    cumulative_planned: planned,
                    cumulative_spent: spent,
                    cumulative_variance: round_to(planned - spent, places),
                },
            );
        }

        let (total_planned, total_spent) = lines.values().fold((0.0, 0.0), |(p, s), line| {
            (
                round_to(p + line.total_planned, places),
                round_to(s + line.total_spent, places),
            )
        });

        debug!(
            "Aggregated {} budget line(s) over {} month(s)",
            lines.len(),
            monthly_data.len()
        );

        UtilizationReport {
            monthly_data,
            cumulative_data,
            budget_lines: lines,
            grand_totals: GrandTotals {
                total_planned,
                total_spent,
                total_variance: round_to(total_planned - total_spent, places),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CellValue;
    use crate::locator::CellRef;
    use crate::month_columns::MonthColumnSet;

    fn grid(rows: Vec<Vec<CellValue>>) -> RawGrid {
        RawGrid::from_rows(rows)
    }

    fn t(s: &str) -> CellValue {
        CellValue::from(s)
    }

    fn n(v: f64) -> CellValue {
        CellValue::Number(v)
    }

    fn key(s: &str) -> MonthKey {
        s.parse().unwrap()
    }

    fn layout(vendor: bool) -> ColumnLayout {
        ColumnLayout {
            budget_head: CellRef { row: 0, col: 0 },
            vendor_role: vendor.then_some(CellRef { row: 0, col: 1 }),
            cost_head: CellRef { row: 0, col: 2 },
            plan_total: None,
        }
    }

    /// Columns 3.. hold (plan, claims, d365) triples per month.
    fn months(keys: &[&str]) -> MonthColumnMap {
        let mut map = MonthColumnMap::default();
        for (i, k) in keys.iter().enumerate() {
            let base = 3 + i * 3;
            map.columns.insert(
                key(k),
                MonthColumnSet {
                    plan: Some(base),
                    claims: Some(base + 1),
                    external_actuals: Some(base + 2),
                },
            );
        }
        map
    }

    fn header(keys: &[&str]) -> Vec<CellValue> {
        let mut row = vec![t("Budget Head"), t("Vendor/Role"), t("Cost Head")];
        for k in keys {
            row.push(t(&format!("Plan {}", k)));
            row.push(t(&format!("Claims {}", k)));
            row.push(t(&format!("D365 {}", k)));
        }
        row
    }

    #[test]
    fn test_single_line_end_to_end() {
        let g = grid(vec![
            header(&["Apr-25"]),
            vec![t("Salaries"), t("PM"), t("Base Pay"), n(100000.0), n(40000.0), n(10000.0)],
        ]);
        let config = UtilizationConfig::default();
        let aggregator = VarianceAggregator::new(&config);
        let report = aggregator
            .aggregate(&g, &layout(true), &months(&["2025-04"]), 1)
            .unwrap();

        assert_eq!(report.budget_lines.len(), 1);
        let line = &report.budget_lines["Salaries - PM"];
        assert_eq!(line.vendor_role_category.as_deref(), Some("PM"));
        assert_eq!(line.cost_heads, vec!["Base Pay".to_string()]);
        assert_eq!(line.total_planned, 100000.0);
        assert_eq!(line.total_spent, 50000.0);
        assert_eq!(line.total_variance, 50000.0);

        let apr = line.monthly_data[&key("2025-04")];
        assert_eq!(apr.claims, 40000.0);
        assert_eq!(apr.external_actuals, 10000.0);
        assert_eq!(report.monthly_data[&key("2025-04")], apr);
        assert_eq!(report.grand_totals.total_variance, 50000.0);
    }

    #[test]
    fn test_rows_sharing_a_key_accumulate() {
        let g = grid(vec![
            header(&["Apr-25"]),
            vec![t("Travel"), t(""), t("Domestic"), n(300.0), n(100.0), n(0.0)],
            vec![t("Travel"), t(""), t("International"), n(200.5), n(50.25), t("1,000")],
            vec![t("Travel"), t(""), t("Domestic"), n(0.0), n(0.0), n(0.0)],
        ]);
        let config = UtilizationConfig::default();
        let report = VarianceAggregator::new(&config)
            .aggregate(&g, &layout(true), &months(&["2025-04"]), 1)
            .unwrap();

        let line = &report.budget_lines["Travel"];
        assert!(line.vendor_role_category.is_none());
        assert_eq!(
            line.cost_heads,
            vec!["Domestic".to_string(), "International".to_string()]
        );
        assert_eq!(line.total_planned, 500.5);
        assert_eq!(line.total_spent, 1150.25);
        assert_eq!(line.total_variance, -649.75);
        assert_eq!(line.monthly_data[&key("2025-04")].external_actuals, 1000.0);
    }

    #[test]
    fn test_subtotal_and_blank_rows_are_skipped() {
        let g = grid(vec![
            header(&["Apr-25"]),
            vec![t("Salaries"), t(""), t("Pay"), n(10.0), n(5.0), n(0.0)],
            vec![t(""), t(""), t("Orphan"), n(999.0), n(999.0), n(0.0)],
            vec![t("Subtotal - Phase 1"), t(""), t(""), n(10.0), n(5.0), n(0.0)],
            vec![t("Grand Total"), t(""), t(""), n(10.0), n(5.0), n(0.0)],
        ]);
        let config = UtilizationConfig::default();
        let report = VarianceAggregator::new(&config)
            .aggregate(&g, &layout(true), &months(&["2025-04"]), 1)
            .unwrap();

        assert_eq!(report.budget_lines.len(), 1);
        assert_eq!(report.grand_totals.total_planned, 10.0);
        assert_eq!(report.grand_totals.total_spent, 5.0);
    }

    #[test]
    fn test_sparse_storage_omits_zero_months() {
        let g = grid(vec![
            header(&["Apr-25", "May-25", "Jun-25"]),
            vec![
                t("Equipment"), t(""), t("Laptops"),
                n(100.0), n(0.0), n(0.0),
                n(0.0), n(0.0), n(0.0),
                n(0.0), n(500.0), n(0.0),
            ],
            vec![
                t("Rent"), t(""), t("Office"),
                n(50.0), n(50.0), n(0.0),
                n(0.0), n(0.0), n(0.0),
                n(0.0), n(0.0), n(0.0),
            ],
        ]);
        let config = UtilizationConfig::default();
        let report = VarianceAggregator::new(&config)
            .aggregate(&g, &layout(false), &months(&["2025-04", "2025-05", "2025-06"]), 1)
            .unwrap();

        let may = key("2025-05");
        let jun = key("2025-06");
        assert!(!report.monthly_data.contains_key(&may));
        assert!(!report.cumulative_data.contains_key(&may));
        assert!(report
            .budget_lines
            .values()
            .all(|line| !line.monthly_data.contains_key(&may)));

        // Zero plan with non-zero spend is still kept.
        let june = report.monthly_data[&jun];
        assert_eq!(june.planned, 0.0);
        assert_eq!(june.total_spent, 500.0);
        assert!(!report.budget_lines["Rent"].monthly_data.contains_key(&jun));

        assert_eq!(report.cumulative_data[&jun].cumulative_planned, 150.0);
        assert_eq!(report.cumulative_data[&jun].cumulative_spent, 550.0);
        assert_eq!(report.cumulative_data[&jun].cumulative_variance, -400.0);
    }

    #[test]
    fn test_offsetting_rows_are_pruned_under_sparse_storage() {
        let g = grid(vec![
            header(&["Apr-25"]),
            vec![t("Adjustments"), t(""), t("Journal"), n(500.0), n(0.0), n(0.0)],
            vec![t("Adjustments"), t(""), t("Reversal"), n(-500.0), n(0.0), n(0.0)],
        ]);
        let config = UtilizationConfig::default();
        let report = VarianceAggregator::new(&config)
            .aggregate(&g, &layout(false), &months(&["2025-04"]), 1)
            .unwrap();

        assert!(report.budget_lines["Adjustments"].monthly_data.is_empty());
        assert!(report.monthly_data.is_empty());
        assert_eq!(report.grand_totals.total_planned, 0.0);
    }

    #[test]
    fn test_dense_storage_keeps_zero_months() {
        let g = grid(vec![
            header(&["Apr-25", "May-25"]),
            vec![
                t("Rent"), t(""), t("Office"),
                n(50.0), n(50.0), n(0.0),
                n(0.0), n(0.0), n(0.0),
            ],
        ]);
        let config = UtilizationConfig {
            sparse_storage: false,
            ..UtilizationConfig::default()
        };
        let report = VarianceAggregator::new(&config)
            .aggregate(&g, &layout(false), &months(&["2025-04", "2025-05"]), 1)
            .unwrap();

        assert_eq!(report.monthly_data.len(), 2);
        assert_eq!(report.budget_lines["Rent"].monthly_data.len(), 2);
        assert_eq!(report.cumulative_data[&key("2025-05")].cumulative_planned, 50.0);
    }

    #[test]
    fn test_unparseable_and_missing_cells_count_as_zero() {
        let g = grid(vec![
            header(&["Apr-25"]),
            vec![t("Salaries"), t(""), t("Pay"), t("TBD"), t(""), t("n/a")],
            vec![t("Salaries"), t(""), t("Pay"), t("1,200.456"), n(200.0), CellValue::Blank],
        ]);
        let mut map = months(&["2025-04"]);
        map.columns.get_mut(&key("2025-04")).unwrap().external_actuals = None;

        let config = UtilizationConfig::default();
        let report = VarianceAggregator::new(&config)
            .aggregate(&g, &layout(false), &map, 1)
            .unwrap();

        let line = &report.budget_lines["Salaries"];
        assert_eq!(line.total_planned, 1200.46);
        assert_eq!(line.total_spent, 200.0);
        assert_eq!(line.total_variance, 1000.46);
    }

    #[test]
    fn test_declared_plan_total_is_summed() {
        let g = grid(vec![
            {
                let mut h = header(&["Apr-25"]);
                h.push(t("Total Budget"));
                h
            },
            vec![t("Rent"), t(""), t("Office"), n(50.0), n(0.0), n(0.0), n(600.0)],
            vec![t("Rent"), t(""), t("Storage"), n(25.0), n(0.0), n(0.0), t("300")],
        ]);
        let mut l = layout(false);
        l.plan_total = Some(CellRef { row: 0, col: 6 });

        let config = UtilizationConfig::default();
        let report = VarianceAggregator::new(&config)
            .aggregate(&g, &l, &months(&["2025-04"]), 1)
            .unwrap();

        assert_eq!(report.budget_lines["Rent"].declared_total_planned, Some(900.0));
    }

    #[test]
    fn test_no_month_columns_is_fatal() {
        let g = grid(vec![header(&[]), vec![t("Rent"), t(""), t("Office")]]);
        let config = UtilizationConfig::default();
        let result = VarianceAggregator::new(&config).aggregate(
            &g,
            &layout(false),
            &MonthColumnMap::default(),
            1,
        );
        assert!(matches!(result, Err(UtilizationError::NoMonthColumns { .. })));
    }

    #[test]
    fn test_detect_data_start() {
        let g = grid(vec![
            vec![t("Budget Head")],
            vec![t("S.No")],
            vec![CellValue::Blank],
            vec![t("Budget Head (INR)")],
            vec![t("Salaries")],
        ]);
        let config = UtilizationConfig::default();
        let aggregator = VarianceAggregator::new(&config);

        assert_eq!(aggregator.detect_data_start(&g, 0, 1), 4);

        let only_headers = grid(vec![vec![t("Budget Head")], vec![t("#")]]);
        assert_eq!(
            aggregator.detect_data_start(&only_headers, 0, 1),
            config.fallback_data_start_row
        );
    }

    #[test]
    fn test_row_number_markers_match_whole_cell_only() {
        let g = grid(vec![
            vec![t("Budget Head")],
            vec![t(" Sr.No ")],
            vec![t("Lab Equipment #1")],
            vec![t("Travel")],
        ]);
        let config = UtilizationConfig::default();
        let aggregator = VarianceAggregator::new(&config);

        assert_eq!(aggregator.detect_data_start(&g, 0, 1), 2);
        assert_eq!(aggregator.detect_data_start(&g, 0, 2), 2);
    }

    #[test]
    fn test_huge_probe_window_does_not_overflow() {
        let g = grid(vec![vec![t("Budget Head")], vec![t("Salaries")]]);
        let config = UtilizationConfig {
            data_probe_rows: usize::MAX,
            ..UtilizationConfig::default()
        };
        let aggregator = VarianceAggregator::new(&config);
        assert_eq!(aggregator.detect_data_start(&g, 0, 1), 1);
        assert_eq!(aggregator.detect_data_start(&g, 0, usize::MAX), config.fallback_data_start_row);
    }
}
