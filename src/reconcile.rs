use crate::error::{Result, UtilizationError};
use crate::month::MonthKey;
use crate::report::{MonthlyFigures, UtilizationReport};

pub struct ReconciliationChecker<'a> {
    report: &'a UtilizationReport,
    tolerance: f64,
}

impl<'a> ReconciliationChecker<'a> {
    pub fn new(report: &'a UtilizationReport, tolerance: f64) -> Self {
        Self { report, tolerance }
    }

    /// Checks that line, monthly, cumulative and grand totals all agree.
    pub fn verify(&self) -> Result<()> {
        self.verify_lines()?;
        self.verify_monthly()?;
        self.verify_cumulative()?;
        self.verify_grand_totals()?;
        Ok(())
    }

    fn check(&self, scope: impl FnOnce() -> String, expected: f64, actual: f64) -> Result<()> {
        if (expected - actual).abs() > self.tolerance {
            return Err(UtilizationError::ReconciliationViolation {
                scope: scope(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    fn verify_lines(&self) -> Result<()> {
        for (key, line) in &self.report.budget_lines {
            self.check(
                || format!("budget_lines[{}].total_variance", key),
                line.total_planned - line.total_spent,
                line.total_variance,
            )?;

            if let Some(month) = line
                .monthly_data
                .keys()
                .find(|m| !self.report.monthly_data.contains_key(*m))
            {
                return Err(UtilizationError::ReconciliationViolation {
                    scope: format!("monthly_data[{}] missing for line {}", month, key),
                    expected: line.monthly_data[month].planned,
                    actual: 0.0,
                });
            }
        }
        Ok(())
    }

    fn line_sum(&self, month: &MonthKey) -> MonthlyFigures {
        let mut sum = MonthlyFigures::default();
        for line in self.report.budget_lines.values() {
            if let Some(figures) = line.monthly_data.get(month) {
                sum.planned += figures.planned;
                sum.claims += figures.claims;
                sum.external_actuals += figures.external_actuals;
                sum.total_spent += figures.total_spent;
                sum.variance += figures.variance;
            }
        }
        sum
    }

    fn verify_monthly(&self) -> Result<()> {
        for (month, aggregate) in &self.report.monthly_data {
            let sum = self.line_sum(month);
            let fields = [
                ("planned", sum.planned, aggregate.planned),
                ("claims", sum.claims, aggregate.claims),
                ("d365", sum.external_actuals, aggregate.external_actuals),
                ("total_spent", sum.total_spent, aggregate.total_spent),
                ("variance", sum.variance, aggregate.variance),
            ];
            for (field, expected, actual) in fields {
                self.check(
                    || format!("monthly_data[{}].{}", month, field),
                    expected,
                    actual,
                )?;
            }
        }
        Ok(())
    }

    fn verify_cumulative(&self) -> Result<()> {
        let report = self.report;
        if report.cumulative_data.len() != report.monthly_data.len()
            || report
                .cumulative_data
                .keys()
                .zip(report.monthly_data.keys())
                .any(|(a, b)| a != b)
        {
            return Err(UtilizationError::ReconciliationViolation {
                scope: "cumulative_data months differ from monthly_data".to_string(),
                expected: report.monthly_data.len() as f64,
                actual: report.cumulative_data.len() as f64,
            });
        }

        let (mut planned, mut spent) = (0.0, 0.0);
        for (month, figures) in &report.monthly_data {
            planned += figures.planned;
            spent += figures.total_spent;
            let cumulative = &report.cumulative_data[month];

            self.check(
                || format!("cumulative_data[{}].cumulative_planned", month),
                planned,
                cumulative.cumulative_planned,
            )?;
            self.check(
                || format!("cumulative_data[{}].cumulative_spent", month),
                spent,
                cumulative.cumulative_spent,
            )?;
            self.check(
                || format!("cumulative_data[{}].cumulative_variance", month),
                planned - spent,
                cumulative.cumulative_variance,
            )?;
        }
        Ok(())
    }

    fn verify_grand_totals(&self) -> Result<()> {
        let report = self.report;
        let totals = &report.grand_totals;
        let planned: f64 = report.budget_lines.values().map(|l| l.total_planned).sum();
        let spent: f64 = report.budget_lines.values().map(|l| l.total_spent).sum();

        self.check(|| "grand_totals.total_planned".to_string(), planned, totals.total_planned)?;
        self.check(|| "grand_totals.total_spent".to_string(), spent, totals.total_spent)?;
        self.check(
            || "grand_totals.total_variance".to_string(),
            totals.total_planned - totals.total_spent,
            totals.total_variance,
        )?;

        let (last_planned, last_spent) = report
            .cumulative_data
            .values()
            .next_back()
            .map(|c| (c.cumulative_planned, c.cumulative_spent))
            .unwrap_or((0.0, 0.0));
        self.check(
            || "cumulative_data[last].cumulative_planned vs grand_totals".to_string(),
            totals.total_planned,
            last_planned,
        )?;
        self.check(
            || "cumulative_data[last].cumulative_spent vs grand_totals".to_string(),
            totals.total_spent,
            last_spent,
        )?;
        Ok(())
    }
}

pub fn verify_reconciliation(report: &UtilizationReport, tolerance: f64) -> Result<()> {
    ReconciliationChecker::new(report, tolerance).verify()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{BudgetLine, CumulativeFigures, GrandTotals};

    fn consistent() -> UtilizationReport {
        let apr: MonthKey = "2025-04".parse().unwrap();
        let may: MonthKey = "2025-05".parse().unwrap();

        let mut a = BudgetLine::new("Salaries".to_string(), None);
        a.monthly_data.insert(apr, MonthlyFigures::new(100.0, 60.0, 0.0, 2));
        a.total_planned = 100.0;
        a.total_spent = 60.0;
        a.total_variance = 40.0;

        let mut b = BudgetLine::new("Travel".to_string(), None);
        b.monthly_data.insert(apr, MonthlyFigures::new(10.0, 0.0, 5.0, 2));
        b.monthly_data.insert(may, MonthlyFigures::new(0.0, 20.0, 0.0, 2));
        b.total_planned = 10.0;
        b.total_spent = 25.0;
        b.total_variance = -15.0;

        let mut report = UtilizationReport::default();
        report.monthly_data.insert(apr, MonthlyFigures::new(110.0, 60.0, 5.0, 2));
        report.monthly_data.insert(may, MonthlyFigures::new(0.0, 20.0, 0.0, 2));
        report.cumulative_data.insert(
            apr,
            CumulativeFigures {
                cumulative_planned: 110.0,
                cumulative_spent: 65.0,
                cumulative_variance: 45.0,
            },
        );
        report.cumulative_data.insert(
            may,
            CumulativeFigures {
                cumulative_planned: 110.0,
                cumulative_spent: 85.0,
                cumulative_variance: 25.0,
            },
        );
        report.budget_lines.insert("Salaries".to_string(), a);
        report.budget_lines.insert("Travel".to_string(), b);
        report.grand_totals = GrandTotals {
            total_planned: 110.0,
            total_spent: 85.0,
            total_variance: 25.0,
        };
        report
    }

    #[test]
    fn test_consistent_report_passes() {
        assert!(verify_reconciliation(&consistent(), 0.005).is_ok());
    }

    #[test]
    fn test_tampered_monthly_aggregate_fails() {
        let mut report = consistent();
        let apr: MonthKey = "2025-04".parse().unwrap();
        report.monthly_data.get_mut(&apr).unwrap().planned = 111.0;

        let err = verify_reconciliation(&report, 0.005).unwrap_err();
        match err {
            UtilizationError::ReconciliationViolation { scope, expected, actual } => {
                assert_eq!(scope, "monthly_data[2025-04].planned");
                assert_eq!(expected, 110.0);
                assert_eq!(actual, 111.0);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_tampered_grand_total_fails() {
        let mut report = consistent();
        report.grand_totals.total_spent = 80.0;
        report.grand_totals.total_variance = 30.0;
        assert!(verify_reconciliation(&report, 0.005).is_err());
    }

    #[test]
    fn test_line_month_missing_from_global_fails() {
        let mut report = consistent();
        let may: MonthKey = "2025-05".parse().unwrap();
        report.monthly_data.remove(&may);
        report.cumulative_data.remove(&may);
        assert!(verify_reconciliation(&report, 0.005).is_err());
    }

    #[test]
    fn test_tolerance_is_respected() {
        let mut report = consistent();
        report.grand_totals.total_planned = 110.004;
        report.grand_totals.total_variance = 25.004;
        assert!(verify_reconciliation(&report, 0.01).is_ok());
        assert!(verify_reconciliation(&report, 0.001).is_err());
    }
}
