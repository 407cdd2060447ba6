//! Deterministic risk signals read off a finished report.

use crate::funding::FundingSchedule;
use crate::month::MonthKey;
use crate::report::UtilizationReport;
use crate::utils::round_to;
use log::warn;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

const MISMATCH_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum VarianceSignal {
    /// A budget line spent more than it planned overall.
    OverspentLine {
        line: String,
        total_planned: f64,
        total_spent: f64,
        overspend: f64,
    },

    /// Cumulative spend ran ahead of cumulative plan at this month.
    CumulativeDeficit {
        month: MonthKey,
        cumulative_planned: f64,
        cumulative_spent: f64,
        deficit: f64,
    },

    /// Money was spent on a line in a month with nothing planned.
    UnplannedSpend {
        line: String,
        month: MonthKey,
        spent: f64,
    },

    /// The sheet's own plan-total column disagrees with the monthly plan.
    PlanTotalMismatch {
        line: String,
        declared: f64,
        computed: f64,
    },

    /// Cumulative planned spend ran ahead of the funding received so far.
    CashFlowDeficit {
        month: MonthKey,
        cumulative_planned: f64,
        cumulative_funding: f64,
        deficit: f64,
    },
}

pub fn detect_variance_signals(report: &UtilizationReport) -> Vec<VarianceSignal> {
    let mut signals = Vec::new();

    for (key, line) in &report.budget_lines {
        if line.total_variance < 0.0 {
            signals.push(VarianceSignal::OverspentLine {
                line: key.clone(),
                total_planned: line.total_planned,
                total_spent: line.total_spent,
                overspend: -line.total_variance,
            });
        }

        if let Some(declared) = line.declared_total_planned {
            if (declared - line.total_planned).abs() > MISMATCH_TOLERANCE {
                signals.push(VarianceSignal::PlanTotalMismatch {
                    line: key.clone(),
                    declared,
                    computed: line.total_planned,
                });
            }
        }

        for (month, figures) in &line.monthly_data {
            if figures.planned == 0.0 && figures.total_spent > 0.0 {
                signals.push(VarianceSignal::UnplannedSpend {
                    line: key.clone(),
                    month: *month,
                    spent: figures.total_spent,
                });
            }
        }
    }

    for (month, cumulative) in &report.cumulative_data {
        if cumulative.cumulative_variance < 0.0 {
            signals.push(VarianceSignal::CumulativeDeficit {
                month: *month,
                cumulative_planned: cumulative.cumulative_planned,
                cumulative_spent: cumulative.cumulative_spent,
                deficit: -cumulative.cumulative_variance,
            });
        }
    }

    signals
}

/// Months where cumulative planned spend exceeds cumulative funding.
pub fn detect_cash_flow_deficits(
    report: &UtilizationReport,
    schedule: &FundingSchedule,
    places: u32,
) -> Vec<VarianceSignal> {
    let funding = schedule.cumulative_by_month(report.cumulative_data.keys(), places);

    let mut signals = Vec::new();
    for (month, cumulative) in &report.cumulative_data {
        let funded = funding.get(month).copied().unwrap_or(0.0);
        let deficit = round_to(cumulative.cumulative_planned - funded, places);
        if deficit > 0.0 {
            warn!("Cash flow deficit in {}: {:.2}", month, deficit);
            signals.push(VarianceSignal::CashFlowDeficit {
                month: *month,
                cumulative_planned: cumulative.cumulative_planned,
                cumulative_funding: funded,
                deficit,
            });
        }
    }
    signals
}
