//! Funding tranches and the funding-side view of a processed report.

use crate::error::{Result, UtilizationError};
use crate::month::MonthKey;
use crate::report::UtilizationReport;
use crate::utils::round_to;
use chrono::NaiveDate;
use log::{debug, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const DEFAULT_TOP_LINES: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FundingTranche {
    /// Month the tranche is expected to be received.
    pub month: MonthKey,
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FundingTranche {
    pub fn new(month: MonthKey, amount: f64) -> Self {
        Self {
            month,
            amount,
            description: None,
        }
    }

    pub fn from_date(date: NaiveDate, amount: f64) -> Self {
        Self::new(MonthKey::from_date(date), amount)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FundingSchedule {
    pub tranches: Vec<FundingTranche>,
}

impl FundingSchedule {
    pub fn new(tranches: Vec<FundingTranche>) -> Self {
        Self { tranches }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let schedule: Self = serde_json::from_str(json)?;
        schedule.validate()?;
        Ok(schedule)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        for tranche in &self.tranches {
            if !tranche.amount.is_finite() {
                return Err(UtilizationError::InvalidConfig(format!(
                    "funding tranche for {} has a non-finite amount",
                    tranche.month
                )));
            }
        }
        Ok(())
    }

    pub fn total(&self) -> f64 {
        self.tranches.iter().map(|t| t.amount).sum()
    }

    /// Funding received up to and including each of `months`. Tranches dated
    /// before the first month count from the first month; tranches after the
    /// last month fund nothing and are logged.
    pub fn cumulative_by_month<'a, I>(&self, months: I, places: u32) -> BTreeMap<MonthKey, f64>
    where
        I: IntoIterator<Item = &'a MonthKey>,
    {
        let mut tranches: Vec<&FundingTranche> = self.tranches.iter().collect();
        tranches.sort_by_key(|t| t.month);
        let mut months: Vec<MonthKey> = months.into_iter().copied().collect();
        months.sort();

        let mut cumulative = BTreeMap::new();
        let mut received = 0.0;
        let mut next = 0;
        for &month in &months {
            while let Some(tranche) = tranches.get(next).filter(|t| t.month <= month) {
                received = round_to(received + tranche.amount, places);
                next += 1;
            }
            cumulative.insert(month, received);
        }

        if let Some(last) = months.last() {
            for tranche in &tranches[next..] {
                warn!(
                    "Funding tranche of {:.2} in {} falls after the last reported month {}",
                    tranche.amount, tranche.month, last
                );
            }
        }
        debug!(
            "Cumulative funding over {} month(s) from {} tranche(s)",
            cumulative.len(),
            tranches.len()
        );
        cumulative
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CostShare {
    pub line: String,
    pub total_planned: f64,
    /// Share of total planned spend, in percent.
    pub share_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FundingSummary {
    pub total_planned: f64,
    pub total_funding: f64,
    /// Funding minus planned spend. Negative means a shortfall.
    pub funding_gap: f64,
    /// Largest budget lines by planned spend, largest first.
    pub top_lines: Vec<CostShare>,
}

impl FundingSummary {
    pub fn build(
        report: &UtilizationReport,
        schedule: &FundingSchedule,
        top_n: usize,
        places: u32,
    ) -> Self {
        let total_planned = report
            .cumulative_data
            .values()
            .next_back()
            .map_or(0.0, |c| c.cumulative_planned);
        let total_funding = round_to(schedule.total(), places);

        let mut lines: Vec<(&String, f64)> = report
            .budget_lines
            .iter()
            .map(|(key, line)| (key, line.total_planned))
            .collect();
        lines.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let top_lines = lines
            .into_iter()
            .take(top_n)
            .map(|(key, planned)| CostShare {
                line: key.clone(),
                total_planned: planned,
                share_pct: if total_planned > 0.0 {
                    round_to(planned / total_planned * 100.0, places)
                } else {
                    0.0
                },
            })
            .collect();

        Self {
            total_planned,
            total_funding,
            funding_gap: round_to(total_funding - total_planned, places),
            top_lines,
        }
    }

    pub fn is_deficit(&self) -> bool {
        self.funding_gap < 0.0
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();
        output.push_str("# Funding Summary\n\n");
        output.push_str(&format!("- Total planned spend: {:.2}\n", self.total_planned));
        output.push_str(&format!("- Total funding: {:.2}\n", self.total_funding));
        output.push_str(&format!(
            "- Funding gap: {:.2} ({})\n\n",
            self.funding_gap,
            if self.is_deficit() { "DEFICIT" } else { "SURPLUS" }
        ));

        output.push_str("| # | Budget Line | Planned | Share |\n");
        output.push_str("|---:|---|---:|---:|\n");
        for (i, share) in self.top_lines.iter().enumerate() {
            output.push_str(&format!(
                "| {} | {} | {:.2} | {:.1}% |\n",
                i + 1,
                share.line,
                share.total_planned,
                share.share_pct
            ));
        }
        output
    }
}
