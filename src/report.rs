use crate::error::Result;
use crate::month::MonthKey;
use crate::utils::round_to;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Planned vs. spent figures for one month, either for a single budget line
/// or summed across all lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MonthlyFigures {
    pub planned: f64,
    pub claims: f64,
    /// Externally sourced (ERP) actuals.
    #[serde(rename = "d365")]
    pub external_actuals: f64,
    pub total_spent: f64,
    pub variance: f64,
}

impl MonthlyFigures {
    pub fn new(planned: f64, claims: f64, external_actuals: f64, places: u32) -> Self {
        let total_spent = round_to(claims + external_actuals, places);
        Self {
            planned: round_to(planned, places),
            claims: round_to(claims, places),
            external_actuals: round_to(external_actuals, places),
            total_spent,
            variance: round_to(planned - total_spent, places),
        }
    }

    /// Adds `other` in place. Variance is recomputed from the new totals.
    pub fn accumulate(&mut self, other: &MonthlyFigures, places: u32) {
        self.planned = round_to(self.planned + other.planned, places);
        self.claims = round_to(self.claims + other.claims, places);
        self.external_actuals = round_to(self.external_actuals + other.external_actuals, places);
        self.total_spent = round_to(self.total_spent + other.total_spent, places);
        self.variance = round_to(self.planned - self.total_spent, places);
    }

    pub fn is_zero(&self) -> bool {
        self.planned == 0.0 && self.total_spent == 0.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CumulativeFigures {
    pub cumulative_planned: f64,
    pub cumulative_spent: f64,
    pub cumulative_variance: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GrandTotals {
    pub total_planned: f64,
    pub total_spent: f64,
    pub total_variance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BudgetLine {
    pub budget_head: String,
    pub vendor_role_category: Option<String>,
    /// Distinct cost heads in first-seen order.
    pub cost_heads: Vec<String>,
    pub total_planned: f64,
    pub total_spent: f64,
    pub total_variance: f64,
    /// Sum of the sheet's own plan-total column, when the sheet has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_total_planned: Option<f64>,
    pub monthly_data: BTreeMap<MonthKey, MonthlyFigures>,
}

impl BudgetLine {
    pub fn new(budget_head: String, vendor_role_category: Option<String>) -> Self {
        Self {
            budget_head,
            vendor_role_category,
            cost_heads: Vec::new(),
            total_planned: 0.0,
            total_spent: 0.0,
            total_variance: 0.0,
            declared_total_planned: None,
            monthly_data: BTreeMap::new(),
        }
    }

    /// `"{budget_head} - {vendor_role}"`, or the budget head alone.
    pub fn composite_key(budget_head: &str, vendor_role: Option<&str>) -> String {
        match vendor_role {
            Some(role) => format!("{} - {}", budget_head, role),
            None => budget_head.to_string(),
        }
    }

    pub fn add_cost_head(&mut self, cost_head: &str) {
        if !cost_head.is_empty() && !self.cost_heads.iter().any(|c| c == cost_head) {
            self.cost_heads.push(cost_head.to_string());
        }
    }
}

/// Output of one processed sheet. Serializes to exactly four top-level keys;
/// month-keyed maps come out in chronological order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UtilizationReport {
    pub monthly_data: BTreeMap<MonthKey, MonthlyFigures>,
    pub cumulative_data: BTreeMap<MonthKey, CumulativeFigures>,
    pub budget_lines: BTreeMap<String, BudgetLine>,
    pub grand_totals: GrandTotals,
}

impl UtilizationReport {
    pub fn first_month(&self) -> Option<MonthKey> {
        self.monthly_data.keys().next().copied()
    }

    pub fn last_month(&self) -> Option<MonthKey> {
        self.monthly_data.keys().next_back().copied()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Monthly and cumulative series as one chronological table.
    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record([
            "month",
            "planned",
            "claims",
            "d365",
            "total_spent",
            "variance",
            "cumulative_planned",
            "cumulative_spent",
            "cumulative_variance",
        ])?;

        for (month, figures) in &self.monthly_data {
            let cumulative = self.cumulative_data.get(month).copied().unwrap_or_default();
            writer.write_record([
                month.to_string(),
                format!("{:.2}", figures.planned),
                format!("{:.2}", figures.claims),
                format!("{:.2}", figures.external_actuals),
                format!("{:.2}", figures.total_spent),
                format!("{:.2}", figures.variance),
                format!("{:.2}", cumulative.cumulative_planned),
                format!("{:.2}", cumulative.cumulative_spent),
                format!("{:.2}", cumulative.cumulative_variance),
            ])?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();
        output.push_str("# Budget Utilization\n\n");

        if let (Some(first), Some(last)) = (self.first_month(), self.last_month()) {
            output.push_str(&format!("Period: {} to {}\n\n", first, last));
        }

        output.push_str("| Budget Line | Cost Heads | Planned | Spent | Variance |\n");
        output.push_str("|---|---|---:|---:|---:|\n");
        for (key, line) in &self.budget_lines {
            let flag = if line.total_variance < 0.0 { " [OVERSPENT]" } else { "" };
            output.push_str(&format!(
                "| {}{} | {} | {:.2} | {:.2} | {:.2} |\n",
                key,
                flag,
                line.cost_heads.join(", "),
                line.total_planned,
                line.total_spent,
                line.total_variance
            ));
        }

        output.push_str(&format!(
            "| **Total** | | {:.2} | {:.2} | {:.2} |\n",
            self.grand_totals.total_planned,
            self.grand_totals.total_spent,
            self.grand_totals.total_variance
        ));
        output
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(UtilizationReport)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}
