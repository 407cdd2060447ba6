use crate::error::{Result, UtilizationError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct MonthName {
    #[schemars(description = "Lowercase month name or abbreviation (e.g. 'april', 'apr', 'sept')")]
    pub name: String,

    #[schemars(description = "Calendar month number, 1 = January")]
    pub month: u32,
}

impl MonthName {
    pub fn new(name: &str, month: u32) -> Self {
        Self {
            name: name.to_string(),
            month,
        }
    }
}

pub fn default_month_names() -> Vec<MonthName> {
    const FULL: [&str; 12] = [
        "january",
        "february",
        "march",
        "april",
        "may",
        "june",
        "july",
        "august",
        "september",
        "october",
        "november",
        "december",
    ];

    let mut names: Vec<MonthName> = FULL
        .iter()
        .zip(1..=12)
        .map(|(name, month)| MonthName::new(name, month))
        .collect();
    names.extend(
        FULL.iter()
            .zip(1..=12)
            .filter(|(name, _)| name.len() > 3)
            .map(|(name, month)| MonthName::new(&name[..3], month)),
    );
    names.push(MonthName::new("sept", 9));
    names
}

/// Keyword vocabularies. Every entry is matched as a lowercase substring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct RoleKeywords {
    #[schemars(description = "Header labels identifying the budget head column")]
    pub budget_head: Vec<String>,

    #[schemars(description = "Header labels identifying the optional vendor/role column")]
    pub vendor_role: Vec<String>,

    #[schemars(description = "Header labels identifying the cost head column")]
    pub cost_head: Vec<String>,

    #[schemars(description = "Header labels identifying the optional plan total column")]
    pub plan_total: Vec<String>,

    #[schemars(
        description = "A plan total header must also contain one of these (e.g. 'plan'), so plain 'Total' columns are not taken"
    )]
    pub plan_total_qualifiers: Vec<String>,

    #[schemars(description = "Month header keywords marking a planned-spend column")]
    pub plan: Vec<String>,

    #[schemars(description = "Month header keywords marking a claims column")]
    pub claims: Vec<String>,

    #[schemars(description = "Month header keywords marking an externally sourced actuals column")]
    pub external_actuals: Vec<String>,

    #[schemars(
        description = "Literal token prefixing externally sourced actuals headers (e.g. 'D365 Apr-25'); stripped before the date is parsed"
    )]
    pub actuals_marker: String,

    #[schemars(description = "Budget head text marking subtotal rows that must not be counted")]
    pub subtotal_markers: Vec<String>,

    #[schemars(description = "Budget head text containing any of these marks a leftover header row")]
    pub header_label_markers: Vec<String>,

    #[schemars(
        description = "Budget head text equal to one of these (e.g. 's.no', '#') marks a row-number header row"
    )]
    pub row_number_markers: Vec<String>,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for RoleKeywords {
    fn default() -> Self {
        Self {
            budget_head: words(&["budget head", "budget_head", "budget", "head"]),
            vendor_role: words(&["vendor", "role", "vendor/role", "category", "vendor role"]),
            cost_head: words(&["cost head", "cost_head", "cost", "item", "line item"]),
            plan_total: words(&["plan total", "total plan", "total", "grand total"]),
            plan_total_qualifiers: words(&["plan", "budget"]),
            plan: words(&["plan", "planned", "budget", "projected", "forecast"]),
            claims: words(&["claim", "actual", "invoice", "spent"]),
            external_actuals: words(&["d365", "system", "erp"]),
            actuals_marker: "d365".to_string(),
            subtotal_markers: words(&["total", "subtotal", "grand"]),
            header_label_markers: words(&["budget", "head"]),
            row_number_markers: words(&["s.no", "sr.no", "sl.no", "#"]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct UtilizationConfig {
    #[schemars(description = "Number of leading rows searched for header labels")]
    pub header_search_rows: usize,

    #[schemars(description = "Number of rows probed after the header for the first data row")]
    pub data_probe_rows: usize,

    #[schemars(description = "Data start row used when probing finds no data row")]
    pub fallback_data_start_row: usize,

    #[schemars(description = "Omit months whose planned and spent amounts are both zero")]
    pub sparse_storage: bool,

    #[schemars(description = "Decimal places monetary values are rounded to")]
    pub decimal_places: u32,

    pub keywords: RoleKeywords,

    #[schemars(description = "Month names and abbreviations recognised in headers")]
    pub month_names: Vec<MonthName>,
}

impl Default for UtilizationConfig {
    fn default() -> Self {
        Self {
            header_search_rows: 6,
            data_probe_rows: 10,
            fallback_data_start_row: 6,
            sparse_storage: true,
            decimal_places: 2,
            keywords: RoleKeywords::default(),
            month_names: default_month_names(),
        }
    }
}

impl UtilizationConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.header_search_rows == 0 {
            return Err(UtilizationError::InvalidConfig(
                "header_search_rows must be at least 1".to_string(),
            ));
        }

        if self.decimal_places > 10 {
            return Err(UtilizationError::InvalidConfig(format!(
                "decimal_places {} is out of range 0..=10",
                self.decimal_places
            )));
        }

        let required = [
            ("budget_head", &self.keywords.budget_head),
            ("cost_head", &self.keywords.cost_head),
            ("plan", &self.keywords.plan),
            ("claims", &self.keywords.claims),
            ("external_actuals", &self.keywords.external_actuals),
        ];
        for (name, list) in required {
            if list.iter().all(|k| k.trim().is_empty()) {
                return Err(UtilizationError::InvalidConfig(format!(
                    "keyword list '{}' is empty",
                    name
                )));
            }
        }

        if self.month_names.is_empty() {
            return Err(UtilizationError::InvalidConfig(
                "month_names table is empty".to_string(),
            ));
        }
        for entry in &self.month_names {
            if !(1..=12).contains(&entry.month) {
                return Err(UtilizationError::InvalidConfig(format!(
                    "month name '{}' maps to invalid month {}",
                    entry.name, entry.month
                )));
            }
            if entry.name.trim().is_empty() || !entry.name.chars().all(|c| c.is_alphabetic()) {
                return Err(UtilizationError::InvalidConfig(format!(
                    "month name '{}' must be a single alphabetic word",
                    entry.name
                )));
            }
        }

        Ok(())
    }

    /// Row indices of the header search window.
    pub fn header_rows(&self) -> Vec<usize> {
        (0..self.header_search_rows).collect()
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(UtilizationConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}
