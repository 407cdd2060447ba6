//! Month keys and the free-text month normalizer.
//!
//! Headers arrive in many spellings ("Apr-25", "April 2025", "4/25",
//! "2025-04-01"). They all collapse to one [`MonthKey`], rendered `YYYY-MM`.

use crate::error::Result;
use crate::schema::{default_month_names, MonthName};
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// One calendar month. Ordering is chronological, which matches the lexical
/// order of the `YYYY-MM` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if !(0..=9999).contains(&year) {
            return None;
        }
        NaiveDate::from_ymd_opt(year, month, 1).map(|_| Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || format!("Invalid month key '{}'. Expected YYYY-MM", s);
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        MonthKey::new(year, month).ok_or_else(invalid)
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MonthKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

impl JsonSchema for MonthKey {
    fn schema_name() -> String {
        "MonthKey".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        String::json_schema(gen)
    }
}

pub struct MonthNormalizer {
    iso: Regex,
    name_year: Regex,
    numeric: Regex,
    month_token: Regex,
    months: Vec<MonthName>,
}

impl MonthNormalizer {
    pub fn new(months: &[MonthName]) -> Result<Self> {
        let mut names: Vec<String> = months.iter().map(|m| m.name.to_lowercase()).collect();
        names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        names.dedup();
        let alternation = names
            .iter()
            .map(|n| regex::escape(n))
            .collect::<Vec<_>>()
            .join("|");

        Ok(Self {
            iso: Regex::new(r"^(\d{4})[\s\-/.]+(\d{1,2})\b")?,
            name_year: Regex::new(r"([a-z]+)[\s\-/.,']*(\d{4}|\d{2})\b")?,
            numeric: Regex::new(r"\b(\d{1,2})[\s\-/]+(\d{4}|\d{2})\b")?,
            month_token: Regex::new(&format!("(?:^|[^a-z])(?:{})(?:[^a-z]|$)", alternation))?,
            months: months
                .iter()
                .map(|m| MonthName::new(&m.name.to_lowercase(), m.month))
                .collect(),
        })
    }

    pub fn normalize(&self, text: &str) -> Option<MonthKey> {
        let text = text.trim().to_lowercase();
        if text.is_empty() {
            return None;
        }

        self.parse_iso(&text)
            .or_else(|| self.parse_name_year(&text))
            .or_else(|| self.parse_numeric(&text))
    }

    /// Whether the text carries a month name or abbreviation token.
    pub fn is_month_like(&self, text: &str) -> bool {
        self.month_token.is_match(&text.to_lowercase())
    }

    /// Exact table hit first, then the prefix rule ("sept" <-> "september").
    pub fn lookup_month(&self, word: &str) -> Option<u32> {
        if let Some(entry) = self.months.iter().find(|m| m.name == word) {
            return Some(entry.month);
        }
        if word.len() < 3 {
            return None;
        }
        self.months
            .iter()
            .filter(|m| m.name.len() >= 3)
            .find(|m| m.name.starts_with(word) || word.starts_with(m.name.as_str()))
            .map(|m| m.month)
    }

    fn parse_iso(&self, text: &str) -> Option<MonthKey> {
        let caps = self.iso.captures(text)?;
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        MonthKey::new(year, month)
    }

    fn parse_name_year(&self, text: &str) -> Option<MonthKey> {
        self.name_year.captures_iter(text).find_map(|caps| {
            let month = self.lookup_month(&caps[1])?;
            let year = expand_year(&caps[2])?;
            MonthKey::new(year, month)
        })
    }

    fn parse_numeric(&self, text: &str) -> Option<MonthKey> {
        self.numeric.captures_iter(text).find_map(|caps| {
            let month: u32 = caps[1].parse().ok()?;
            let year = expand_year(&caps[2])?;
            MonthKey::new(year, month)
        })
    }
}

/// Two-digit years are read as 20YY.
fn expand_year(token: &str) -> Option<i32> {
    match token.len() {
        2 => format!("20{}", token).parse().ok(),
        4 => token.parse().ok(),
        _ => None,
    }
}

fn default_normalizer() -> Option<&'static MonthNormalizer> {
    static DEFAULT: OnceLock<Option<MonthNormalizer>> = OnceLock::new();
    DEFAULT
        .get_or_init(|| MonthNormalizer::new(&default_month_names()).ok())
        .as_ref()
}

/// Normalizes free text to a month key using the built-in month table.
/// Returns `None` for anything unparseable.
pub fn normalize_month(text: &str) -> Option<MonthKey> {
    default_normalizer()?.normalize(text)
}
