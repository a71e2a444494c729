//! Normalized financial statements
//!
//! Builds a per-fiscal-year table from XBRL company facts and derives the key
//! ratios. Only USD-denominated `us-gaap` facts are read; for each tag the
//! first reported value of a fiscal year wins.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::types::{AgentError, Result, as_f64};

pub const INCOME_TAGS: &[&str] = &[
    "Revenues",
    "CostOfRevenue",
    "GrossProfit",
    "OperatingExpenses",
    "OperatingIncomeLoss",
    "NetIncomeLoss",
];

pub const BALANCE_TAGS: &[&str] = &[
    "Assets",
    "Liabilities",
    "StockholdersEquity",
    "CashAndCashEquivalentsAtCarryingValue",
    "LongTermDebtNoncurrent",
];

pub const CASH_FLOW_TAGS: &[&str] = &[
    "NetCashProvidedByUsedInOperatingActivities",
    "NetCashProvidedByUsedInInvestingActivities",
    "NetCashProvidedByUsedInFinancingActivities",
    "PaymentsToAcquirePropertyPlantAndEquipment",
    "DepreciationDepletionAndAmortization",
];

/// (ratio, numerator tag, denominator tag)
pub const RATIOS: &[(&str, &str, &str)] = &[
    ("GrossMargin", "GrossProfit", "Revenues"),
    ("OperatingMargin", "OperatingIncomeLoss", "Revenues"),
    ("NetMargin", "NetIncomeLoss", "Revenues"),
    ("Leverage", "Liabilities", "StockholdersEquity"),
    ("ROA", "NetIncomeLoss", "Assets"),
    ("DebtToAssets", "LongTermDebtNoncurrent", "Assets"),
];

const ARTIFACT: &str = "company facts";

/// One fiscal year of reported values and derived ratios
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiscalYearRow {
    pub fiscal_year: i64,
    pub values: BTreeMap<String, f64>,
    pub ratios: BTreeMap<String, f64>,
}

impl FiscalYearRow {
    pub fn value(&self, tag: &str) -> Option<f64> {
        self.values.get(tag).copied()
    }

    pub fn ratio(&self, name: &str) -> Option<f64> {
        self.ratios.get(name).copied()
    }
}

/// Normalized dataset, rows sorted by ascending fiscal year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatiosTable {
    pub rows: Vec<FiscalYearRow>,
}

impl RatiosTable {
    /// Extract the statement tags from a company facts document.
    pub fn from_company_facts(facts: &Value) -> Result<Self> {
        let us_gaap = facts
            .get("facts")
            .and_then(|f| f.get("us-gaap"))
            .and_then(Value::as_object)
            .ok_or_else(|| AgentError::malformed(ARTIFACT, "no facts.us-gaap section"))?;

        let mut by_year: BTreeMap<i64, BTreeMap<String, f64>> = BTreeMap::new();
        for tag in INCOME_TAGS.iter().chain(BALANCE_TAGS).chain(CASH_FLOW_TAGS) {
            let Some(concept) = us_gaap.get(*tag) else {
                continue;
            };
            for (fy, value) in extract_series(concept) {
                by_year.entry(fy).or_default().insert(tag.to_string(), value);
            }
        }

        if by_year.is_empty() {
            return Err(AgentError::malformed(
                ARTIFACT,
                "no fiscal years reported for the statement tags",
            ));
        }

        let rows = by_year
            .into_iter()
            .map(|(fiscal_year, values)| {
                let ratios = compute_ratios(&values);
                FiscalYearRow {
                    fiscal_year,
                    values,
                    ratios,
                }
            })
            .collect();

        Ok(Self { rows })
    }

    pub fn fiscal_years(&self) -> Vec<i64> {
        self.rows.iter().map(|r| r.fiscal_year).collect()
    }

    pub fn latest(&self) -> Option<&FiscalYearRow> {
        self.rows.last()
    }

    /// The last `n` fiscal years, oldest first
    pub fn recent(&self, n: usize) -> &[FiscalYearRow] {
        let start = self.rows.len().saturating_sub(n);
        &self.rows[start..]
    }

    /// Compound annual revenue growth over the last `years` years.
    ///
    /// Needs `years + 1` fiscal years and positive revenue at both ends.
    pub fn revenue_cagr(&self, years: usize) -> Option<f64> {
        if years == 0 || self.rows.len() < years + 1 {
            return None;
        }
        let end = self.rows.last()?.value("Revenues")?;
        let start = self.rows[self.rows.len() - 1 - years].value("Revenues")?;
        if start > 0.0 && end > 0.0 {
            Some((end / start).powf(1.0 / years as f64) - 1.0)
        } else {
            None
        }
    }
}

/// (fiscal year, value) pairs from `units.USD`, first occurrence per year
fn extract_series(concept: &Value) -> Vec<(i64, f64)> {
    let Some(items) = concept
        .get("units")
        .and_then(|u| u.get("USD"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    let mut seen: BTreeMap<i64, f64> = BTreeMap::new();
    for item in items {
        if item.get("end").is_none() {
            continue;
        }
        let (Some(fy), Some(val)) = (
            item.get("fy").and_then(Value::as_i64),
            item.get("val").and_then(as_f64),
        ) else {
            continue;
        };
        seen.entry(fy).or_insert(val);
    }
    seen.into_iter().collect()
}

fn compute_ratios(values: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    RATIOS
        .iter()
        .filter_map(|(name, numerator, denominator)| {
            let num = values.get(*numerator)?;
            let den = values.get(*denominator)?;
            (*den != 0.0).then(|| (name.to_string(), num / den))
        })
        .collect()
}
