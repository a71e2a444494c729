//! Valuation Engine
//!
//! Consumes the normalized dataset plus market and macro context and
//! returns a fair-value estimate.
//!
//! ## Default model
//!
//! - **DCF**: free cash flow grown for `projection_years` at the 3-year
//!   revenue CAGR (clamped), discounted at WACC, plus a Gordon terminal value
//! - **Relative**: positive earnings (or FCF) times the peer median P/E
//! - **Blend**: `dcf_weight * dcf + (1 - dcf_weight) * relative`

use serde::{Deserialize, Serialize};

use crate::config::ValuationConfig;
use crate::financials::RatiosTable;
use crate::types::{AgentError, Result};

/// Everything the engine needs, assembled from prior artifacts
#[derive(Debug, Clone)]
pub struct ValuationInput {
    pub table: RatiosTable,
    /// Target market capitalization, when the quote reported one
    pub market_cap: Option<f64>,
    /// Peer median trailing P/E, when any peer reported one
    pub peer_pe: Option<f64>,
    pub risk_free_rate: f64,
    pub market_risk_premium: f64,
}

/// A documented default substituted for a missing input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationFallback {
    pub input: String,
    pub value: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationInputs {
    pub net_income: Option<f64>,
    pub operating_cf: Option<f64>,
    pub capex: f64,
    pub depreciation: f64,
    pub revenues: Option<f64>,
    pub assets: Option<f64>,
    pub debt: f64,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationDetails {
    pub latest_year: i64,
    pub growth_assumption: f64,
    pub last_fcf: f64,
    pub wacc: f64,
    pub discount_rate: f64,
    pub peer_pe: f64,
    pub inputs: ValuationInputs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationResult {
    pub dcf_value: f64,
    pub relative_value: f64,
    pub blended_value: f64,
    pub details: ValuationDetails,
    #[serde(default)]
    pub fallbacks: Vec<ValuationFallback>,
}

pub trait ValuationEngine: Send + Sync {
    fn name(&self) -> &str;

    fn value(&self, input: &ValuationInput) -> Result<ValuationResult>;
}

// =============================================================================
// Model Functions
// =============================================================================

/// Weighted average cost of capital; cost of equity alone when V <= 0
pub fn estimate_wacc(
    risk_free: f64,
    beta: f64,
    market_premium: f64,
    debt_cost: f64,
    tax_rate: f64,
    debt: f64,
    equity: f64,
) -> f64 {
    let cost_of_equity = risk_free + beta * market_premium;
    let total = debt + equity;
    if total <= 0.0 {
        return cost_of_equity;
    }
    let w_e = equity / total;
    let w_d = debt / total;
    w_e * cost_of_equity + w_d * debt_cost * (1.0 - tax_rate)
}

/// Present value of projected cash flows plus terminal value.
/// The terminal value is zero when `wacc <= terminal_growth`.
pub fn dcf_value(last_fcf: f64, growth: f64, years: u32, wacc: f64, terminal_growth: f64) -> f64 {
    if years == 0 {
        return last_fcf.max(0.0);
    }
    let mut fcf = last_fcf;
    let mut pv = 0.0;
    for t in 1..=years {
        fcf *= 1.0 + growth;
        pv += fcf / (1.0 + wacc).powi(t as i32);
    }
    let terminal = if wacc > terminal_growth {
        fcf * (1.0 + terminal_growth) / (wacc - terminal_growth)
    } else {
        0.0
    };
    pv + terminal / (1.0 + wacc).powi(years as i32)
}

pub fn blend(dcf: f64, relative: f64, dcf_weight: f64) -> f64 {
    dcf_weight * dcf + (1.0 - dcf_weight) * relative
}

// =============================================================================
// Default Engine
// =============================================================================

pub struct DefaultValuationEngine {
    config: ValuationConfig,
}

impl DefaultValuationEngine {
    pub fn new(config: ValuationConfig) -> Self {
        Self { config }
    }
}

impl Default for DefaultValuationEngine {
    fn default() -> Self {
        Self::new(ValuationConfig::default())
    }
}

impl ValuationEngine for DefaultValuationEngine {
    fn name(&self) -> &str {
        "dcf-relative-blend"
    }

    fn value(&self, input: &ValuationInput) -> Result<ValuationResult> {
        let c = &self.config;
        let latest = input
            .table
            .latest()
            .ok_or_else(|| AgentError::Valuation("normalized dataset has no fiscal years".into()))?;

        let net_income = latest.value("NetIncomeLoss");
        let operating_cf = latest.value("NetCashProvidedByUsedInOperatingActivities");
        let capex = latest
            .value("PaymentsToAcquirePropertyPlantAndEquipment")
            .unwrap_or(0.0);
        let depreciation = latest
            .value("DepreciationDepletionAndAmortization")
            .unwrap_or(0.0);
        let revenues = latest.value("Revenues");
        let assets = latest.value("Assets");
        let debt = latest.value("LongTermDebtNoncurrent").unwrap_or(0.0);

        let mut fallbacks = Vec::new();

        let last_fcf = match operating_cf {
            Some(ocf) => ocf - capex,
            None => net_income.unwrap_or(0.0) + depreciation - capex,
        };

        let growth = match input.table.revenue_cagr(3) {
            Some(cagr) => cagr,
            None => {
                fallbacks.push(ValuationFallback {
                    input: "growth".to_string(),
                    value: c.default_growth,
                    reason: "fewer than four fiscal years of positive revenue".to_string(),
                });
                c.default_growth
            }
        };

        let equity = match input.market_cap.filter(|mc| *mc > 0.0) {
            Some(mc) => mc,
            None => (assets.unwrap_or(0.0) - debt).max(1.0),
        };

        let wacc = estimate_wacc(
            input.risk_free_rate,
            c.beta,
            input.market_risk_premium,
            c.debt_cost,
            c.tax_rate,
            debt,
            equity,
        );
        let discount_rate = wacc.max(c.wacc_floor);

        let dcf = dcf_value(
            last_fcf.max(0.0),
            growth.clamp(c.growth_floor, c.growth_cap),
            c.projection_years,
            discount_rate,
            c.terminal_growth,
        );

        let peer_pe = match input.peer_pe.filter(|pe| *pe > 0.0) {
            Some(pe) => pe,
            None => {
                fallbacks.push(ValuationFallback {
                    input: "peer_pe".to_string(),
                    value: c.default_peer_pe,
                    reason: "no peer reported a positive trailing P/E".to_string(),
                });
                c.default_peer_pe
            }
        };

        let earnings = match net_income {
            Some(ni) if ni > 0.0 => ni,
            _ => last_fcf,
        };
        let relative = earnings.max(1.0) * peer_pe;
        let blended = blend(dcf, relative, c.dcf_weight);

        if !blended.is_finite() {
            return Err(AgentError::Valuation(format!(
                "blended value is not finite (dcf {}, relative {})",
                dcf, relative
            )));
        }

        Ok(ValuationResult {
            dcf_value: dcf,
            relative_value: relative,
            blended_value: blended,
            details: ValuationDetails {
                latest_year: latest.fiscal_year,
                growth_assumption: growth,
                last_fcf,
                wacc,
                discount_rate,
                peer_pe,
                inputs: ValuationInputs {
                    net_income,
                    operating_cf,
                    capex,
                    depreciation,
                    revenues,
                    assets,
                    debt,
                    equity,
                },
            },
            fallbacks,
        })
    }
}
