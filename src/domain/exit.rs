use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailMode {
    Atr,
    FixedPips,
    Structure,
    VolatilityAdaptive,
}

impl FromStr for TrailMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "atr" => Ok(TrailMode::Atr),
            "fixed_pips" => Ok(TrailMode::FixedPips),
            "structure" => Ok(TrailMode::Structure),
            "volatility_adaptive" => Ok(TrailMode::VolatilityAdaptive),
            _ => anyhow::bail!(
                "Invalid trail mode: {}. Valid: atr, fixed_pips, structure, volatility_adaptive",
                s
            ),
        }
    }
}

/// Per-trade exit instructions, stored when the trade is opened.
///
/// The break-even trigger is expressed in units of initial risk R (1R by
/// default), not absolute pips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitPlan {
    pub entry_price: Decimal,
    pub stop_loss_initial: Decimal,
    pub tp1: Decimal,
    pub break_even_trigger_r: Decimal,
    /// Fraction of volume closed at TP1, 0..=1.
    pub partial_close_percent: Decimal,
    pub trail_mode: TrailMode,
    pub trail_value: Decimal,
    pub time_limit_seconds: Option<i64>,
}

impl ExitPlan {
    /// One unit of initial risk in price terms.
    pub fn initial_risk(&self) -> Decimal {
        (self.entry_price - self.stop_loss_initial).abs()
    }
}

/// Mutable per-ticket progress so exit actions stay idempotent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExitProgress {
    pub break_even_done: bool,
    pub partial_done: bool,
    pub last_trail_stop: Option<Decimal>,
}
