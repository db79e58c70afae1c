use crate::domain::news::GuardrailMode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Strategy risk profile. Low takes fewer, tighter-risk trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Low,
    High,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Low => write!(f, "low"),
            StrategyKind::High => write!(f, "high"),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(StrategyKind::Low),
            "high" => Ok(StrategyKind::High),
            _ => anyhow::bail!("Invalid strategy: {}. Must be 'low' or 'high'", s),
        }
    }
}

/// Inputs the risk service needs to admit a new trade.
#[derive(Debug, Clone)]
pub struct RiskContext {
    pub strategy: StrategyKind,
    pub account_equity: Decimal,
    pub today_realized_pnl: Decimal,
    pub trades_taken_today: u32,
    pub guardrail_mode: GuardrailMode,
    pub symbol: Option<String>,
}

/// Verdict of `can_take_new_trade`.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskDecision {
    pub allowed: bool,
    pub reason: Option<String>,
    pub adjusted_risk_percent: Option<Decimal>,
}

impl RiskDecision {
    pub fn allow(risk_percent: Decimal) -> Self {
        Self {
            allowed: true,
            reason: None,
            adjusted_risk_percent: Some(risk_percent),
        }
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            adjusted_risk_percent: None,
        }
    }
}
