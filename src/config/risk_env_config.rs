use crate::config::parse_env;
use crate::domain::risk::context::StrategyKind;
use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

/// Per-strategy caps and per-symbol risk overrides.
#[derive(Debug, Clone)]
pub struct RiskEnvConfig {
    /// Daily loss cap as a percentage of equity, per strategy.
    pub max_daily_loss_pct_low: Decimal,
    pub max_daily_loss_pct_high: Decimal,
    /// Trades per day, per strategy.
    pub max_trades_low: u32,
    pub max_trades_high: u32,
    /// Per-trade risk percentage, per strategy.
    pub risk_percent_low: Decimal,
    pub risk_percent_high: Decimal,
    /// Per-symbol overrides take precedence over the strategy default.
    pub symbol_risk_percent: HashMap<String, Decimal>,
    pub starting_equity: Decimal,
}

impl RiskEnvConfig {
    pub fn from_env() -> Result<Self> {
        let mut symbol_risk_percent = HashMap::new();
        // Gold carries a smaller default risk share
        symbol_risk_percent.insert("XAUUSD".to_string(), parse_env("RISK_PERCENT_XAUUSD", "0.5")?);

        Ok(Self {
            max_daily_loss_pct_low: parse_env("MAX_DAILY_LOSS_PCT_LOW", "2")?,
            max_daily_loss_pct_high: parse_env("MAX_DAILY_LOSS_PCT_HIGH", "4")?,
            max_trades_low: parse_env("MAX_TRADES_LOW", "3")?,
            max_trades_high: parse_env("MAX_TRADES_HIGH", "8")?,
            risk_percent_low: parse_env("RISK_PERCENT_LOW", "0.5")?,
            risk_percent_high: parse_env("RISK_PERCENT_HIGH", "1.0")?,
            symbol_risk_percent,
            starting_equity: parse_env("STARTING_EQUITY", "10000")?,
        })
    }

    pub fn max_daily_loss_pct(&self, strategy: StrategyKind) -> Decimal {
        match strategy {
            StrategyKind::Low => self.max_daily_loss_pct_low,
            StrategyKind::High => self.max_daily_loss_pct_high,
        }
    }

    pub fn max_trades(&self, strategy: StrategyKind) -> u32 {
        match strategy {
            StrategyKind::Low => self.max_trades_low,
            StrategyKind::High => self.max_trades_high,
        }
    }

    /// Per-trade risk percent; symbol overrides win over strategy defaults.
    pub fn risk_percent(&self, strategy: StrategyKind, symbol: Option<&str>) -> Decimal {
        if let Some(symbol) = symbol
            && let Some(pct) = self.symbol_risk_percent.get(symbol)
        {
            return *pct;
        }
        match strategy {
            StrategyKind::Low => self.risk_percent_low,
            StrategyKind::High => self.risk_percent_high,
        }
    }
}

impl Default for RiskEnvConfig {
    fn default() -> Self {
        let mut symbol_risk_percent = HashMap::new();
        symbol_risk_percent.insert("XAUUSD".to_string(), dec!(0.5));
        Self {
            max_daily_loss_pct_low: dec!(2),
            max_daily_loss_pct_high: dec!(4),
            max_trades_low: 3,
            max_trades_high: 8,
            risk_percent_low: dec!(0.5),
            risk_percent_high: dec!(1.0),
            symbol_risk_percent,
            starting_equity: dec!(10000),
        }
    }
}
