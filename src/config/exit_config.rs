use crate::config::{env_or, parse_env};
use crate::domain::exit::TrailMode;
use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct ExitConfig {
    pub poll_interval_sec: u64,
    pub break_even_enabled: bool,
    /// Trigger in units of initial risk R.
    pub break_even_trigger_r: Decimal,
    pub partial_enabled: bool,
    /// Fraction of volume closed at TP1.
    pub partial_close_percent: Decimal,
    pub trail_mode: TrailMode,
    /// Pips for fixed_pips, ATR multiple for atr / volatility_adaptive.
    pub trail_value: Decimal,
    pub structural_exit_enabled: bool,
    pub time_limit_seconds: Option<i64>,
    pub commission_exit_enabled: bool,
    /// Minimum position age before the commission exit may fire.
    pub commission_exit_dwell_secs: i64,
}

impl ExitConfig {
    pub fn from_env() -> Result<Self> {
        let time_limit: i64 = parse_env("EXIT_TIME_LIMIT_SECONDS", "0")?;
        Ok(Self {
            poll_interval_sec: parse_env("EXIT_POLL_INTERVAL_SEC", "5")?,
            break_even_enabled: parse_env("EXIT_BREAK_EVEN_ENABLED", "true")?,
            break_even_trigger_r: parse_env("EXIT_BREAK_EVEN_TRIGGER_R", "1")?,
            partial_enabled: parse_env("EXIT_PARTIAL_ENABLED", "true")?,
            partial_close_percent: parse_env("EXIT_PARTIAL_CLOSE_PERCENT", "0.5")?,
            trail_mode: TrailMode::from_str(&env_or("EXIT_TRAIL_MODE", "fixed_pips"))?,
            trail_value: parse_env("EXIT_TRAIL_VALUE", "20")?,
            structural_exit_enabled: parse_env("EXIT_STRUCTURAL_ENABLED", "true")?,
            time_limit_seconds: (time_limit > 0).then_some(time_limit),
            commission_exit_enabled: parse_env("EXIT_COMMISSION_ENABLED", "true")?,
            commission_exit_dwell_secs: parse_env("EXIT_COMMISSION_DWELL_SECS", "1800")?,
        })
    }
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            poll_interval_sec: 5,
            break_even_enabled: true,
            break_even_trigger_r: dec!(1),
            partial_enabled: true,
            partial_close_percent: dec!(0.5),
            trail_mode: TrailMode::FixedPips,
            trail_value: dec!(20),
            structural_exit_enabled: true,
            time_limit_seconds: None,
            commission_exit_enabled: true,
            commission_exit_dwell_secs: 1800,
        }
    }
}
