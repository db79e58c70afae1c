//! Configuration for the trading engine.
//!
//! Everything is loaded from environment variables (with `.env` support),
//! organized by domain: engine core, execution-filter rules, risk, kill
//! switch, order flow and exits.

mod exit_config;
mod filter_rules;
mod kill_switch_config;
mod order_flow_config;
mod risk_env_config;

pub use exit_config::ExitConfig;
pub use filter_rules::{ExecutionFilterConfig, SymbolRules};
pub use kill_switch_config::KillSwitchConfig;
pub use order_flow_config::OrderFlowConfig;
pub use risk_env_config::RiskEnvConfig;

use crate::domain::market::timeframe::Timeframe;
use crate::domain::risk::context::StrategyKind;
use anyhow::{Context, Result};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

pub(crate) fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub(crate) fn parse_env<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    <T as FromStr>::Err: std::fmt::Display,
{
    let raw = env_or(key, default);
    raw.parse::<T>()
        .map_err(|e| anyhow::anyhow!("Invalid {}: '{}' ({})", key, raw, e))
}

/// Top-level engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Cadence of the decision pipeline.
    pub tick_interval_seconds: u64,
    pub symbols: Vec<String>,
    /// Risk profile this engine instance trades.
    pub strategy: StrategyKind,
    /// Timezone for sessions, daily rollover and kill-switch auto-resume.
    pub timezone: Tz,

    // Market data
    pub max_candles: usize,
    pub price_poll_interval_ms: u64,
    pub price_poll_max_retries: u32,
    pub backfill_m1_bars: usize,

    // SMC timeframes and targets
    pub smc_htf: Timeframe,
    pub smc_ltf: Timeframe,
    pub smc_risk_reward: Decimal,

    // Exposure
    pub exposure_poll_interval_sec: u64,
    pub exposure_max_age_sec: i64,
    pub loss_streak_threshold: u32,
    pub loss_streak_pause_minutes: i64,
    /// Conservative per-trade risk estimate when a stop is unknown.
    pub default_risk_per_trade: Decimal,
    pub max_concurrent_trades_global: usize,
    pub max_daily_risk_global: Decimal,

    // Collaborator endpoints
    pub broker_base_url: String,
    pub news_base_url: String,
    pub database_url: String,
    pub http_bind: String,
    pub magic_number: i64,

    // Sub-configs
    pub filter: ExecutionFilterConfig,
    pub risk: RiskEnvConfig,
    pub kill_switch: KillSwitchConfig,
    pub order_flow: OrderFlowConfig,
    pub exit: ExitConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let symbols: Vec<String> = env_or("SYMBOLS", "XAUUSD,EURUSD,GBPUSD,US30")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if symbols.is_empty() {
            anyhow::bail!("SYMBOLS must name at least one symbol");
        }

        let timezone: Tz = env_or("ENGINE_TIMEZONE", "Europe/London")
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid ENGINE_TIMEZONE: {}", e))?;

        Ok(Self {
            tick_interval_seconds: parse_env("TICK_INTERVAL_SECONDS", "30")?,
            symbols: symbols.clone(),
            strategy: StrategyKind::from_str(&env_or("STRATEGY", "low"))?,
            timezone,
            max_candles: parse_env("MAX_CANDLES", "20000")?,
            price_poll_interval_ms: parse_env("PRICE_POLL_INTERVAL_MS", "1000")?,
            price_poll_max_retries: parse_env("PRICE_POLL_MAX_RETRIES", "3")?,
            backfill_m1_bars: parse_env("BACKFILL_M1_BARS", "14400")?,
            smc_htf: Timeframe::from_str(&env_or("SMC_HTF", "H4"))?,
            smc_ltf: Timeframe::from_str(&env_or("SMC_LTF", "M1"))?,
            smc_risk_reward: parse_env("SMC_RISK_REWARD", "3")?,
            exposure_poll_interval_sec: parse_env("EXPOSURE_POLL_INTERVAL_SEC", "10")?,
            exposure_max_age_sec: parse_env("EXPOSURE_MAX_AGE_SEC", "60")?,
            loss_streak_threshold: parse_env("LOSS_STREAK_THRESHOLD", "3")?,
            loss_streak_pause_minutes: parse_env("LOSS_STREAK_PAUSE_MINUTES", "120")?,
            default_risk_per_trade: parse_env("DEFAULT_RISK_PER_TRADE", "100")?,
            max_concurrent_trades_global: parse_env("MAX_CONCURRENT_TRADES_GLOBAL", "6")?,
            max_daily_risk_global: parse_env("MAX_DAILY_RISK_GLOBAL", "1500")?,
            broker_base_url: env_or("BROKER_BASE_URL", "http://127.0.0.1:8787"),
            news_base_url: env_or("NEWS_BASE_URL", "http://127.0.0.1:8788"),
            database_url: env_or("DATABASE_URL", "sqlite://data/aegis.db"),
            http_bind: env_or("HTTP_BIND", "0.0.0.0:8080"),
            magic_number: parse_env("MAGIC_NUMBER", "990042")?,
            filter: ExecutionFilterConfig::from_env(&symbols)
                .context("Failed to load execution filter rules")?,
            risk: RiskEnvConfig::from_env().context("Failed to load risk config")?,
            kill_switch: KillSwitchConfig::from_env().context("Failed to load kill switch config")?,
            order_flow: OrderFlowConfig::from_env().context("Failed to load order flow config")?,
            exit: ExitConfig::from_env().context("Failed to load exit config")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_loads() {
        let config = Config::from_env().expect("defaults must parse");
        assert!(config.symbols.contains(&"XAUUSD".to_string()));
        assert_eq!(config.smc_htf, Timeframe::H4);
        assert!(config.tick_interval_seconds > 0);
        assert!(config.filter.rules_for("XAUUSD").is_some());
    }
}
