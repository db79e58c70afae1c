use crate::config::parse_env;
use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[derive(Debug, Clone)]
pub struct OrderFlowConfig {
    pub enabled: bool,
    pub poll_interval_ms: u64,
    /// Multiple of the rolling median magnitude that makes a print "large".
    pub large_order_multiplier: Decimal,
    /// Minimum same-sign 15s delta confirming a direction.
    pub min_delta_trend_confirmation: Decimal,
    /// Delta spike followed by momentum collapse beyond this ratio rejects.
    pub exhaustion_threshold: Decimal,
    /// Seconds of event history retained for absorption checks.
    pub absorption_lookback_secs: i64,
    /// Snapshots older than this are ignored by the filter.
    pub max_snapshot_age_secs: i64,
    /// Opposing large-order count that rejects a signal.
    pub max_opposing_large_orders: usize,
}

impl OrderFlowConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            enabled: parse_env("ORDER_FLOW_ENABLED", "true")?,
            poll_interval_ms: parse_env("ORDER_FLOW_POLL_INTERVAL_MS", "1000")?,
            large_order_multiplier: parse_env("ORDER_FLOW_LARGE_ORDER_MULTIPLIER", "4")?,
            min_delta_trend_confirmation: parse_env("ORDER_FLOW_MIN_DELTA_CONFIRMATION", "0")?,
            exhaustion_threshold: parse_env("ORDER_FLOW_EXHAUSTION_THRESHOLD", "3")?,
            absorption_lookback_secs: parse_env("ORDER_FLOW_ABSORPTION_LOOKBACK_SECS", "90")?,
            max_snapshot_age_secs: parse_env("ORDER_FLOW_MAX_SNAPSHOT_AGE_SECS", "10")?,
            max_opposing_large_orders: parse_env("ORDER_FLOW_MAX_OPPOSING_LARGE_ORDERS", "3")?,
        })
    }
}

impl Default for OrderFlowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 1000,
            large_order_multiplier: dec!(4),
            min_delta_trend_confirmation: dec!(0),
            exhaustion_threshold: dec!(3),
            absorption_lookback_secs: 90,
            max_snapshot_age_secs: 10,
            max_opposing_large_orders: 3,
        }
    }
}
