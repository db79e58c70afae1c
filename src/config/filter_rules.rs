use crate::config::parse_env;
use crate::domain::market::session::{SessionWindow, default_sessions};
use crate::domain::market::types::Direction;
use crate::domain::news::GuardrailMode;
use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

/// Per-symbol execution-filter rules.
///
/// `min_confluence_score` keeps Option semantics deliberately: `Some(0)` is a
/// real, explicit minimum (accept any score), `None` means unset.
#[derive(Debug, Clone)]
pub struct SymbolRules {
    pub enabled: bool,
    pub allowed_directions: Vec<Direction>,
    pub blocked_guardrail_modes: Vec<GuardrailMode>,
    pub sessions: Vec<SessionWindow>,
    pub require_htf_alignment: bool,
    /// Accept a sideways HTF when explicitly permitted.
    pub allow_range_htf: bool,
    pub require_bos: bool,
    pub require_liquidity_sweep: bool,
    pub require_displacement: bool,
    pub require_premium_discount: bool,
    pub require_fvg: bool,
    pub require_volume_imbalance_alignment: bool,
    pub min_confluence_score: Option<u32>,
    pub displacement_min_atr_multiplier: Decimal,
    pub max_spread_pips: Decimal,
    pub max_trades_per_day: u32,
    pub min_minutes_between_trades: i64,
    pub max_concurrent_trades_per_symbol: usize,
    pub max_concurrent_trades_per_direction: usize,
    pub max_daily_risk_per_symbol: Decimal,
    pub min_distance_from_daily_extreme_pips: Option<Decimal>,
}

impl SymbolRules {
    fn forex_default() -> Self {
        Self {
            enabled: true,
            allowed_directions: vec![Direction::Buy, Direction::Sell],
            blocked_guardrail_modes: vec![GuardrailMode::Blocked],
            sessions: default_sessions(),
            require_htf_alignment: true,
            allow_range_htf: false,
            require_bos: true,
            require_liquidity_sweep: true,
            require_displacement: true,
            require_premium_discount: true,
            require_fvg: true,
            require_volume_imbalance_alignment: true,
            min_confluence_score: Some(60),
            displacement_min_atr_multiplier: dec!(2.0),
            max_spread_pips: dec!(3),
            max_trades_per_day: 4,
            min_minutes_between_trades: 15,
            max_concurrent_trades_per_symbol: 2,
            max_concurrent_trades_per_direction: 1,
            max_daily_risk_per_symbol: dec!(400),
            min_distance_from_daily_extreme_pips: Some(dec!(10)),
        }
    }

    fn gold_default() -> Self {
        Self {
            max_spread_pips: dec!(35),
            min_distance_from_daily_extreme_pips: Some(dec!(30)),
            max_daily_risk_per_symbol: dec!(300),
            ..Self::forex_default()
        }
    }

    fn index_default() -> Self {
        Self {
            max_spread_pips: dec!(6),
            displacement_min_atr_multiplier: dec!(1.8),
            min_distance_from_daily_extreme_pips: Some(dec!(40)),
            ..Self::forex_default()
        }
    }

    pub fn default_for(symbol: &str) -> Self {
        match symbol {
            "XAUUSD" => Self::gold_default(),
            "US30" => Self::index_default(),
            _ => Self::forex_default(),
        }
    }
}

/// Symbol rules table plus the global filter toggles.
#[derive(Debug, Clone)]
pub struct ExecutionFilterConfig {
    rules: HashMap<String, SymbolRules>,
    /// Volume-imbalance gate is hard by default: a misalignment skips.
    /// Soft mode only logs (deployment decision, declared explicitly).
    pub soft_volume_imbalance: bool,
    pub order_flow_gates_enabled: bool,
}

impl ExecutionFilterConfig {
    pub fn from_env(symbols: &[String]) -> Result<Self> {
        let mut rules = HashMap::new();
        for symbol in symbols {
            let mut r = SymbolRules::default_for(symbol);
            // Scalar knobs overridable per symbol, e.g. FILTER_XAUUSD_MAX_SPREAD_PIPS
            let prefix = format!("FILTER_{}_", symbol);
            r.max_spread_pips = parse_env(
                &format!("{}MAX_SPREAD_PIPS", prefix),
                &r.max_spread_pips.to_string(),
            )?;
            r.max_trades_per_day = parse_env(
                &format!("{}MAX_TRADES_PER_DAY", prefix),
                &r.max_trades_per_day.to_string(),
            )?;
            r.min_minutes_between_trades = parse_env(
                &format!("{}MIN_MINUTES_BETWEEN_TRADES", prefix),
                &r.min_minutes_between_trades.to_string(),
            )?;
            if let Ok(raw) = std::env::var(format!("{}MIN_CONFLUENCE_SCORE", prefix)) {
                // An explicit zero is honoured as "no minimum"
                r.min_confluence_score = Some(raw.parse().map_err(|e| {
                    anyhow::anyhow!("Invalid {}MIN_CONFLUENCE_SCORE: {}", prefix, e)
                })?);
            }
            rules.insert(symbol.clone(), r);
        }
        Ok(Self {
            rules,
            soft_volume_imbalance: parse_env("FILTER_SOFT_VOLUME_IMBALANCE", "false")?,
            order_flow_gates_enabled: parse_env("FILTER_ORDER_FLOW_GATES", "true")?,
        })
    }

    pub fn with_rules(rules: HashMap<String, SymbolRules>) -> Self {
        Self {
            rules,
            soft_volume_imbalance: false,
            order_flow_gates_enabled: true,
        }
    }

    /// None for symbols with no configured rules; the filter answers that
    /// with a configuration skip, never a default-permit.
    pub fn rules_for(&self, symbol: &str) -> Option<&SymbolRules> {
        self.rules.get(symbol)
    }
}
