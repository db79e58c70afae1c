use crate::domain::market::pip;
use crate::domain::market::types::{Direction, OpenPosition};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Aggregated exposure for one symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolExposure {
    pub long_count: usize,
    pub short_count: usize,
    pub total_count: usize,
    pub estimated_risk_amount: Decimal,
}

/// Point-in-time exposure across the book. Replaced atomically by the
/// exposure tracker; readers never observe a torn snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposureSnapshot {
    pub symbols: HashMap<String, SymbolExposure>,
    pub total_open_trades: usize,
    pub total_estimated_risk_amount: Decimal,
    pub last_updated: DateTime<Utc>,
}

impl ExposureSnapshot {
    pub fn empty(at: DateTime<Utc>) -> Self {
        Self {
            symbols: HashMap::new(),
            total_open_trades: 0,
            total_estimated_risk_amount: Decimal::ZERO,
            last_updated: at,
        }
    }

    pub fn symbol(&self, symbol: &str) -> SymbolExposure {
        self.symbols.get(symbol).cloned().unwrap_or_default()
    }

    pub fn is_stale(&self, now: DateTime<Utc>, max_age_secs: i64) -> bool {
        (now - self.last_updated).num_seconds() > max_age_secs
    }
}

/// Risk of one open position: distance to stop times volume times pip value,
/// or a conservative constant when the stop is unknown.
pub fn estimated_risk(position: &OpenPosition, default_risk_per_trade: Decimal) -> Decimal {
    match position.stop_loss {
        Some(sl) => {
            let distance_pips = pip::price_to_pips(&position.symbol, (position.entry_price - sl).abs());
            let pip_value = pip::pip_value_per_lot(&position.symbol, position.entry_price);
            distance_pips * position.volume * pip_value
        }
        None => default_risk_per_trade,
    }
}

/// Folds a set of open positions into a snapshot.
pub fn build_snapshot(
    positions: &[OpenPosition],
    default_risk_per_trade: Decimal,
    at: DateTime<Utc>,
) -> ExposureSnapshot {
    let mut symbols: HashMap<String, SymbolExposure> = HashMap::new();
    let mut total_risk = Decimal::ZERO;

    for p in positions {
        let entry = symbols.entry(p.symbol.clone()).or_default();
        match p.direction {
            Direction::Buy => entry.long_count += 1,
            Direction::Sell => entry.short_count += 1,
        }
        entry.total_count += 1;
        let risk = estimated_risk(p, default_risk_per_trade);
        entry.estimated_risk_amount += risk;
        total_risk += risk;
    }

    ExposureSnapshot {
        symbols,
        total_open_trades: positions.len(),
        total_estimated_risk_amount: total_risk,
        last_updated: at,
    }
}
