use crate::domain::market::pip;
use crate::domain::market::types::Tick;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy)]
struct SpreadEntry {
    spread_pips: Decimal,
    updated_at: DateTime<Utc>,
}

/// Last observed spread per symbol, in pips.
///
/// Written by the price feed on every good tick; read by the execution
/// filter and the kill switch.
#[derive(Debug, Default)]
pub struct SpreadCache {
    entries: RwLock<HashMap<String, SpreadEntry>>,
}

impl SpreadCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, tick: &Tick) {
        let spread_pips = pip::price_to_pips(&tick.symbol, tick.spread());
        let mut entries = self.entries.write().expect("spread cache lock poisoned");
        entries.insert(
            tick.symbol.clone(),
            SpreadEntry {
                spread_pips,
                updated_at: tick.time,
            },
        );
    }

    pub fn spread_pips(&self, symbol: &str) -> Option<Decimal> {
        let entries = self.entries.read().expect("spread cache lock poisoned");
        entries.get(symbol).map(|e| e.spread_pips)
    }

    /// Worst spread currently cached across the book, for the kill switch.
    pub fn worst_spread_pips(&self) -> Option<(String, Decimal)> {
        let entries = self.entries.read().expect("spread cache lock poisoned");
        entries
            .iter()
            .max_by(|a, b| a.1.spread_pips.cmp(&b.1.spread_pips))
            .map(|(symbol, e)| (symbol.clone(), e.spread_pips))
    }

    pub fn last_update(&self, symbol: &str) -> Option<DateTime<Utc>> {
        let entries = self.entries.read().expect("spread cache lock poisoned");
        entries.get(symbol).map(|e| e.updated_at)
    }
}
