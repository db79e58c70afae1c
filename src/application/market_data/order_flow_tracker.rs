use crate::config::OrderFlowConfig;
use crate::domain::market::order_flow::{FlowEvent, OrderFlowSnapshot, build_snapshot};
use crate::domain::market::pip;
use crate::domain::market::types::Tick;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration as StdDuration;
use tokio::sync::{RwLock, watch};
use tracing::debug;

#[derive(Debug, Default)]
struct SymbolFlowState {
    events: VecDeque<FlowEvent>,
    last_mid: Option<Decimal>,
    cumulative_delta: Decimal,
    prev_delta_15s: Decimal,
}

/// Builds per-symbol order-flow snapshots from tick movement.
///
/// Aggressive volume is inferred from mid moves: an uptick is buying, a
/// downtick selling, magnitude proportional to the move in pips. Snapshots
/// are replaced whole; a failure to produce one degrades gracefully (the
/// filter skips its order-flow gates).
pub struct OrderFlowTracker {
    config: OrderFlowConfig,
    states: Mutex<HashMap<String, SymbolFlowState>>,
    snapshots: RwLock<HashMap<String, OrderFlowSnapshot>>,
}

impl OrderFlowTracker {
    pub fn new(config: OrderFlowConfig) -> Self {
        Self {
            config,
            states: Mutex::new(HashMap::new()),
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &OrderFlowConfig {
        &self.config
    }

    pub fn on_tick(&self, tick: &Tick) {
        let mut states = self.states.lock().expect("flow state lock poisoned");
        let state = states.entry(tick.symbol.clone()).or_default();

        if let Some(last) = state.last_mid {
            let moved = tick.mid - last;
            if !moved.is_zero() {
                let signed = pip::price_to_pips(&tick.symbol, moved);
                state.events.push_back(FlowEvent {
                    time: tick.time,
                    signed_volume: signed,
                });
                state.cumulative_delta += signed;
            }
        }
        state.last_mid = Some(tick.mid);

        let cutoff = tick.time - Duration::seconds(self.config.absorption_lookback_secs);
        while state.events.front().is_some_and(|e| e.time < cutoff) {
            state.events.pop_front();
        }
    }

    /// Rebuilds every symbol snapshot at `now` and swaps them in atomically
    /// per symbol.
    pub async fn rebuild(&self, now: DateTime<Utc>) {
        let built: Vec<OrderFlowSnapshot> = {
            let mut states = self.states.lock().expect("flow state lock poisoned");
            states
                .iter_mut()
                .map(|(symbol, state)| {
                    let snapshot = build_snapshot(
                        symbol,
                        &state.events,
                        state.cumulative_delta,
                        state.prev_delta_15s,
                        self.config.large_order_multiplier,
                        now,
                    );
                    state.prev_delta_15s = snapshot.delta_15s;
                    snapshot
                })
                .collect()
        };

        let mut snapshots = self.snapshots.write().await;
        for snapshot in built {
            debug!(
                "OrderFlowTracker [{}]: d15={} imbalance={} largeB={} largeS={}",
                snapshot.symbol,
                snapshot.delta_15s,
                snapshot.imbalance,
                snapshot.large_buy_orders,
                snapshot.large_sell_orders
            );
            snapshots.insert(snapshot.symbol.clone(), snapshot);
        }
    }

    pub async fn snapshot(&self, symbol: &str) -> Option<OrderFlowSnapshot> {
        self.snapshots.read().await.get(symbol).cloned()
    }

    pub async fn run(
        self: std::sync::Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        if !self.config.enabled {
            debug!("OrderFlowTracker: disabled");
            return;
        }
        let mut interval =
            tokio::time::interval(StdDuration::from_millis(self.config.poll_interval_ms));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.rebuild(Utc::now()).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("OrderFlowTracker: shutdown");
                        return;
                    }
                }
            }
        }
    }
}
