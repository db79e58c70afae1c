use crate::application::market_data::candle_builder::CandleBuilder;
use crate::application::market_data::spread_cache::SpreadCache;
use crate::domain::errors::BrokerError;
use crate::domain::market::candle_store::CandleStore;
use crate::domain::market::types::Tick;
use crate::domain::ports::BrokerAdapter;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc, watch};
use tracing::{debug, error, warn};

/// Polls the broker for live bid/ask per symbol and emits ticks.
///
/// On failure it retries the same symbol with exponential backoff up to
/// `max_retries`; after exhaustion it skips the cycle and resets the
/// counter. The feed never blocks evaluation: the router below caches the
/// last good tick.
pub struct PriceFeed {
    broker: Arc<dyn BrokerAdapter>,
    tick_tx: mpsc::Sender<Tick>,
    max_retries: u32,
    poll_interval: Duration,
}

impl PriceFeed {
    pub fn new(
        broker: Arc<dyn BrokerAdapter>,
        tick_tx: mpsc::Sender<Tick>,
        max_retries: u32,
        poll_interval_ms: u64,
    ) -> Self {
        Self {
            broker,
            tick_tx,
            max_retries,
            poll_interval: Duration::from_millis(poll_interval_ms),
        }
    }

    async fn fetch_with_backoff(&self, symbol: &str) -> Result<Tick, BrokerError> {
        let mut attempt = 0u32;
        loop {
            match self.broker.latest_price(symbol).await {
                Ok(tick) => return Ok(tick),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        return Err(e);
                    }
                    let base = 200u64.saturating_mul(1u64 << attempt.min(6));
                    let jitter = rand::rng().random_range(0..100);
                    warn!(
                        "PriceFeed [{}]: attempt {}/{} failed ({}), backing off {}ms",
                        symbol,
                        attempt,
                        self.max_retries,
                        e,
                        base + jitter
                    );
                    tokio::time::sleep(Duration::from_millis(base + jitter)).await;
                }
            }
        }
    }

    /// Polls one symbol until shutdown. Delivery contract: at-least-once
    /// tick per symbol per polling interval while the broker answers.
    pub async fn run_symbol(self: Arc<Self>, symbol: String, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.fetch_with_backoff(&symbol).await {
                        Ok(tick) => {
                            if self.tick_tx.send(tick).await.is_err() {
                                debug!("PriceFeed [{}]: tick channel closed, stopping", symbol);
                                return;
                            }
                        }
                        Err(e) => {
                            error!("PriceFeed [{}]: cycle skipped after retries: {}", symbol, e);
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("PriceFeed [{}]: shutdown", symbol);
                        return;
                    }
                }
            }
        }
    }
}

/// Single consumer of the tick stream: records spreads, caches the last
/// good tick, feeds the order-flow tracker and drives the candle builder
/// into the store.
pub struct TickRouter {
    builder: CandleBuilder,
    store: Arc<RwLock<CandleStore>>,
    spread_cache: Arc<SpreadCache>,
    last_good: Arc<RwLock<HashMap<String, Tick>>>,
    flow: Option<Arc<crate::application::market_data::order_flow_tracker::OrderFlowTracker>>,
}

impl TickRouter {
    pub fn new(
        store: Arc<RwLock<CandleStore>>,
        spread_cache: Arc<SpreadCache>,
        last_good: Arc<RwLock<HashMap<String, Tick>>>,
        flow: Option<Arc<crate::application::market_data::order_flow_tracker::OrderFlowTracker>>,
    ) -> Self {
        Self {
            builder: CandleBuilder::new(),
            store,
            spread_cache,
            last_good,
            flow,
        }
    }

    pub async fn handle_tick(&mut self, tick: Tick) {
        self.spread_cache.record(&tick);
        if let Some(flow) = &self.flow {
            flow.on_tick(&tick);
        }
        {
            let mut cache = self.last_good.write().await;
            cache.insert(tick.symbol.clone(), tick.clone());
        }
        if let Some(candle) = self.builder.on_tick(&tick) {
            let mut store = self.store.write().await;
            if !store.append(candle) {
                warn!("TickRouter [{}]: out-of-order candle dropped", tick.symbol);
            }
        }
    }

    pub async fn run(mut self, mut rx: mpsc::Receiver<Tick>, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                maybe_tick = rx.recv() => {
                    match maybe_tick {
                        Some(tick) => self.handle_tick(tick).await,
                        None => {
                            debug!("TickRouter: tick channel closed");
                            return;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("TickRouter: shutdown");
                        return;
                    }
                }
            }
        }
    }
}
