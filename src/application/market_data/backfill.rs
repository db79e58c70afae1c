use crate::domain::market::candle_store::CandleStore;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::ports::BrokerAdapter;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Seeds the candle store with M1 history at startup so the HTF cascade has
/// data before the first live bar closes.
pub struct HistoricalBackfill {
    broker: Arc<dyn BrokerAdapter>,
    store: Arc<RwLock<CandleStore>>,
    m1_bars: usize,
}

impl HistoricalBackfill {
    pub fn new(
        broker: Arc<dyn BrokerAdapter>,
        store: Arc<RwLock<CandleStore>>,
        m1_bars: usize,
    ) -> Self {
        Self {
            broker,
            store,
            m1_bars,
        }
    }

    pub async fn seed_symbol(&self, symbol: &str) -> Result<usize> {
        let candles = self
            .broker
            .historical_candles(symbol, Timeframe::M1, self.m1_bars)
            .await
            .with_context(|| format!("Backfill request failed for {}", symbol))?;

        let mut store = self.store.write().await;
        let mut accepted = 0usize;
        for candle in candles {
            if store.append(candle) {
                accepted += 1;
            }
        }
        info!(
            "HistoricalBackfill [{}]: seeded {} M1 bars (requested {})",
            symbol, accepted, self.m1_bars
        );
        Ok(accepted)
    }

    /// Seeds every symbol; a failing symbol is logged and skipped so one bad
    /// instrument cannot hold up startup.
    pub async fn seed_all(&self, symbols: &[String]) {
        for symbol in symbols {
            if let Err(e) = self.seed_symbol(symbol).await {
                warn!("HistoricalBackfill [{}]: {:#}", symbol, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::types::Candle;
    use crate::infrastructure::broker::mock::MockBroker;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_seed_symbol_fills_store() {
        let broker = Arc::new(MockBroker::new());
        let t0 = Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap();
        let history: Vec<Candle> = (0..50)
            .map(|i| Candle {
                symbol: "EURUSD".to_string(),
                timeframe: Timeframe::M1,
                open: dec!(1.1),
                high: dec!(1.101),
                low: dec!(1.099),
                close: dec!(1.1),
                volume: dec!(5),
                start_time: t0 + Duration::minutes(i),
                end_time: t0 + Duration::minutes(i + 1),
            })
            .collect();
        broker.set_history("EURUSD", history).await;

        let store = Arc::new(RwLock::new(CandleStore::new(1000)));
        let backfill = HistoricalBackfill::new(broker, store.clone(), 50);
        let accepted = backfill.seed_symbol("EURUSD").await.unwrap();
        assert_eq!(accepted, 50);
        assert_eq!(store.read().await.len("EURUSD"), 50);
    }
}
