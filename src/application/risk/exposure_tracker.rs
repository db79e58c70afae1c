use crate::domain::ports::{BrokerAdapter, LiveTradeRepository};
use crate::domain::risk::exposure::{ExposureSnapshot, build_snapshot};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, watch};
use tracing::{debug, warn};

/// Polls broker open positions and keeps a whole-snapshot exposure view.
///
/// The snapshot is replaced atomically; readers always see a fully-formed
/// snapshot or none at all.
pub struct ExposureTracker {
    broker: Arc<dyn BrokerAdapter>,
    live_trades: Arc<dyn LiveTradeRepository>,
    snapshot: RwLock<Option<ExposureSnapshot>>,
    default_risk_per_trade: Decimal,
    poll_interval: Duration,
    max_age_secs: i64,
}

/// Outcome of resolving an exposure view for one evaluation.
pub enum ExposureLookup {
    Fresh(ExposureSnapshot),
    DbFallback(ExposureSnapshot),
    Failed,
}

impl ExposureTracker {
    pub fn new(
        broker: Arc<dyn BrokerAdapter>,
        live_trades: Arc<dyn LiveTradeRepository>,
        default_risk_per_trade: Decimal,
        poll_interval_sec: u64,
        max_age_secs: i64,
    ) -> Self {
        Self {
            broker,
            live_trades,
            snapshot: RwLock::new(None),
            default_risk_per_trade,
            poll_interval: Duration::from_secs(poll_interval_sec),
            max_age_secs,
        }
    }

    pub async fn refresh(&self, now: DateTime<Utc>) {
        match self.broker.open_positions().await {
            Ok(positions) => {
                let snapshot = build_snapshot(&positions, self.default_risk_per_trade, now);
                debug!(
                    "ExposureTracker: {} open trades, estimated risk {}",
                    snapshot.total_open_trades, snapshot.total_estimated_risk_amount
                );
                *self.snapshot.write().await = Some(snapshot);
            }
            Err(e) => {
                warn!("ExposureTracker: refresh failed, keeping last snapshot: {}", e);
            }
        }
    }

    /// Point-in-time read. Fresh snapshot preferred; falls back to
    /// aggregating the open-trades table; `Failed` when the DB query itself
    /// errors (callers must treat that conservatively).
    pub async fn resolve(&self, now: DateTime<Utc>) -> ExposureLookup {
        {
            let guard = self.snapshot.read().await;
            if let Some(snapshot) = guard.as_ref()
                && !snapshot.is_stale(now, self.max_age_secs)
            {
                return ExposureLookup::Fresh(snapshot.clone());
            }
        }
        match self.live_trades.open_positions().await {
            Ok(positions) => {
                debug!("ExposureTracker: cache miss, aggregated {} open trades from DB", positions.len());
                ExposureLookup::DbFallback(build_snapshot(
                    &positions,
                    self.default_risk_per_trade,
                    now,
                ))
            }
            Err(e) => {
                warn!("ExposureTracker: DB fallback failed: {}", e);
                ExposureLookup::Failed
            }
        }
    }

    pub async fn current(&self) -> Option<ExposureSnapshot> {
        self.snapshot.read().await.clone()
    }

    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.refresh(Utc::now()).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("ExposureTracker: shutdown");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::types::{Direction, OpenPosition};
    use crate::infrastructure::broker::mock::MockBroker;
    use crate::infrastructure::persistence::repositories::test_support::failing_live_trade_repo;
    use crate::infrastructure::persistence::{Database, repositories::SqliteLiveTradeRepository};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn position(ticket: i64) -> OpenPosition {
        OpenPosition {
            ticket,
            symbol: "XAUUSD".to_string(),
            direction: Direction::Buy,
            volume: dec!(0.1),
            entry_price: dec!(2650),
            entry_time: Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap(),
            stop_loss: Some(dec!(2640)),
            take_profit: None,
        }
    }

    #[tokio::test]
    async fn test_refresh_and_resolve_fresh() {
        let broker = Arc::new(MockBroker::new());
        broker.set_open_positions(vec![position(1), position(2)]).await;
        let db = Database::new_in_memory().await.unwrap();
        let repo = Arc::new(SqliteLiveTradeRepository::new(db.pool.clone()));
        let tracker = ExposureTracker::new(broker, repo, dec!(100), 10, 60);

        let now = Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap();
        tracker.refresh(now).await;
        match tracker.resolve(now).await {
            ExposureLookup::Fresh(snapshot) => {
                assert_eq!(snapshot.total_open_trades, 2);
                assert_eq!(snapshot.symbol("XAUUSD").long_count, 2);
            }
            _ => panic!("expected fresh snapshot"),
        }
    }

    #[tokio::test]
    async fn test_stale_snapshot_falls_back_to_db() {
        let broker = Arc::new(MockBroker::new());
        broker.set_open_positions(vec![position(1)]).await;
        let db = Database::new_in_memory().await.unwrap();
        let repo = Arc::new(SqliteLiveTradeRepository::new(db.pool.clone()));
        repo.record_open(&position(7)).await.unwrap();
        let tracker = ExposureTracker::new(broker, repo, dec!(100), 10, 60);

        let t0 = Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap();
        tracker.refresh(t0).await;
        // Two minutes later the snapshot is stale
        let later = t0 + chrono::Duration::seconds(120);
        match tracker.resolve(later).await {
            ExposureLookup::DbFallback(snapshot) => {
                assert_eq!(snapshot.total_open_trades, 1);
            }
            _ => panic!("expected DB fallback"),
        }
    }

    #[tokio::test]
    async fn test_db_failure_reports_failed() {
        let broker = Arc::new(MockBroker::new());
        let repo = failing_live_trade_repo();
        let tracker = ExposureTracker::new(broker, repo, dec!(100), 10, 60);
        let now = Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap();
        match tracker.resolve(now).await {
            ExposureLookup::Failed => {}
            _ => panic!("expected failure"),
        }
    }
}
