//! Exit-engine scenarios against the mock broker: break-even, partial
//! close and idempotence across cycles.

use aegis_trader::application::events::order_event_ingestor::OrderEventIngestor;
use aegis_trader::application::exits::exit_engine::ExitEngine;
use aegis_trader::application::risk::daily_stats::DailyStats;
use aegis_trader::application::risk::kill_switch::KillSwitchService;
use aegis_trader::application::risk::loss_streak::LossStreakService;
use aegis_trader::config::{ExitConfig, KillSwitchConfig};
use aegis_trader::domain::exit::{ExitPlan, TrailMode};
use aegis_trader::domain::market::candle_store::CandleStore;
use aegis_trader::domain::market::timeframe::Timeframe;
use aegis_trader::domain::market::types::{Direction, OpenPosition, Tick};
use aegis_trader::domain::ports::ExitPlanRepository;
use aegis_trader::infrastructure::broker::mock::MockBroker;
use aegis_trader::infrastructure::event_bus::EventBus;
use aegis_trader::infrastructure::persistence::Database;
use aegis_trader::infrastructure::persistence::repositories::{
    SqliteExitPlanRepository, SqliteLiveTradeRepository, SqliteOrderEventRepository,
};
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::UTC;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

struct ExitHarness {
    engine: ExitEngine,
    broker: Arc<MockBroker>,
    plans: Arc<SqliteExitPlanRepository>,
    last_good: Arc<RwLock<HashMap<String, Tick>>>,
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap()
}

async fn build(config: ExitConfig) -> ExitHarness {
    let db = Database::new_in_memory().await.unwrap();
    let broker = Arc::new(MockBroker::new());
    let plans = Arc::new(SqliteExitPlanRepository::new(db.pool.clone()));
    let stats = Arc::new(DailyStats::new(UTC, dec!(10000), t0()));
    let loss_streak = Arc::new(LossStreakService::new(3, 60));
    let ingestor = Arc::new(OrderEventIngestor::new(
        Arc::new(SqliteOrderEventRepository::new(db.pool.clone())),
        Arc::new(SqliteLiveTradeRepository::new(db.pool.clone())),
        stats,
        loss_streak,
        EventBus::new(),
    ));
    let kill_switch = Arc::new(KillSwitchService::new(KillSwitchConfig::default(), UTC));
    let store = Arc::new(RwLock::new(CandleStore::new(1000)));
    let last_good: Arc<RwLock<HashMap<String, Tick>>> = Arc::new(RwLock::new(HashMap::new()));

    let engine = ExitEngine::new(
        broker.clone(),
        store,
        plans.clone(),
        ingestor,
        kill_switch,
        last_good.clone(),
        config,
        Timeframe::M15,
        false,
    );
    ExitHarness {
        engine,
        broker,
        plans,
        last_good,
    }
}

fn buy_position(ticket: i64) -> OpenPosition {
    OpenPosition {
        ticket,
        symbol: "XAUUSD".to_string(),
        direction: Direction::Buy,
        volume: dec!(0.2),
        entry_price: dec!(2650),
        entry_time: t0(),
        stop_loss: Some(dec!(2640)),
        take_profit: Some(dec!(2680)),
    }
}

fn plan() -> ExitPlan {
    ExitPlan {
        entry_price: dec!(2650),
        stop_loss_initial: dec!(2640),
        tp1: dec!(2670),
        break_even_trigger_r: dec!(1),
        partial_close_percent: dec!(0.5),
        trail_mode: TrailMode::FixedPips,
        trail_value: dec!(30),
        time_limit_seconds: None,
    }
}

async fn set_price(harness: &ExitHarness, mid: Decimal, minute: u32) {
    let time = Utc.with_ymd_and_hms(2025, 1, 6, 9, minute, 0).unwrap();
    let tick = Tick::new("XAUUSD", mid - dec!(0.05), mid + dec!(0.05), time);
    harness.last_good.write().await.insert("XAUUSD".to_string(), tick);
}

#[tokio::test]
async fn break_even_moves_stop_to_entry_once() {
    let harness = build(ExitConfig::default()).await;
    harness.broker.set_open_positions(vec![buy_position(42)]).await;
    harness.plans.save(42, &plan()).await.unwrap();

    // Price touches +1R (2660)
    set_price(&harness, dec!(2660), 30).await;
    let now = Utc.with_ymd_and_hms(2025, 1, 6, 9, 30, 0).unwrap();
    harness.engine.run_cycle(now).await;

    let modifies = harness.broker.modify_requests.read().await.clone();
    assert_eq!(modifies, vec![(42, Some(dec!(2650)), None)]);

    // A second cycle must not reapply the break-even
    harness.engine.run_cycle(now + chrono::Duration::seconds(5)).await;
    assert_eq!(harness.broker.modify_requests.read().await.len(), 1);

    let (_, progress) = harness.plans.load(42).await.unwrap().unwrap();
    assert!(progress.break_even_done);
}

#[tokio::test]
async fn drawdown_below_trigger_does_nothing() {
    let harness = build(ExitConfig::default()).await;
    harness.broker.set_open_positions(vec![buy_position(42)]).await;
    harness.plans.save(42, &plan()).await.unwrap();

    set_price(&harness, dec!(2655), 10).await;
    harness
        .engine
        .run_cycle(Utc.with_ymd_and_hms(2025, 1, 6, 9, 10, 0).unwrap())
        .await;
    assert!(harness.broker.modify_requests.read().await.is_empty());
    assert!(harness.broker.close_requests.read().await.is_empty());
}

#[tokio::test]
async fn partial_close_fires_at_tp1_then_trails() {
    let harness = build(ExitConfig::default()).await;
    harness.broker.set_open_positions(vec![buy_position(7)]).await;
    harness.plans.save(7, &plan()).await.unwrap();

    // TP1 at 2670: break-even and the 50% partial both apply
    set_price(&harness, dec!(2670), 40).await;
    let now = Utc.with_ymd_and_hms(2025, 1, 6, 9, 40, 0).unwrap();
    harness.engine.run_cycle(now).await;

    let closes = harness.broker.close_requests.read().await.clone();
    assert_eq!(closes, vec![(7, Some(dec!(0.10)))]);
    let (_, progress) = harness.plans.load(7).await.unwrap().unwrap();
    assert!(progress.partial_done);

    // Next cycle with a higher price trails the runner: 2675 - 30 pips = 2672
    set_price(&harness, dec!(2675), 41).await;
    harness
        .engine
        .run_cycle(now + chrono::Duration::seconds(5))
        .await;
    let modifies = harness.broker.modify_requests.read().await.clone();
    assert!(
        modifies.contains(&(7, Some(dec!(2672)), None)),
        "{:?}",
        modifies
    );
}

#[tokio::test]
async fn positions_without_plans_are_left_alone() {
    let harness = build(ExitConfig::default()).await;
    harness.broker.set_open_positions(vec![buy_position(9)]).await;
    set_price(&harness, dec!(2670), 20).await;
    harness
        .engine
        .run_cycle(Utc.with_ymd_and_hms(2025, 1, 6, 9, 20, 0).unwrap())
        .await;
    assert!(harness.broker.modify_requests.read().await.is_empty());
    assert!(harness.broker.close_requests.read().await.is_empty());
}

#[tokio::test]
async fn time_exit_closes_the_position() {
    let mut config = ExitConfig::default();
    config.time_limit_seconds = Some(600);
    let harness = build(config).await;
    harness.broker.set_open_positions(vec![buy_position(11)]).await;
    harness.plans.save(11, &plan()).await.unwrap();
    // Plan has no limit of its own; the engine default applies
    set_price(&harness, dec!(2651), 20).await;

    harness
        .engine
        .run_cycle(Utc.with_ymd_and_hms(2025, 1, 6, 9, 20, 0).unwrap())
        .await;
    let closes = harness.broker.close_requests.read().await.clone();
    assert_eq!(closes, vec![(11, None)]);
    // The plan is removed so the close is not re-proposed
    assert!(harness.plans.load(11).await.unwrap().is_none());
}
