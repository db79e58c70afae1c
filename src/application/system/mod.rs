//! Application assembly: builds every service from configuration, spawns
//! the periodic tasks and coordinates graceful shutdown.

use crate::application::decision_log::DecisionLogger;
use crate::domain::ports::LiveTradeRepository;
use crate::application::events::order_event_ingestor::OrderEventIngestor;
use crate::application::exits::exit_engine::ExitEngine;
use crate::application::filter::ExecutionFilter;
use crate::application::market_data::backfill::HistoricalBackfill;
use crate::application::market_data::order_flow_tracker::OrderFlowTracker;
use crate::application::market_data::price_feed::{PriceFeed, TickRouter};
use crate::application::market_data::spread_cache::SpreadCache;
use crate::application::news_client::GuardrailService;
use crate::application::orchestrator::{Orchestrator, OrchestratorDeps};
use crate::application::risk::daily_stats::DailyStats;
use crate::application::risk::exposure_tracker::ExposureTracker;
use crate::application::risk::kill_switch::KillSwitchService;
use crate::application::risk::loss_streak::LossStreakService;
use crate::application::risk::risk_service::RiskService;
use crate::config::Config;
use crate::domain::market::candle_store::CandleStore;
use crate::domain::market::types::Tick;
use crate::domain::signal::generator::{SmcConfig, SmcSignalGenerator};
use crate::infrastructure::broker::HttpBrokerBridge;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::http::{ApiState, serve};
use crate::infrastructure::news::HttpGuardrailClient;
use crate::infrastructure::persistence::Database;
use crate::infrastructure::persistence::repositories::{
    SqliteDecisionLogRepository, SqliteExitPlanRepository, SqliteKillSwitchEventRepository,
    SqliteLiveTradeRepository, SqliteNewsDayRepository, SqliteOrderEventRepository,
};
use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub struct Application {
    config: Config,
    orchestrator: Arc<Orchestrator>,
    exit_engine: Arc<ExitEngine>,
    exposure: Arc<ExposureTracker>,
    order_flow: Arc<OrderFlowTracker>,
    price_feed: Arc<PriceFeed>,
    tick_router: Option<TickRouter>,
    tick_rx: Option<mpsc::Receiver<Tick>>,
    backfill: HistoricalBackfill,
    api_state: Arc<ApiState>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

pub struct RunningApplication {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Application {
    pub async fn build(config: Config) -> Result<Self> {
        let db = Database::new(&config.database_url)
            .await
            .context("Database startup failed")?;

        // Repositories
        let decision_repo = Arc::new(SqliteDecisionLogRepository::new(db.pool.clone()));
        let event_repo = Arc::new(SqliteOrderEventRepository::new(db.pool.clone()));
        let live_trade_repo = Arc::new(SqliteLiveTradeRepository::new(db.pool.clone()));
        let exit_plan_repo = Arc::new(SqliteExitPlanRepository::new(db.pool.clone()));
        let kill_switch_event_repo = Arc::new(SqliteKillSwitchEventRepository::new(db.pool.clone()));
        let news_day_repo = Arc::new(SqliteNewsDayRepository::new(db.pool.clone()));

        // Shared market state
        let store = Arc::new(RwLock::new(CandleStore::new(config.max_candles)));
        let spread_cache = Arc::new(SpreadCache::new());
        let last_good: Arc<RwLock<HashMap<String, Tick>>> = Arc::new(RwLock::new(HashMap::new()));
        let bus = EventBus::new();

        // Collaborators
        let broker: Arc<HttpBrokerBridge> = Arc::new(
            HttpBrokerBridge::new(config.broker_base_url.clone())
                .map_err(|e| anyhow::anyhow!("broker client: {}", e))?,
        );
        let guardrail_client = Arc::new(
            HttpGuardrailClient::new(config.news_base_url.clone())
                .map_err(|e| anyhow::anyhow!("guardrail client: {}", e))?,
        );

        // Services
        let now = Utc::now();
        let mut starting_equity = config.risk.starting_equity;
        // Realized PnL already booked today survives a restart
        let day_start = config
            .timezone
            .from_local_datetime(
                &now.with_timezone(&config.timezone)
                    .date_naive()
                    .and_hms_opt(0, 0, 0)
                    .expect("midnight is always valid"),
            )
            .single()
            .map(|t| t.with_timezone(&Utc));
        if let Some(day_start) = day_start {
            match live_trade_repo.realized_pnl_between(day_start, now).await {
                Ok(booked) => starting_equity += booked,
                Err(e) => warn!("Application: could not restore today's PnL: {}", e),
            }
        }

        let stats = Arc::new(DailyStats::new(config.timezone, starting_equity, now));
        let loss_streak = Arc::new(LossStreakService::new(
            config.loss_streak_threshold,
            config.loss_streak_pause_minutes,
        ));
        let kill_switch = Arc::new(KillSwitchService::new(
            config.kill_switch.clone(),
            config.timezone,
        ));
        let order_flow = Arc::new(OrderFlowTracker::new(config.order_flow.clone()));
        let exposure = Arc::new(ExposureTracker::new(
            broker.clone(),
            live_trade_repo.clone(),
            config.default_risk_per_trade,
            config.exposure_poll_interval_sec,
            config.exposure_max_age_sec,
        ));
        let ingestor = Arc::new(OrderEventIngestor::new(
            event_repo,
            live_trade_repo.clone(),
            stats.clone(),
            loss_streak.clone(),
            bus.clone(),
        ));
        let guardrail = Arc::new(GuardrailService::new(
            guardrail_client,
            news_day_repo,
            config.timezone,
        ));
        let logger = Arc::new(DecisionLogger::new(decision_repo.clone()));

        let generator = SmcSignalGenerator::new(SmcConfig {
            htf: config.smc_htf,
            ltf: config.smc_ltf,
            risk_reward: config.smc_risk_reward,
            ..SmcConfig::default()
        });
        let filter = ExecutionFilter::new(
            config.filter.clone(),
            config.order_flow.clone(),
            config.max_concurrent_trades_global,
            config.max_daily_risk_global,
        );
        let risk = RiskService::new(config.risk.clone(), true);

        let orchestrator = Arc::new(
            Orchestrator::new(
                &config,
                OrchestratorDeps {
                    broker: broker.clone(),
                    store: store.clone(),
                    last_good: last_good.clone(),
                    spread_cache: spread_cache.clone(),
                    generator,
                    filter,
                    guardrail,
                    risk,
                    stats: stats.clone(),
                    exposure: exposure.clone(),
                    kill_switch: kill_switch.clone(),
                    kill_switch_events: kill_switch_event_repo.clone(),
                    loss_streak,
                    order_flow: order_flow.clone(),
                    ingestor: ingestor.clone(),
                    exit_plans: exit_plan_repo.clone(),
                    logger,
                    bus: bus.clone(),
                },
            )
            .with_starting_equity(config.risk.starting_equity),
        );

        let exit_engine = Arc::new(ExitEngine::new(
            broker.clone(),
            store.clone(),
            exit_plan_repo,
            ingestor.clone(),
            kill_switch.clone(),
            last_good.clone(),
            config.exit.clone(),
            crate::domain::market::timeframe::Timeframe::M15,
            config.kill_switch.close_positions_on_arm,
        ));

        let (tick_tx, tick_rx) = mpsc::channel::<Tick>(1024);
        let price_feed = Arc::new(PriceFeed::new(
            broker.clone(),
            tick_tx,
            config.price_poll_max_retries,
            config.price_poll_interval_ms,
        ));
        let tick_router = TickRouter::new(
            store.clone(),
            spread_cache,
            last_good,
            Some(order_flow.clone()),
        );
        let backfill = HistoricalBackfill::new(broker, store, config.backfill_m1_bars);

        let api_state = Arc::new(ApiState {
            exposure: exposure.clone(),
            decisions: decision_repo,
            kill_switch,
            kill_switch_events: kill_switch_event_repo,
            ingestor,
            bus,
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config,
            orchestrator,
            exit_engine,
            exposure,
            order_flow,
            price_feed,
            tick_router: Some(tick_router),
            tick_rx: Some(tick_rx),
            backfill,
            api_state,
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Seeds history, spawns every periodic task and the API listener.
    pub async fn start(mut self) -> Result<RunningApplication> {
        self.backfill.seed_all(&self.config.symbols).await;

        let mut tasks = Vec::new();

        let router = self
            .tick_router
            .take()
            .expect("start called once");
        let rx = self.tick_rx.take().expect("start called once");
        tasks.push(tokio::spawn(router.run(rx, self.shutdown_rx.clone())));

        for symbol in &self.config.symbols {
            tasks.push(tokio::spawn(
                self.price_feed
                    .clone()
                    .run_symbol(symbol.clone(), self.shutdown_rx.clone()),
            ));
        }

        tasks.push(tokio::spawn(
            self.order_flow.clone().run(self.shutdown_rx.clone()),
        ));
        tasks.push(tokio::spawn(
            self.exposure.clone().run(self.shutdown_rx.clone()),
        ));
        tasks.push(tokio::spawn(
            self.exit_engine.clone().run(self.shutdown_rx.clone()),
        ));
        tasks.push(tokio::spawn(
            self.orchestrator.clone().run(self.shutdown_rx.clone()),
        ));

        let api_state = self.api_state.clone();
        let bind = self.config.http_bind.clone();
        let api_shutdown = self.shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = serve(api_state, bind, api_shutdown).await {
                warn!("Application: API server exited with error: {:#}", e);
            }
        }));

        info!(
            "Application: started ({} symbols, {} tasks)",
            self.config.symbols.len(),
            tasks.len()
        );
        Ok(RunningApplication {
            shutdown_tx: self.shutdown_tx,
            tasks,
        })
    }
}

impl RunningApplication {
    /// Broadcasts the stop signal and waits for tasks up to a bounded grace
    /// period; stragglers are aborted.
    pub async fn shutdown(self) {
        info!("Application: shutdown requested");
        let _ = self.shutdown_tx.send(true);
        for mut task in self.tasks {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                warn!("Application: grace period elapsed, aborting task");
                task.abort();
            }
        }
        info!("Application: stopped");
    }
}
