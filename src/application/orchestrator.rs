//! Tick-loop orchestrator.
//!
//! Drives the decision pipeline per symbol on the configured cadence:
//! rollover, guardrail, signal, filter, kill switch, risk, sizing, submit,
//! exit-plan store, decision log. Symbol cycles are isolated: an error in
//! one never halts the loop.

use crate::application::decision_log::DecisionLogger;
use crate::application::events::order_event_ingestor::OrderEventIngestor;
use crate::application::filter::{ExecutionFilter, ExposureResolution, FilterContext};
use crate::application::market_data::order_flow_tracker::OrderFlowTracker;
use crate::application::market_data::spread_cache::SpreadCache;
use crate::application::news_client::GuardrailService;
use crate::application::risk::daily_stats::DailyStats;
use crate::application::risk::exposure_tracker::{ExposureLookup, ExposureTracker};
use crate::application::risk::kill_switch::{
    KillSwitchInputs, KillSwitchService, KillSwitchTransition, StrategyInputs,
};
use crate::application::risk::loss_streak::LossStreakService;
use crate::application::risk::risk_service::RiskService;
use crate::config::{Config, ExitConfig};
use crate::domain::decision::{DecisionAction, ExecutionDecision};
use crate::domain::events::EngineEvent;
use crate::domain::exit::ExitPlan;
use crate::domain::market::candle_store::CandleStore;
use crate::domain::market::pip;
use crate::domain::market::types::{OrderKind, Tick, TradeRequest};
use crate::domain::news::GuardrailMode;
use crate::domain::ports::{
    BrokerAdapter, DecisionRecord, ExitPlanRepository, KillSwitchEventRepository,
};
use crate::domain::risk::context::{RiskContext, StrategyKind};
use crate::domain::risk::kill_switch::KillSwitchEvent;
use crate::domain::signal::generator::SmcSignalGenerator;
use crate::domain::signal::types::{RawSignal, TradeSignal};
use crate::infrastructure::event_bus::EventBus;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::{RwLock, watch};
use tracing::{debug, error, info, warn};

pub struct Orchestrator {
    symbols: Vec<String>,
    strategy: StrategyKind,
    tz: Tz,
    magic_number: i64,
    exit_config: ExitConfig,
    tick_interval: StdDuration,

    broker: Arc<dyn BrokerAdapter>,
    store: Arc<RwLock<CandleStore>>,
    last_good: Arc<RwLock<HashMap<String, Tick>>>,
    spread_cache: Arc<SpreadCache>,
    generator: SmcSignalGenerator,
    filter: ExecutionFilter,
    guardrail: Arc<GuardrailService>,
    risk: RiskService,
    stats: Arc<DailyStats>,
    exposure: Arc<ExposureTracker>,
    kill_switch: Arc<KillSwitchService>,
    kill_switch_events: Arc<dyn KillSwitchEventRepository>,
    loss_streak: Arc<LossStreakService>,
    order_flow: Arc<OrderFlowTracker>,
    ingestor: Arc<OrderEventIngestor>,
    exit_plans: Arc<dyn ExitPlanRepository>,
    logger: Arc<DecisionLogger>,
    bus: EventBus,
    starting_equity: Decimal,
}

/// Everything the orchestrator needs, bundled to keep construction honest.
pub struct OrchestratorDeps {
    pub broker: Arc<dyn BrokerAdapter>,
    pub store: Arc<RwLock<CandleStore>>,
    pub last_good: Arc<RwLock<HashMap<String, Tick>>>,
    pub spread_cache: Arc<SpreadCache>,
    pub generator: SmcSignalGenerator,
    pub filter: ExecutionFilter,
    pub guardrail: Arc<GuardrailService>,
    pub risk: RiskService,
    pub stats: Arc<DailyStats>,
    pub exposure: Arc<ExposureTracker>,
    pub kill_switch: Arc<KillSwitchService>,
    pub kill_switch_events: Arc<dyn KillSwitchEventRepository>,
    pub loss_streak: Arc<LossStreakService>,
    pub order_flow: Arc<OrderFlowTracker>,
    pub ingestor: Arc<OrderEventIngestor>,
    pub exit_plans: Arc<dyn ExitPlanRepository>,
    pub logger: Arc<DecisionLogger>,
    pub bus: EventBus,
}

impl Orchestrator {
    pub fn new(config: &Config, deps: OrchestratorDeps) -> Self {
        Self {
            symbols: config.symbols.clone(),
            strategy: config.strategy,
            tz: config.timezone,
            magic_number: config.magic_number,
            exit_config: config.exit.clone(),
            tick_interval: StdDuration::from_secs(config.tick_interval_seconds),
            broker: deps.broker,
            store: deps.store,
            last_good: deps.last_good,
            spread_cache: deps.spread_cache,
            generator: deps.generator,
            filter: deps.filter,
            guardrail: deps.guardrail,
            risk: deps.risk,
            stats: deps.stats,
            exposure: deps.exposure,
            kill_switch: deps.kill_switch,
            kill_switch_events: deps.kill_switch_events,
            loss_streak: deps.loss_streak,
            order_flow: deps.order_flow,
            ingestor: deps.ingestor,
            exit_plans: deps.exit_plans,
            logger: deps.logger,
            bus: deps.bus,
            starting_equity: Decimal::ZERO,
        }
    }

    pub fn with_starting_equity(mut self, equity: Decimal) -> Self {
        self.starting_equity = equity;
        self
    }

    fn record(
        &self,
        symbol: &str,
        guardrail_mode: GuardrailMode,
        guardrail_reason: Option<String>,
        signal_reason: Option<String>,
        decision: DecisionAction,
        reasons: Vec<String>,
        risk_reason: Option<String>,
        kill_switch_active: bool,
        kill_switch_reasons: Vec<String>,
        trade_request: Option<serde_json::Value>,
        execution_result: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> DecisionRecord {
        DecisionRecord {
            id: None,
            symbol: symbol.to_string(),
            strategy: self.strategy,
            guardrail_mode,
            guardrail_reason,
            signal_reason,
            decision,
            reasons,
            risk_reason,
            kill_switch_active,
            kill_switch_reasons,
            trade_request,
            execution_result,
            created_at: now,
        }
    }

    async fn persist_kill_switch_transition(&self, transition: &KillSwitchTransition, now: DateTime<Utc>) {
        let event = KillSwitchEvent {
            timestamp: now,
            scope: transition.state.scope.to_string(),
            active: transition.state.active,
            reasons: transition.state.reasons.clone(),
        };
        if let Err(e) = self.kill_switch_events.insert(&event).await {
            warn!("Orchestrator: kill-switch event persist failed: {}", e);
        }
        self.bus
            .publish(EngineEvent::KillSwitchChanged {
                active: transition.state.active,
                reasons: transition.state.reasons.clone(),
            })
            .await;
    }

    /// Today's high and low from stored M1 bars, in the engine timezone.
    async fn daily_extremes(&self, symbol: &str, now: DateTime<Utc>) -> (Option<Decimal>, Option<Decimal>) {
        let today = now.with_timezone(&self.tz).date_naive();
        let store = self.store.read().await;
        let candles = store.last_n(symbol, 2880);
        let mut high = None;
        let mut low = None;
        for candle in candles
            .iter()
            .filter(|c| c.start_time.with_timezone(&self.tz).date_naive() == today)
        {
            high = Some(high.map_or(candle.high, |h: Decimal| h.max(candle.high)));
            low = Some(low.map_or(candle.low, |l: Decimal| l.min(candle.low)));
        }
        (high, low)
    }

    async fn resolve_exposure(&self, now: DateTime<Utc>) -> ExposureResolution {
        match self.exposure.resolve(now).await {
            ExposureLookup::Fresh(snapshot) => ExposureResolution::Snapshot(snapshot),
            ExposureLookup::DbFallback(snapshot) => ExposureResolution::DbFallback(snapshot),
            ExposureLookup::Failed => ExposureResolution::Unavailable,
        }
    }

    fn kill_switch_inputs(&self, exposure_risk: Decimal) -> KillSwitchInputs {
        // Both strategy profiles are reported, not just the one this
        // instance trades: closes attributed to the other profile (manual
        // trades, a second instance on the same book) still count.
        let strategies = [StrategyKind::Low, StrategyKind::High]
            .into_iter()
            .map(|strategy| StrategyInputs {
                strategy,
                daily_realized_pnl: self.stats.realized_today_attributed(strategy),
                trades_today: self.stats.trades_today_strategy(strategy),
            })
            .collect();
        KillSwitchInputs {
            daily_realized_pnl: self.stats.realized_today_total(),
            weekly_realized_pnl: self.stats.realized_week_total(),
            starting_equity: self.starting_equity,
            max_consecutive_losses: self.loss_streak.max_streak(),
            trades_today: self.stats.trades_today_total(),
            trades_this_week: self.stats.trades_week_total(),
            worst_spread: self.spread_cache.worst_spread_pips(),
            total_exposure_risk: exposure_risk,
            strategies,
        }
    }

    fn build_exit_plan(&self, signal: &TradeSignal) -> ExitPlan {
        // TP1 sits halfway to the final target; the runner rides to TP
        let tp1 = (signal.entry + signal.take_profit) / Decimal::TWO;
        ExitPlan {
            entry_price: signal.entry,
            stop_loss_initial: signal.stop_loss,
            tp1,
            break_even_trigger_r: self.exit_config.break_even_trigger_r,
            partial_close_percent: if self.exit_config.partial_enabled {
                self.exit_config.partial_close_percent
            } else {
                Decimal::ZERO
            },
            trail_mode: self.exit_config.trail_mode,
            trail_value: self.exit_config.trail_value,
            time_limit_seconds: self.exit_config.time_limit_seconds,
        }
    }

    /// One full evaluation for one symbol.
    pub async fn evaluate_symbol(&self, symbol: &str, now: DateTime<Utc>) {
        // 1. Counters roll on date change; kill switch may auto-resume, and
        //    its thresholds are re-evaluated every cycle regardless of the
        //    pipeline outcome further down.
        self.stats.rollover_if_needed(now);
        if let Some(transition) = self.kill_switch.poll_auto_resume(now) {
            self.persist_kill_switch_transition(&transition, now).await;
        }
        let exposure_risk_now = self
            .exposure
            .current()
            .await
            .map(|s| s.total_estimated_risk_amount)
            .unwrap_or_default();
        if let Some(transition) = self
            .kill_switch
            .evaluate(&self.kill_switch_inputs(exposure_risk_now), now)
        {
            self.persist_kill_switch_transition(&transition, now).await;
        }

        // 2. News guardrail
        let verdict = self.guardrail.check(self.strategy, now).await;
        if verdict.mode == GuardrailMode::Blocked {
            let reason = verdict
                .reason
                .clone()
                .unwrap_or_else(|| "news guardrail blocked".to_string());
            info!("Orchestrator [{}]: guardrail blocked ({})", symbol, reason);
            self.logger
                .log(self.record(
                    symbol,
                    verdict.mode,
                    verdict.reason,
                    None,
                    DecisionAction::Skip,
                    vec![format!("guardrail: {}", reason)],
                    None,
                    false,
                    Vec::new(),
                    None,
                    None,
                    now,
                ))
                .await;
            return;
        }

        // 3. Signal generation
        let tick = {
            let ticks = self.last_good.read().await;
            ticks.get(symbol).cloned()
        };
        let Some(tick) = tick else {
            debug!("Orchestrator [{}]: no tick data yet", symbol);
            self.logger
                .log(self.record(
                    symbol,
                    verdict.mode,
                    verdict.reason,
                    Some("no tick data available".to_string()),
                    DecisionAction::Skip,
                    vec!["no tick data available".to_string()],
                    None,
                    false,
                    Vec::new(),
                    None,
                    None,
                    now,
                ))
                .await;
            return;
        };

        let raw = {
            let store = self.store.read().await;
            self.generator.evaluate_with(
                symbol,
                &store,
                tick.mid,
                self.filter.displacement_multiplier_for(symbol),
            )
        };
        let raw: RawSignal = match raw {
            Ok(raw) => raw,
            Err(rejection) => {
                let reason = rejection.reason();
                debug!("Orchestrator [{}]: no signal ({})", symbol, reason);
                self.logger
                    .log(self.record(
                        symbol,
                        verdict.mode,
                        verdict.reason,
                        Some(reason.clone()),
                        DecisionAction::Skip,
                        vec![format!("signal: {}", reason)],
                        None,
                        false,
                        Vec::new(),
                        None,
                        None,
                        now,
                    ))
                    .await;
                return;
            }
        };

        // 4. Execution filter
        let exposure = self.resolve_exposure(now).await;
        let (daily_high, daily_low) = self.daily_extremes(symbol, now).await;
        let order_flow = if self.order_flow.config().enabled {
            self.order_flow.snapshot(symbol).await
        } else {
            None
        };
        let ctx = FilterContext {
            strategy: self.strategy,
            guardrail_mode: verdict.mode,
            spread_pips: self.spread_cache.spread_pips(symbol),
            now,
            timezone: self.tz,
            today_trade_count: self.stats.trades_today(symbol, self.strategy),
            last_trade_at: self.stats.last_trade_at(symbol, self.strategy),
            current_price: tick.mid,
            daily_high,
            daily_low,
            exposure,
            loss_streak_paused: self.loss_streak.is_paused(symbol, now),
            order_flow,
        };
        let decision: ExecutionDecision = self.filter.evaluate(&raw, &ctx);
        if decision.action == DecisionAction::Skip {
            info!(
                "Orchestrator [{}]: filter SKIP ({} reasons)",
                symbol,
                decision.reasons.len()
            );
            self.logger
                .log(self.record(
                    symbol,
                    verdict.mode,
                    verdict.reason,
                    Some(raw.signal.reason.clone()),
                    DecisionAction::Skip,
                    decision.reasons,
                    None,
                    false,
                    Vec::new(),
                    None,
                    None,
                    now,
                ))
                .await;
            return;
        }

        // 5. Kill switch
        let ks = self.kill_switch.current();
        if ks.blocks(symbol, &self.strategy.to_string()) {
            warn!("Orchestrator [{}]: kill switch active, skipping", symbol);
            self.logger
                .log(self.record(
                    symbol,
                    verdict.mode,
                    verdict.reason,
                    Some(raw.signal.reason.clone()),
                    DecisionAction::Skip,
                    ks.reasons.clone(),
                    None,
                    true,
                    ks.reasons.clone(),
                    None,
                    None,
                    now,
                ))
                .await;
            return;
        }

        // 6. Risk service
        let risk_ctx = RiskContext {
            strategy: self.strategy,
            account_equity: self.stats.equity(),
            today_realized_pnl: self.stats.realized_today(self.strategy),
            trades_taken_today: self.stats.trades_today_strategy(self.strategy),
            guardrail_mode: verdict.mode,
            symbol: Some(symbol.to_string()),
        };
        let risk_decision = self.risk.can_take_new_trade(&risk_ctx);
        if !risk_decision.allowed {
            let reason = risk_decision
                .reason
                .unwrap_or_else(|| "risk blocked".to_string());
            info!("Orchestrator [{}]: risk blocked ({})", symbol, reason);
            self.logger
                .log(self.record(
                    symbol,
                    verdict.mode,
                    verdict.reason,
                    Some(raw.signal.reason.clone()),
                    DecisionAction::Skip,
                    vec![reason.clone()],
                    Some(reason),
                    false,
                    Vec::new(),
                    None,
                    None,
                    now,
                ))
                .await;
            return;
        }

        // 7. Position sizing
        let signal = &raw.signal;
        let sl_pips = pip::price_to_pips(symbol, (signal.entry - signal.stop_loss).abs());
        let risk_pct = risk_decision
            .adjusted_risk_percent
            .unwrap_or(Decimal::ZERO);
        let lots = self
            .risk
            .position_size(symbol, risk_ctx.account_equity, risk_pct, sl_pips, signal.entry);
        if lots <= Decimal::ZERO {
            let reason = "position size not positive".to_string();
            self.logger
                .log(self.record(
                    symbol,
                    verdict.mode,
                    verdict.reason,
                    Some(signal.reason.clone()),
                    DecisionAction::Skip,
                    vec![reason.clone()],
                    Some(reason),
                    false,
                    Vec::new(),
                    None,
                    None,
                    now,
                ))
                .await;
            return;
        }

        // 8. Submit and store the exit plan keyed by the returned ticket
        let request = TradeRequest {
            symbol: symbol.to_string(),
            direction: signal.direction,
            order_kind: signal.order_kind,
            volume: lots,
            entry_price: (signal.order_kind != OrderKind::Market).then_some(signal.entry),
            stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
            stop_limit_price: None,
            magic_number: self.magic_number,
            comment: format!("aegis:{}:{}", self.strategy, signal.direction),
        };
        let request_json = serde_json::to_value(&request).ok();

        match self.broker.open_trade(&request).await {
            Ok(result) if result.success => {
                let result_json = serde_json::to_value(&result).ok();
                if let Some(ticket) = result.ticket {
                    self.ingestor.register_strategy(ticket, self.strategy);
                    self.stats.record_trade_opened(symbol, self.strategy, now);
                    let plan = self.build_exit_plan(signal);
                    if let Err(e) = self.exit_plans.save(ticket, &plan).await {
                        error!("Orchestrator [{}]: exit plan persist failed: {}", symbol, e);
                    }
                    info!(
                        "Orchestrator [{}]: TRADE {} {} lots @ {} (ticket {})",
                        symbol, signal.direction, lots, signal.entry, ticket
                    );
                }
                self.logger
                    .log(self.record(
                        symbol,
                        verdict.mode,
                        verdict.reason,
                        Some(signal.reason.clone()),
                        DecisionAction::Trade,
                        Vec::new(),
                        None,
                        false,
                        Vec::new(),
                        request_json,
                        result_json,
                        now,
                    ))
                    .await;
            }
            Ok(result) => {
                let reason = result
                    .error
                    .clone()
                    .unwrap_or_else(|| "broker rejected order".to_string());
                warn!("Orchestrator [{}]: broker rejected: {}", symbol, reason);
                self.logger
                    .log(self.record(
                        symbol,
                        verdict.mode,
                        verdict.reason,
                        Some(signal.reason.clone()),
                        DecisionAction::Skip,
                        vec![format!("execution: {}", reason)],
                        None,
                        false,
                        Vec::new(),
                        request_json,
                        serde_json::to_value(&result).ok(),
                        now,
                    ))
                    .await;
            }
            Err(e) => {
                error!("Orchestrator [{}]: broker submit failed: {}", symbol, e);
                self.logger
                    .log(self.record(
                        symbol,
                        verdict.mode,
                        verdict.reason,
                        Some(signal.reason.clone()),
                        DecisionAction::Skip,
                        vec![format!("execution error: {}", e)],
                        None,
                        false,
                        Vec::new(),
                        request_json,
                        None,
                        now,
                    ))
                    .await;
            }
        }
    }

    /// One loop iteration over every configured symbol. Every failure mode
    /// inside `evaluate_symbol` resolves to a logged SKIP, so one symbol's
    /// bad cycle cannot halt the loop.
    pub async fn run_cycle(&self, now: DateTime<Utc>) {
        for symbol in &self.symbols {
            self.evaluate_symbol(symbol, now).await;
        }
    }

    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            "Orchestrator: loop started ({} symbols, strategy {})",
            self.symbols.len(),
            self.strategy
        );
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_cycle(Utc::now()).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Orchestrator: shutdown");
                        return;
                    }
                }
            }
        }
    }
}
