use crate::application::events::order_event_ingestor::OrderEventIngestor;
use crate::application::risk::kill_switch::KillSwitchService;
use crate::config::ExitConfig;
use crate::domain::events::{OrderEvent, OrderEventType};
use crate::domain::exit::{ExitPlan, ExitProgress, TrailMode};
use crate::domain::market::candle_store::CandleStore;
use crate::domain::market::pip;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::market::types::{Direction, OpenPosition, Tick};
use crate::domain::ports::{BrokerAdapter, ExitPlanRepository};
use crate::domain::risk::kill_switch::KillSwitchScope;
use crate::domain::signal::structure::{detect_structure_events, last_swing_levels};
use crate::domain::signal::zones::atr;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::{RwLock, watch};
use tracing::{debug, error, info, warn};

/// One idempotent step the engine wants to take for a position.
#[derive(Debug, Clone, PartialEq)]
pub enum ExitAction {
    MoveStopToBreakEven { new_stop: Decimal },
    PartialClose { volume: Decimal },
    Trail { new_stop: Decimal },
    Close { reason: String },
}

/// Market context the pure planner needs; assembled by the engine from the
/// candle store and broker data.
#[derive(Debug, Clone, Default)]
pub struct ExitMarketView {
    pub current_price: Decimal,
    pub atr: Option<Decimal>,
    pub average_atr: Option<Decimal>,
    /// Most recent confirmed swing in the trade direction (low for longs,
    /// high for shorts), for structure trailing.
    pub trail_swing: Option<Decimal>,
    /// Opposite-direction BOS at or above the configured timeframe.
    pub opposite_structure_break: bool,
    pub commission: Decimal,
    pub swap: Decimal,
}

/// Decides which exits apply right now. Pure and idempotent: an action that
/// already ran (per `progress`) is never proposed again.
pub fn plan_exit_actions(
    position: &OpenPosition,
    plan: &ExitPlan,
    progress: &ExitProgress,
    view: &ExitMarketView,
    config: &ExitConfig,
    now: DateTime<Utc>,
) -> Vec<ExitAction> {
    let mut actions = Vec::new();
    let direction = position.direction;
    let price = view.current_price;
    let risk = plan.initial_risk();
    if risk.is_zero() {
        return actions;
    }

    let unrealized = match direction {
        Direction::Buy => price - plan.entry_price,
        Direction::Sell => plan.entry_price - price,
    };
    let unrealized_r = unrealized / risk;

    // Structural exit closes outright; no point stacking stop moves on top
    if config.structural_exit_enabled && view.opposite_structure_break {
        actions.push(ExitAction::Close {
            reason: "structural exit: opposite BOS".to_string(),
        });
        return actions;
    }

    // Time exit
    let time_limit = plan.time_limit_seconds.or(config.time_limit_seconds);
    if let Some(limit) = time_limit
        && (now - position.entry_time).num_seconds() >= limit
    {
        actions.push(ExitAction::Close {
            reason: "time exit".to_string(),
        });
        return actions;
    }

    // Commission exit: the position has gone nowhere past the dwell
    if config.commission_exit_enabled {
        let age = (now - position.entry_time).num_seconds();
        let pips = pip::price_to_pips(&position.symbol, unrealized.abs());
        let pip_value = pip::pip_value_per_lot(&position.symbol, plan.entry_price);
        let unrealized_money = pips * position.volume * pip_value;
        let friction = view.commission + view.swap;
        if age >= config.commission_exit_dwell_secs
            && friction > Decimal::ZERO
            && unrealized_money.abs() < friction
        {
            actions.push(ExitAction::Close {
                reason: "commission exit: profit below friction".to_string(),
            });
            return actions;
        }
    }

    // Break-even once unrealized profit reaches the trigger (in R)
    if config.break_even_enabled
        && !progress.break_even_done
        && unrealized_r >= plan.break_even_trigger_r
    {
        let improves = match (direction, position.stop_loss) {
            (Direction::Buy, Some(sl)) => sl < plan.entry_price,
            (Direction::Sell, Some(sl)) => sl > plan.entry_price,
            (_, None) => true,
        };
        if improves {
            actions.push(ExitAction::MoveStopToBreakEven {
                new_stop: plan.entry_price,
            });
        }
    }

    // Partial close at TP1, remainder becomes a runner
    if config.partial_enabled && !progress.partial_done {
        let reached = match direction {
            Direction::Buy => price >= plan.tp1,
            Direction::Sell => price <= plan.tp1,
        };
        if reached && plan.partial_close_percent > Decimal::ZERO {
            let volume = position.volume * plan.partial_close_percent;
            actions.push(ExitAction::PartialClose { volume });
        }
    }

    // Trailing applies to the runner only
    if progress.partial_done
        && let Some(candidate) = trail_stop_candidate(position, plan, view)
    {
        let improves_position = match direction {
            Direction::Buy => position.stop_loss.is_none_or(|sl| candidate > sl),
            Direction::Sell => position.stop_loss.is_none_or(|sl| candidate < sl),
        };
        let improves_progress = match (direction, progress.last_trail_stop) {
            (Direction::Buy, Some(last)) => candidate > last,
            (Direction::Sell, Some(last)) => candidate < last,
            (_, None) => true,
        };
        if improves_position && improves_progress {
            actions.push(ExitAction::Trail {
                new_stop: candidate,
            });
        }
    }

    actions
}

fn trail_stop_candidate(
    position: &OpenPosition,
    plan: &ExitPlan,
    view: &ExitMarketView,
) -> Option<Decimal> {
    let price = view.current_price;
    let distance = match plan.trail_mode {
        TrailMode::FixedPips => pip::pips_to_price(&position.symbol, plan.trail_value),
        TrailMode::Atr => plan.trail_value * view.atr?,
        TrailMode::Structure => {
            return view.trail_swing;
        }
        TrailMode::VolatilityAdaptive => {
            let atr = view.atr?;
            // Widen with realized volatility above its average
            let ratio = match view.average_atr {
                Some(avg) if avg > Decimal::ZERO => (atr / avg).max(Decimal::ONE),
                _ => Decimal::ONE,
            };
            plan.trail_value * atr * ratio
        }
    };
    if distance <= Decimal::ZERO {
        return None;
    }
    Some(match position.direction {
        Direction::Buy => price - distance,
        Direction::Sell => price + distance,
    })
}

/// Periodic engine that manages every open position with a stored exit
/// plan. Runs on its own cadence, independent of the tick loop; each
/// applied transition writes an order event through the ingestor.
pub struct ExitEngine {
    broker: Arc<dyn BrokerAdapter>,
    store: Arc<RwLock<CandleStore>>,
    plans: Arc<dyn ExitPlanRepository>,
    ingestor: Arc<OrderEventIngestor>,
    kill_switch: Arc<KillSwitchService>,
    last_good: Arc<RwLock<HashMap<String, Tick>>>,
    config: ExitConfig,
    structure_timeframe: Timeframe,
    flatten_on_kill_switch: bool,
}

impl ExitEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        broker: Arc<dyn BrokerAdapter>,
        store: Arc<RwLock<CandleStore>>,
        plans: Arc<dyn ExitPlanRepository>,
        ingestor: Arc<OrderEventIngestor>,
        kill_switch: Arc<KillSwitchService>,
        last_good: Arc<RwLock<HashMap<String, Tick>>>,
        config: ExitConfig,
        structure_timeframe: Timeframe,
        flatten_on_kill_switch: bool,
    ) -> Self {
        Self {
            broker,
            store,
            plans,
            ingestor,
            kill_switch,
            last_good,
            config,
            structure_timeframe,
            flatten_on_kill_switch,
        }
    }

    async fn market_view(&self, position: &OpenPosition) -> Option<ExitMarketView> {
        let price = {
            let ticks = self.last_good.read().await;
            ticks.get(&position.symbol).map(|t| t.mid)?
        };
        let store = self.store.read().await;
        let bars = store.aggregate(&position.symbol, self.structure_timeframe);
        let atr_now = atr(&bars, 14);
        let average_atr = atr(&bars, 50);
        let events = detect_structure_events(&bars, 1);
        let opposite = events
            .last()
            .is_some_and(|e| {
                e.direction == position.direction.opposite()
                    && e.kind == crate::domain::signal::types::BreakKind::Bos
            });
        let (swing_high, swing_low) = last_swing_levels(&bars, 1);
        let trail_swing = match position.direction {
            Direction::Buy => swing_low,
            Direction::Sell => swing_high,
        };
        Some(ExitMarketView {
            current_price: price,
            atr: atr_now,
            average_atr,
            trail_swing,
            opposite_structure_break: opposite,
            commission: Decimal::ZERO,
            swap: Decimal::ZERO,
        })
    }

    async fn apply_action(
        &self,
        position: &OpenPosition,
        progress: &mut ExitProgress,
        action: &ExitAction,
        now: DateTime<Utc>,
    ) {
        let ticket = position.ticket;
        match action {
            ExitAction::MoveStopToBreakEven { new_stop } => {
                match self
                    .broker
                    .modify_trade(ticket, Some(*new_stop), None)
                    .await
                {
                    Ok(()) => {
                        info!("ExitEngine [{}]: break-even, SL -> {}", ticket, new_stop);
                        progress.break_even_done = true;
                        self.record_transition(position, OrderEventType::Modified, Some(*new_stop), None, "break_even", now)
                            .await;
                    }
                    Err(e) => error!("ExitEngine [{}]: break-even modify failed: {}", ticket, e),
                }
            }
            ExitAction::Trail { new_stop } => {
                match self
                    .broker
                    .modify_trade(ticket, Some(*new_stop), None)
                    .await
                {
                    Ok(()) => {
                        debug!("ExitEngine [{}]: trail, SL -> {}", ticket, new_stop);
                        progress.last_trail_stop = Some(*new_stop);
                        self.record_transition(position, OrderEventType::Modified, Some(*new_stop), None, "trail", now)
                            .await;
                    }
                    Err(e) => error!("ExitEngine [{}]: trail modify failed: {}", ticket, e),
                }
            }
            ExitAction::PartialClose { volume } => {
                match self.broker.close_trade(ticket, Some(*volume)).await {
                    Ok(result) if result.success => {
                        info!("ExitEngine [{}]: partial close {} lots", ticket, volume);
                        progress.partial_done = true;
                        self.record_transition(position, OrderEventType::Partial, None, Some(*volume), "tp1_partial", now)
                            .await;
                    }
                    Ok(result) => {
                        warn!(
                            "ExitEngine [{}]: partial close rejected: {:?}",
                            ticket, result.error
                        );
                    }
                    Err(e) => error!("ExitEngine [{}]: partial close failed: {}", ticket, e),
                }
            }
            ExitAction::Close { reason } => {
                match self.broker.close_trade(ticket, None).await {
                    Ok(result) if result.success => {
                        info!("ExitEngine [{}]: closed ({})", ticket, reason);
                        // The broker's lifecycle webhook delivers the closed
                        // event; removing the plan here keeps the engine from
                        // re-proposing the exit.
                        if let Err(e) = self.plans.remove(ticket).await {
                            warn!("ExitEngine [{}]: plan cleanup failed: {}", ticket, e);
                        }
                    }
                    Ok(result) => {
                        warn!("ExitEngine [{}]: close rejected: {:?}", ticket, result.error)
                    }
                    Err(e) => error!("ExitEngine [{}]: close failed: {}", ticket, e),
                }
            }
        }
    }

    async fn record_transition(
        &self,
        position: &OpenPosition,
        event_type: OrderEventType,
        sl: Option<Decimal>,
        volume: Option<Decimal>,
        reason: &str,
        now: DateTime<Utc>,
    ) {
        let event = OrderEvent {
            event_type,
            ticket: position.ticket,
            position_id: None,
            symbol: position.symbol.clone(),
            direction: position.direction,
            volume: volume.unwrap_or(position.volume),
            entry_time: Some(position.entry_time),
            exit_time: None,
            entry_price: Some(position.entry_price),
            exit_price: None,
            sl: sl.or(position.stop_loss),
            tp: position.take_profit,
            commission: Decimal::ZERO,
            swap: Decimal::ZERO,
            profit: Decimal::ZERO,
            reason: reason.to_string(),
            raw: serde_json::Value::Null,
            timestamp: now,
        };
        self.ingestor.ingest(event).await;
    }

    /// One pass over every open position.
    pub async fn run_cycle(&self, now: DateTime<Utc>) {
        let positions = match self.broker.open_positions().await {
            Ok(positions) => positions,
            Err(e) => {
                warn!("ExitEngine: open-positions poll failed: {}", e);
                return;
            }
        };

        // Kill-switch flatten, when configured
        let ks = self.kill_switch.current();
        if ks.active && self.flatten_on_kill_switch {
            for position in &positions {
                let governed = match &ks.scope {
                    KillSwitchScope::Global => true,
                    KillSwitchScope::Symbol(s) => *s == position.symbol,
                    KillSwitchScope::Strategy(_) => false,
                };
                if governed {
                    info!("ExitEngine [{}]: kill-switch flatten", position.ticket);
                    if let Err(e) = self.broker.close_trade(position.ticket, None).await {
                        error!("ExitEngine [{}]: flatten failed: {}", position.ticket, e);
                    }
                }
            }
            return;
        }

        for position in &positions {
            let loaded = match self.plans.load(position.ticket).await {
                Ok(Some(loaded)) => loaded,
                Ok(None) => continue,
                Err(e) => {
                    warn!("ExitEngine [{}]: plan load failed: {}", position.ticket, e);
                    continue;
                }
            };
            let (plan, mut progress) = loaded;
            let Some(view) = self.market_view(position).await else {
                debug!("ExitEngine [{}]: no market view yet", position.ticket);
                continue;
            };

            let actions = plan_exit_actions(position, &plan, &progress, &view, &self.config, now);
            if actions.is_empty() {
                continue;
            }
            let before = progress.clone();
            for action in &actions {
                self.apply_action(position, &mut progress, action, now).await;
            }
            if progress != before
                && let Err(e) = self.plans.update_progress(position.ticket, &progress).await
            {
                warn!("ExitEngine [{}]: progress persist failed: {}", position.ticket, e);
            }
        }
    }

    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval =
            tokio::time::interval(StdDuration::from_secs(self.config.poll_interval_sec.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_cycle(Utc::now()).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("ExitEngine: shutdown");
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
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn position(direction: Direction, sl: Option<Decimal>) -> OpenPosition {
        OpenPosition {
            ticket: 42,
            symbol: "XAUUSD".to_string(),
            direction,
            volume: dec!(0.2),
            entry_price: dec!(2650),
            entry_time: Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap(),
            stop_loss: sl,
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

    fn view(price: Decimal) -> ExitMarketView {
        ExitMarketView {
            current_price: price,
            ..Default::default()
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 6, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_break_even_at_one_r() {
        // Entry 2650, SL 2640: 1R = 10. Price touches 2660.
        let actions = plan_exit_actions(
            &position(Direction::Buy, Some(dec!(2640))),
            &plan(),
            &ExitProgress::default(),
            &view(dec!(2660)),
            &ExitConfig::default(),
            now(),
        );
        assert!(
            actions.contains(&ExitAction::MoveStopToBreakEven {
                new_stop: dec!(2650)
            }),
            "{:?}",
            actions
        );
    }

    #[test]
    fn test_break_even_not_before_trigger() {
        let actions = plan_exit_actions(
            &position(Direction::Buy, Some(dec!(2640))),
            &plan(),
            &ExitProgress::default(),
            &view(dec!(2659)),
            &ExitConfig::default(),
            now(),
        );
        assert!(actions.is_empty(), "{:?}", actions);
    }

    #[test]
    fn test_break_even_is_idempotent() {
        let progress = ExitProgress {
            break_even_done: true,
            ..Default::default()
        };
        let actions = plan_exit_actions(
            &position(Direction::Buy, Some(dec!(2650))),
            &plan(),
            &progress,
            &view(dec!(2662)),
            &ExitConfig::default(),
            now(),
        );
        assert!(actions.is_empty(), "{:?}", actions);
    }

    #[test]
    fn test_partial_close_at_tp1() {
        let actions = plan_exit_actions(
            &position(Direction::Buy, Some(dec!(2650))),
            &plan(),
            &ExitProgress {
                break_even_done: true,
                ..Default::default()
            },
            &view(dec!(2670)),
            &ExitConfig::default(),
            now(),
        );
        assert!(
            actions.contains(&ExitAction::PartialClose { volume: dec!(0.1) }),
            "{:?}",
            actions
        );
    }

    #[test]
    fn test_trailing_after_partial() {
        let progress = ExitProgress {
            break_even_done: true,
            partial_done: true,
            last_trail_stop: None,
        };
        // Fixed 30 pips on gold = 3.0; price 2675 -> stop 2672
        let actions = plan_exit_actions(
            &position(Direction::Buy, Some(dec!(2650))),
            &plan(),
            &progress,
            &view(dec!(2675)),
            &ExitConfig::default(),
            now(),
        );
        assert!(
            actions.contains(&ExitAction::Trail {
                new_stop: dec!(2672)
            }),
            "{:?}",
            actions
        );
    }

    #[test]
    fn test_trailing_never_retreats() {
        let progress = ExitProgress {
            break_even_done: true,
            partial_done: true,
            last_trail_stop: Some(dec!(2673)),
        };
        let actions = plan_exit_actions(
            &position(Direction::Buy, Some(dec!(2650))),
            &plan(),
            &progress,
            &view(dec!(2675)),
            &ExitConfig::default(),
            now(),
        );
        assert!(actions.is_empty(), "{:?}", actions);
    }

    #[test]
    fn test_structural_exit_takes_priority() {
        let mut v = view(dec!(2660));
        v.opposite_structure_break = true;
        let actions = plan_exit_actions(
            &position(Direction::Buy, Some(dec!(2640))),
            &plan(),
            &ExitProgress::default(),
            &v,
            &ExitConfig::default(),
            now(),
        );
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], ExitAction::Close { .. }));
    }

    #[test]
    fn test_time_exit() {
        let mut p = plan();
        p.time_limit_seconds = Some(600);
        // 30 minutes elapsed > 10 minute limit
        let actions = plan_exit_actions(
            &position(Direction::Buy, Some(dec!(2640))),
            &p,
            &ExitProgress::default(),
            &view(dec!(2651)),
            &ExitConfig::default(),
            now(),
        );
        assert!(matches!(&actions[0], ExitAction::Close { reason } if reason.contains("time")));
    }

    #[test]
    fn test_commission_exit_past_dwell() {
        let mut config = ExitConfig::default();
        config.commission_exit_dwell_secs = 600;
        let mut v = view(dec!(2650.01)); // ~flat
        v.commission = dec!(1.5);
        let actions = plan_exit_actions(
            &position(Direction::Buy, Some(dec!(2640))),
            &plan(),
            &ExitProgress::default(),
            &v,
            &config,
            now(),
        );
        assert!(
            matches!(&actions[0], ExitAction::Close { reason } if reason.contains("commission")),
            "{:?}",
            actions
        );
    }

    #[test]
    fn test_sell_side_break_even() {
        let sell = OpenPosition {
            direction: Direction::Sell,
            stop_loss: Some(dec!(2660)),
            ..position(Direction::Sell, Some(dec!(2660)))
        };
        let p = ExitPlan {
            entry_price: dec!(2650),
            stop_loss_initial: dec!(2660),
            tp1: dec!(2630),
            ..plan()
        };
        let actions = plan_exit_actions(
            &sell,
            &p,
            &ExitProgress::default(),
            &view(dec!(2640)),
            &ExitConfig::default(),
            now(),
        );
        assert!(
            actions.contains(&ExitAction::MoveStopToBreakEven {
                new_stop: dec!(2650)
            }),
            "{:?}",
            actions
        );
    }
}
