use crate::config::KillSwitchConfig;
use crate::domain::risk::context::StrategyKind;
use crate::domain::risk::kill_switch::{KillSwitchScope, KillSwitchState};
use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use std::sync::RwLock;
use tracing::{info, warn};

/// One strategy's slice of the readings. Carries only amounts that are
/// actually attributed to the strategy, so a lone strategy blowing its caps
/// is distinguishable from the account as a whole doing so.
#[derive(Debug, Clone)]
pub struct StrategyInputs {
    pub strategy: StrategyKind,
    pub daily_realized_pnl: Decimal,
    pub trades_today: u32,
}

/// Aggregated readings the kill switch evaluates each cycle.
#[derive(Debug, Clone)]
pub struct KillSwitchInputs {
    pub daily_realized_pnl: Decimal,
    pub weekly_realized_pnl: Decimal,
    pub starting_equity: Decimal,
    pub max_consecutive_losses: u32,
    pub trades_today: u32,
    pub trades_this_week: u32,
    pub worst_spread: Option<(String, Decimal)>,
    pub total_exposure_risk: Decimal,
    pub strategies: Vec<StrategyInputs>,
}

/// A state transition worth persisting and publishing.
#[derive(Debug, Clone)]
pub struct KillSwitchTransition {
    pub state: KillSwitchState,
}

/// Evaluates loss, streak, trade-count, spread and exposure thresholds and
/// holds the process-wide armed state.
///
/// Condition-derived reasons (losing streak, spread, exposure) disarm on
/// their own once the condition clears; realized-loss and trade-count
/// reasons hold until the configured day/week boundary or an operator
/// reset.
pub struct KillSwitchService {
    config: KillSwitchConfig,
    tz: Tz,
    state: RwLock<KillSwitchState>,
}

const TRANSIENT_REASONS: &[&str] = &[
    "kill_switch: losing_streak",
    "kill_switch: spread",
    "kill_switch: exposure",
];

impl KillSwitchService {
    pub fn new(config: KillSwitchConfig, tz: Tz) -> Self {
        Self {
            config,
            tz,
            state: RwLock::new(KillSwitchState::disarmed()),
        }
    }

    pub fn current(&self) -> KillSwitchState {
        self.state.read().expect("kill switch lock poisoned").clone()
    }

    pub fn is_blocked(&self, symbol: &str, strategy: &str) -> bool {
        self.current().blocks(symbol, strategy)
    }

    fn breached_reasons(&self, inputs: &KillSwitchInputs) -> (Vec<String>, KillSwitchScope) {
        let cfg = &self.config;
        let pct_cap = inputs.starting_equity * cfg.daily_max_loss_pct / Decimal::ONE_HUNDRED;
        let daily_loss_breached = |pnl: Decimal| {
            pnl <= -cfg.daily_max_loss || (pct_cap > Decimal::ZERO && pnl <= -pct_cap)
        };

        // Account-wide thresholds arm the global scope
        let mut global_reasons = Vec::new();
        if daily_loss_breached(inputs.daily_realized_pnl) {
            global_reasons.push("kill_switch: daily_loss".to_string());
        }
        if inputs.weekly_realized_pnl <= -cfg.weekly_max_loss {
            global_reasons.push("kill_switch: weekly_loss".to_string());
        }
        if inputs.max_consecutive_losses >= cfg.max_losing_streak {
            global_reasons.push("kill_switch: losing_streak".to_string());
        }
        if inputs.trades_today >= cfg.max_daily_trades {
            global_reasons.push("kill_switch: daily_trades".to_string());
        }
        if inputs.trades_this_week >= cfg.max_weekly_trades {
            global_reasons.push("kill_switch: weekly_trades".to_string());
        }
        if inputs.total_exposure_risk > cfg.max_exposure_risk {
            global_reasons.push("kill_switch: exposure".to_string());
        }

        // Per-strategy loss and trade-count thresholds
        let mut strategy_breaches: Vec<(StrategyKind, Vec<String>)> = Vec::new();
        for s in &inputs.strategies {
            let mut reasons = Vec::new();
            if daily_loss_breached(s.daily_realized_pnl) {
                reasons.push("kill_switch: daily_loss".to_string());
            }
            if s.trades_today >= cfg.max_daily_trades {
                reasons.push("kill_switch: daily_trades".to_string());
            }
            if !reasons.is_empty() {
                strategy_breaches.push((s.strategy, reasons));
            }
        }

        let spread_symbol = match &inputs.worst_spread {
            Some((symbol, spread)) if *spread > cfg.max_spread_pips => Some(symbol.clone()),
            _ => None,
        };

        // Scope resolution: a lone strategy breach arms only that strategy
        // and a lone spread breach only that symbol; anything broader (or
        // any combination) arms globally with the merged reason list.
        let global_active = !global_reasons.is_empty();
        let combined = usize::from(global_active)
            + strategy_breaches.len()
            + usize::from(spread_symbol.is_some());
        if global_active || combined > 1 {
            let mut reasons = global_reasons;
            for (_, strategy_reasons) in strategy_breaches {
                for reason in strategy_reasons {
                    if !reasons.contains(&reason) {
                        reasons.push(reason);
                    }
                }
            }
            if spread_symbol.is_some() {
                reasons.push("kill_switch: spread".to_string());
            }
            return (reasons, KillSwitchScope::Global);
        }
        if let Some((strategy, reasons)) = strategy_breaches.into_iter().next() {
            return (reasons, KillSwitchScope::Strategy(strategy.to_string()));
        }
        if let Some(symbol) = spread_symbol {
            return (
                vec!["kill_switch: spread".to_string()],
                KillSwitchScope::Symbol(symbol),
            );
        }
        (Vec::new(), KillSwitchScope::Global)
    }

    /// Runs one evaluation. Returns a transition when the armed state
    /// changed (to be persisted and published by the caller).
    pub fn evaluate(
        &self,
        inputs: &KillSwitchInputs,
        now: DateTime<Utc>,
    ) -> Option<KillSwitchTransition> {
        if !self.config.enabled {
            return None;
        }
        let (reasons, scope) = self.breached_reasons(inputs);
        let mut state = self.state.write().expect("kill switch lock poisoned");

        if state.active {
            // Transient-only armings clear once their conditions clear
            let all_transient = state
                .reasons
                .iter()
                .all(|r| TRANSIENT_REASONS.iter().any(|t| r.starts_with(t)));
            if all_transient && reasons.is_empty() {
                info!("KillSwitch: transient conditions cleared, disarming");
                *state = KillSwitchState::disarmed();
                return Some(KillSwitchTransition {
                    state: state.clone(),
                });
            }
            return None;
        }

        if reasons.is_empty() {
            return None;
        }

        warn!("KillSwitch: ARMING scope={} reasons={:?}", scope, reasons);
        *state = KillSwitchState::armed(scope, reasons, now);
        Some(KillSwitchTransition {
            state: state.clone(),
        })
    }

    /// Auto-disarm at the next day or week boundary (engine timezone).
    pub fn poll_auto_resume(&self, now: DateTime<Utc>) -> Option<KillSwitchTransition> {
        let mut state = self.state.write().expect("kill switch lock poisoned");
        if !state.active {
            return None;
        }
        let Some(armed_at) = state.activated_at else {
            return None;
        };

        let weekly = state
            .reasons
            .iter()
            .any(|r| r.contains("weekly"));
        let armed_local = armed_at.with_timezone(&self.tz);
        let now_local = now.with_timezone(&self.tz);

        let resume = if weekly {
            self.config.auto_resume_next_week
                && (now_local.iso_week().year(), now_local.iso_week().week())
                    != (armed_local.iso_week().year(), armed_local.iso_week().week())
        } else {
            self.config.auto_resume_next_day && now_local.date_naive() > armed_local.date_naive()
        };

        if resume {
            info!("KillSwitch: boundary reached, auto-disarming");
            *state = KillSwitchState::disarmed();
            return Some(KillSwitchTransition {
                state: state.clone(),
            });
        }
        None
    }

    /// Operator reset via the admin surface.
    pub fn operator_reset(&self, reason: &str) -> Option<KillSwitchTransition> {
        let mut state = self.state.write().expect("kill switch lock poisoned");
        if !state.active {
            return None;
        }
        info!("KillSwitch: operator reset ({})", reason);
        *state = KillSwitchState::disarmed();
        Some(KillSwitchTransition {
            state: state.clone(),
        })
    }
}
