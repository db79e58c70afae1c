//! Multi-gate execution filter.
//!
//! The primary safety rail of the pipeline. Every gate runs in documented
//! order and appends its reason; nothing short-circuits, so a SKIP row
//! always carries the complete list of failures. `TRADE` is returned iff
//! the reason list is empty.

mod context;

pub use context::{ExposureResolution, FilterContext};

use crate::config::{ExecutionFilterConfig, OrderFlowConfig};
use crate::domain::decision::ExecutionDecision;
use crate::domain::market::session::in_any_session;
use crate::domain::market::types::Direction;
use crate::domain::risk::exposure::ExposureSnapshot;
use crate::domain::signal::types::{Bias, RangePosition, RawSignal};
use chrono::Duration;
use rust_decimal::Decimal;
use tracing::{debug, warn};

pub struct ExecutionFilter {
    config: ExecutionFilterConfig,
    order_flow: OrderFlowConfig,
    max_concurrent_trades_global: usize,
    max_daily_risk_global: Decimal,
}

impl ExecutionFilter {
    pub fn new(
        config: ExecutionFilterConfig,
        order_flow: OrderFlowConfig,
        max_concurrent_trades_global: usize,
        max_daily_risk_global: Decimal,
    ) -> Self {
        Self {
            config,
            order_flow,
            max_concurrent_trades_global,
            max_daily_risk_global,
        }
    }

    /// Per-symbol displacement threshold, consumed by the signal generator.
    pub fn displacement_multiplier_for(&self, symbol: &str) -> Option<Decimal> {
        self.config
            .rules_for(symbol)
            .map(|r| r.displacement_min_atr_multiplier)
    }

    pub fn evaluate(&self, raw: &RawSignal, ctx: &FilterContext) -> ExecutionDecision {
        let signal = &raw.signal;
        let symbol = signal.symbol.as_str();
        let direction = signal.direction;
        let meta = &signal.meta;

        // 1. Symbol rules must exist; without them there is nothing safe to
        //    evaluate against.
        let Some(rules) = self.config.rules_for(symbol) else {
            return ExecutionDecision::from_reasons(
                vec!["no execution rules configured".to_string()],
                signal.clone(),
            );
        };

        let mut reasons: Vec<String> = Vec::new();

        if !rules.enabled {
            reasons.push("symbol disabled in execution rules".to_string());
        }
        if !rules.allowed_directions.contains(&direction) {
            reasons.push(format!("direction {} not allowed", direction));
        }

        // 2. Guardrail mode block list
        if rules.blocked_guardrail_modes.contains(&ctx.guardrail_mode) {
            reasons.push(format!(
                "guardrail mode {} blocked for symbol",
                ctx.guardrail_mode
            ));
        }

        // 3. Session: trust an upstream sessionValid=true, otherwise fall
        //    back to the hour-based check in the engine timezone.
        let session_ok = match meta.session_valid {
            Some(true) => true,
            _ => in_any_session(&rules.sessions, ctx.now, ctx.timezone),
        };
        if !session_ok {
            reasons.push("outside configured sessions".to_string());
        }

        // 4. HTF alignment
        if rules.require_htf_alignment {
            let aligned = match raw.context.htf_trend {
                Bias::Sideways => rules.allow_range_htf,
                trend => trend.agrees_with(direction),
            };
            if !aligned {
                reasons.push(format!(
                    "HTF trend {} not aligned with {}",
                    raw.context.htf_trend, direction
                ));
            }
        }

        // 5. Structural: BOS direction, CHoCH fallback
        if rules.require_bos {
            let structural = raw.context.last_bos.or(raw.context.last_choch);
            if structural != Some(direction) {
                reasons.push("structure break direction mismatch".to_string());
            }
        }

        // 6. Liquidity sweep
        if rules.require_liquidity_sweep && !meta.liquidity_swept {
            reasons.push("liquidity sweep required but absent".to_string());
        }

        // 7. Displacement
        if rules.require_displacement && !meta.displacement_candle {
            reasons.push("displacement candle required but absent".to_string());
        }

        // 8. Premium/discount (when metadata present)
        if rules.require_premium_discount
            && let Some(position) = meta.premium_discount
        {
            let positioned = match direction {
                Direction::Buy => position == RangePosition::Discount,
                Direction::Sell => position == RangePosition::Premium,
            };
            if !positioned {
                reasons.push(match direction {
                    Direction::Buy => "buy outside discount zone".to_string(),
                    Direction::Sell => "sell outside premium zone".to_string(),
                });
            }
        }

        // 9. ITF flow must not run counter to HTF
        if let Some(flow) = meta.itf_flow
            && let Some(flow_dir) = flow.direction()
            && flow_dir == direction.opposite()
        {
            reasons.push("ITF flow counter to HTF".to_string());
        }

        // 10. FVG presence on at least one timeframe
        if rules.require_fvg && meta.fvg_htf.is_none() && meta.fvg_ltf.is_none() {
            reasons.push("no fair value gap present".to_string());
        }

        // 11. Volume-imbalance alignment: hard rule by default, soft mode
        //     logs only (declared deployment decision).
        if rules.require_volume_imbalance_alignment
            && let Some(imbalance) = meta.volume_imbalance
            && imbalance != direction
        {
            if self.config.soft_volume_imbalance {
                warn!(
                    "ExecutionFilter [{}]: volume imbalance misaligned (soft mode, not blocking)",
                    symbol
                );
            } else {
                reasons.push("volume imbalance misaligned".to_string());
            }
        }

        // 12. Confluence minimum. Option semantics matter: Some(0) is an
        //     explicit minimum of zero, None is unset.
        if let Some(min_score) = rules.min_confluence_score {
            let score = meta.confluence_score.unwrap_or(0);
            if score < min_score {
                reasons.push(format!(
                    "confluence score {} below minimum {}",
                    score, min_score
                ));
            }
        }

        // 13. SMT divergence, when present, must not contradict
        if let Some(smt) = meta.smt_divergence
            && smt != direction
        {
            reasons.push("SMT divergence contradicts direction".to_string());
        }

        // 14. Spread cap: equal to the cap is accepted
        match ctx.spread_pips {
            Some(spread) if spread > rules.max_spread_pips => {
                reasons.push(format!(
                    "spread {} pips exceeds max {}",
                    spread, rules.max_spread_pips
                ));
            }
            Some(_) => {}
            None => reasons.push("spread unavailable".to_string()),
        }

        // 15. Trade-count cap per (symbol, strategy, day)
        if ctx.today_trade_count >= rules.max_trades_per_day {
            reasons.push(format!(
                "daily trade cap reached ({}/{})",
                ctx.today_trade_count, rules.max_trades_per_day
            ));
        }

        // 16. Cooldown
        if let Some(last) = ctx.last_trade_at {
            let elapsed = ctx.now - last;
            let required = Duration::minutes(rules.min_minutes_between_trades);
            if elapsed < required {
                reasons.push(format!(
                    "Cooldown not satisfied: {}min since last trade < {}min",
                    elapsed.num_minutes(),
                    rules.min_minutes_between_trades
                ));
            }
        }

        // 17. Loss-streak pause
        if ctx.loss_streak_paused {
            reasons.push("loss-streak pause active for symbol".to_string());
        }

        // 18. Exposure caps; a failed DB fallback is a conservative skip
        match &ctx.exposure {
            ExposureResolution::Snapshot(snapshot)
            | ExposureResolution::DbFallback(snapshot) => {
                self.check_exposure(snapshot, symbol, direction, rules, &mut reasons);
            }
            ExposureResolution::Unavailable => {
                reasons.push("Exposure snapshot DB error - conservative skip".to_string());
            }
        }

        // 19. Distance from daily extremes (when available)
        if let Some(min_distance) = rules.min_distance_from_daily_extreme_pips {
            let extreme = match direction {
                Direction::Buy => ctx.daily_high,
                Direction::Sell => ctx.daily_low,
            };
            if let Some(extreme) = extreme {
                let distance =
                    crate::domain::market::pip::price_to_pips(symbol, (extreme - ctx.current_price).abs());
                if distance < min_distance {
                    reasons.push(format!(
                        "too close to daily extreme ({} pips < {})",
                        distance.round_dp(1),
                        min_distance
                    ));
                }
            }
        }

        // 20. Order-flow gates (enabled and snapshot fresh); degraded flow
        //     data skips the gates rather than blocking.
        if self.config.order_flow_gates_enabled && self.order_flow.enabled {
            match &ctx.order_flow {
                Some(flow)
                    if flow.is_fresh(
                        ctx.now,
                        Duration::seconds(self.order_flow.max_snapshot_age_secs),
                    ) =>
                {
                    self.check_order_flow(flow, direction, &mut reasons);
                }
                Some(_) => {
                    debug!("ExecutionFilter [{}]: order-flow snapshot stale, gates skipped", symbol);
                }
                None => {
                    debug!("ExecutionFilter [{}]: no order-flow snapshot, gates skipped", symbol);
                }
            }
        }

        ExecutionDecision::from_reasons(reasons, signal.clone())
    }

    fn check_exposure(
        &self,
        snapshot: &ExposureSnapshot,
        symbol: &str,
        direction: Direction,
        rules: &crate::config::SymbolRules,
        reasons: &mut Vec<String>,
    ) {
        let exposure = snapshot.symbol(symbol);
        if exposure.total_count >= rules.max_concurrent_trades_per_symbol {
            reasons.push(format!(
                "max concurrent trades per symbol reached ({}/{})",
                exposure.total_count, rules.max_concurrent_trades_per_symbol
            ));
        }
        let direction_count = match direction {
            Direction::Buy => exposure.long_count,
            Direction::Sell => exposure.short_count,
        };
        if direction_count >= rules.max_concurrent_trades_per_direction {
            reasons.push(format!(
                "max concurrent {} trades reached ({}/{})",
                direction, direction_count, rules.max_concurrent_trades_per_direction
            ));
        }
        if snapshot.total_open_trades >= self.max_concurrent_trades_global {
            reasons.push(format!(
                "max concurrent trades global reached ({}/{})",
                snapshot.total_open_trades, self.max_concurrent_trades_global
            ));
        }
        if exposure.estimated_risk_amount > rules.max_daily_risk_per_symbol {
            reasons.push(format!(
                "daily risk cap for symbol exceeded ({} > {})",
                exposure.estimated_risk_amount, rules.max_daily_risk_per_symbol
            ));
        }
        if snapshot.total_estimated_risk_amount > self.max_daily_risk_global {
            reasons.push(format!(
                "daily risk cap global exceeded ({} > {})",
                snapshot.total_estimated_risk_amount, self.max_daily_risk_global
            ));
        }
    }

    fn check_order_flow(
        &self,
        flow: &crate::domain::market::order_flow::OrderFlowSnapshot,
        direction: Direction,
        reasons: &mut Vec<String>,
    ) {
        let threshold = self.order_flow.min_delta_trend_confirmation;

        // Strong opposition of the 15s delta
        let opposing = match direction {
            Direction::Buy => flow.delta_15s < -threshold,
            Direction::Sell => flow.delta_15s > threshold,
        };
        if opposing {
            reasons.push("order flow delta opposes direction".to_string());
        }

        // Reversal exhaustion: a delta spike whose momentum has collapsed
        let exhaustion = self.order_flow.exhaustion_threshold;
        let exhausted = match direction {
            Direction::Buy => flow.delta_60s >= exhaustion && flow.delta_momentum <= -exhaustion,
            Direction::Sell => flow.delta_60s <= -exhaustion && flow.delta_momentum >= exhaustion,
        };
        if exhausted {
            reasons.push("reversal exhaustion detected".to_string());
        }

        // Same-sign delta confirmation
        let confirmed = match direction {
            Direction::Buy => flow.delta_15s > Decimal::ZERO,
            Direction::Sell => flow.delta_15s < Decimal::ZERO,
        };
        if !confirmed {
            reasons.push("order flow delta not aligned with direction".to_string());
        }

        // Large opposing orders
        let opposing_large = match direction {
            Direction::Buy => flow.large_sell_orders,
            Direction::Sell => flow.large_buy_orders,
        };
        if opposing_large >= self.order_flow.max_opposing_large_orders {
            reasons.push(format!("{} large opposing orders detected", opposing_large));
        }

        // Absorption on the opposite side
        let absorbed = match direction {
            Direction::Buy => flow.absorption_sell_side,
            Direction::Sell => flow.absorption_buy_side,
        };
        if absorbed {
            reasons.push("absorption against direction".to_string());
        }
    }
}
