use crate::domain::market::candle_store::CandleStore;
use crate::domain::market::pip;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::market::types::{Direction, OrderKind};
use crate::domain::signal::structure::{
    bias_from_events, detect_liquidity_sweep, detect_structure_events, last_swing_levels,
};
use crate::domain::signal::types::{
    Bias, BreakKind, RangePosition, RawSignal, SignalMetadata, SignalRejection, StructureEvent,
    TimeframeContext, TradeSignal,
};
use crate::domain::signal::zones::{
    find_displacement, fvg_at_displacement, order_block_before, range_position,
    volume_imbalance_direction,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

/// Tuning for the SMC/ICT cascade. Relaxations are explicit options here,
/// never silent defaults.
#[derive(Debug, Clone)]
pub struct SmcConfig {
    pub htf: Timeframe,
    pub itf: Timeframe,
    pub ltf: Timeframe,
    /// Pivot width; 1 = three-candle swing detection.
    pub swing_range: usize,
    pub atr_period: usize,
    pub displacement_atr_multiplier: Decimal,
    pub displacement_lookback: usize,
    pub sweep_lookback: usize,
    pub risk_reward: Decimal,
    pub min_htf_bars: usize,
    pub min_itf_bars: usize,
    pub min_ltf_bars: usize,
    /// How far price may sit outside the setup zone, in pips.
    pub zone_buffer_pips: Decimal,
    /// Stop distance beyond the refined order block, in pips.
    pub sl_buffer_pips: Decimal,
    /// Accept an M1 BOS when no M1 CHoCH confirms the entry.
    pub allow_bos_fallback_on_ltf: bool,
}

impl Default for SmcConfig {
    fn default() -> Self {
        Self {
            htf: Timeframe::H4,
            itf: Timeframe::M15,
            ltf: Timeframe::M1,
            swing_range: 1,
            atr_period: 14,
            displacement_atr_multiplier: dec!(2.0),
            displacement_lookback: 20,
            sweep_lookback: 5,
            risk_reward: dec!(3),
            min_htf_bars: 30,
            min_itf_bars: 50,
            min_ltf_bars: 30,
            zone_buffer_pips: dec!(5),
            sl_buffer_pips: dec!(3),
            allow_bos_fallback_on_ltf: true,
        }
    }
}

/// Multi-timeframe SMC/ICT signal generator.
///
/// Pure with respect to its inputs: the candle store view and the current
/// price fully determine the output.
#[derive(Debug, Clone)]
pub struct SmcSignalGenerator {
    config: SmcConfig,
}

impl SmcSignalGenerator {
    pub fn new(config: SmcConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SmcConfig {
        &self.config
    }

    /// Runs the H4 bias -> M15 setup -> M1 refinement cascade.
    pub fn evaluate(
        &self,
        symbol: &str,
        store: &CandleStore,
        current_price: Decimal,
    ) -> Result<RawSignal, SignalRejection> {
        self.evaluate_with(symbol, store, current_price, None)
    }

    /// Like [`evaluate`](Self::evaluate) with a per-symbol displacement
    /// multiplier override.
    pub fn evaluate_with(
        &self,
        symbol: &str,
        store: &CandleStore,
        current_price: Decimal,
        displacement_multiplier: Option<Decimal>,
    ) -> Result<RawSignal, SignalRejection> {
        let cfg = &self.config;
        let displacement_multiplier =
            displacement_multiplier.unwrap_or(cfg.displacement_atr_multiplier);

        // 1. HTF bias
        let htf_bars = store.aggregate(symbol, cfg.htf);
        if htf_bars.len() < cfg.min_htf_bars {
            return Err(SignalRejection::DataNotReady {
                timeframe: cfg.htf,
                needed: cfg.min_htf_bars,
                have: htf_bars.len(),
            });
        }
        let htf_events = detect_structure_events(&htf_bars, cfg.swing_range);
        let bias = bias_from_events(&htf_events);
        let Some(direction) = bias.direction() else {
            return Err(SignalRejection::NoDirectionalBias);
        };

        // 2. ITF setup zone
        let itf_bars = store.aggregate(symbol, cfg.itf);
        if itf_bars.len() < cfg.min_itf_bars {
            return Err(SignalRejection::DataNotReady {
                timeframe: cfg.itf,
                needed: cfg.min_itf_bars,
                have: itf_bars.len(),
            });
        }
        let itf_events = detect_structure_events(&itf_bars, cfg.swing_range);
        let setup_break = itf_events
            .iter()
            .rev()
            .find(|e| e.direction == direction)
            .copied();
        let Some(setup_break) = setup_break else {
            return Err(SignalRejection::NoStructureBreak { timeframe: cfg.itf });
        };

        let Some(displacement_idx) = find_displacement(
            &itf_bars,
            direction,
            displacement_multiplier,
            cfg.atr_period,
            cfg.displacement_lookback,
        ) else {
            return Err(SignalRejection::NoDisplacement);
        };

        let fvg_itf = fvg_at_displacement(&itf_bars, displacement_idx, direction);
        let ob_itf = order_block_before(&itf_bars, displacement_idx, direction, 10);
        // Setup zone: FVG preferred, order block otherwise
        let (zone_upper, zone_lower) = match (&fvg_itf, &ob_itf) {
            (Some(fvg), _) => (fvg.upper, fvg.lower),
            (None, Some(ob)) => (ob.high, ob.low),
            (None, None) => return Err(SignalRejection::NoImbalance),
        };

        let swept = detect_liquidity_sweep(&itf_bars, direction, cfg.swing_range, cfg.sweep_lookback);

        // 3. LTF refinement
        let ltf_bars = store.aggregate(symbol, cfg.ltf);
        if ltf_bars.len() < cfg.min_ltf_bars {
            return Err(SignalRejection::DataNotReady {
                timeframe: cfg.ltf,
                needed: cfg.min_ltf_bars,
                have: ltf_bars.len(),
            });
        }

        let zone_buffer = pip::pips_to_price(symbol, cfg.zone_buffer_pips);
        if current_price < zone_lower - zone_buffer || current_price > zone_upper + zone_buffer {
            return Err(SignalRejection::PriceOutsideZone);
        }

        let ltf_events = detect_structure_events(&ltf_bars, cfg.swing_range);
        let entry_break = ltf_events
            .iter()
            .rev()
            .find(|e| e.direction == direction && e.kind == BreakKind::Choch)
            .or_else(|| {
                if cfg.allow_bos_fallback_on_ltf {
                    ltf_events
                        .iter()
                        .rev()
                        .find(|e| e.direction == direction && e.kind == BreakKind::Bos)
                } else {
                    None
                }
            })
            .copied();
        let Some(entry_break) = entry_break else {
            return Err(SignalRejection::NoEntryConfirmation);
        };

        let ob_ltf = order_block_before(&ltf_bars, entry_break.index, direction, 10);
        // Entry anchor: refined M1 order block, 50% FVG as fallback
        let (entry, anchor_desc) = match (&ob_ltf, &fvg_itf) {
            (Some(ob), _) => (ob.entry_anchor(), "M1 order block"),
            (None, Some(fvg)) => (fvg.midpoint(), "50% FVG"),
            (None, None) => return Err(SignalRejection::NoOrderBlock),
        };

        // 4. Stops and targets
        let sl_buffer = pip::pips_to_price(symbol, cfg.sl_buffer_pips);
        let stop_loss = match (&ob_ltf, direction) {
            (Some(ob), Direction::Buy) => ob.low - sl_buffer,
            (Some(ob), Direction::Sell) => ob.high + sl_buffer,
            (None, Direction::Buy) => zone_lower - sl_buffer,
            (None, Direction::Sell) => zone_upper + sl_buffer,
        };
        let risk = (entry - stop_loss).abs();
        if risk.is_zero() {
            return Err(SignalRejection::NoOrderBlock);
        }
        let take_profit = match direction {
            Direction::Buy => entry + cfg.risk_reward * risk,
            Direction::Sell => entry - cfg.risk_reward * risk,
        };
        let order_kind = if entry == current_price {
            OrderKind::Market
        } else {
            OrderKind::Limit
        };

        // Metadata and confluence
        let m1_displacement = find_displacement(
            &ltf_bars,
            direction,
            displacement_multiplier,
            cfg.atr_period,
            cfg.displacement_lookback,
        );
        let fvg_ltf =
            m1_displacement.and_then(|idx| fvg_at_displacement(&ltf_bars, idx, direction));

        let (range_high, range_low) = last_swing_levels(&itf_bars, cfg.swing_range);
        let premium_discount = match (range_high, range_low) {
            (Some(high), Some(low)) => Some(range_position(current_price, high, low)),
            _ => None,
        };
        let itf_flow = Some(bias_from_events(&itf_events));
        let volume_imbalance = volume_imbalance_direction(&ltf_bars, 20);

        let (confluence_score, confluence_reasons) = score_confluence(
            direction,
            &setup_break,
            swept,
            fvg_itf.is_some(),
            ob_itf.is_some(),
            premium_discount,
        );

        let meta = SignalMetadata {
            htf_bias: bias,
            structure_break: Some(setup_break),
            liquidity_swept: swept,
            displacement_candle: true,
            fvg_htf: fvg_itf,
            fvg_ltf,
            order_block: ob_ltf.or(ob_itf),
            premium_discount,
            itf_flow,
            volume_imbalance,
            smt_divergence: None,
            session: None,
            session_valid: None,
            confluence_score: Some(confluence_score),
            confluence_reasons,
            extensions: Default::default(),
        };

        let last_bos = itf_events
            .iter()
            .rev()
            .find(|e| e.kind == BreakKind::Bos)
            .map(|e| e.direction);
        let last_choch = itf_events
            .iter()
            .rev()
            .find(|e| e.kind == BreakKind::Choch)
            .map(|e| e.direction);

        let reason = format!(
            "SMC: {} {} | {} {} + {:?} {} + displacement, entry at {}",
            direction, symbol, cfg.htf, bias, setup_break.kind, cfg.itf, anchor_desc
        );
        debug!(
            "SmcSignalGenerator [{}]: {} (score {})",
            symbol, reason, confluence_score
        );

        Ok(RawSignal {
            signal: TradeSignal {
                symbol: symbol.to_string(),
                direction,
                entry,
                stop_loss,
                take_profit,
                order_kind,
                reason,
                meta,
            },
            context: TimeframeContext {
                htf: cfg.htf,
                htf_trend: bias,
                ltf: cfg.ltf,
                ltf_structure: Some(entry_break.kind),
                last_bos,
                last_choch,
            },
        })
    }
}

fn score_confluence(
    direction: Direction,
    setup_break: &StructureEvent,
    swept: bool,
    has_fvg: bool,
    has_ob: bool,
    premium_discount: Option<RangePosition>,
) -> (u32, Vec<String>) {
    let mut score = 20; // HTF alignment is a precondition of reaching here
    let mut reasons = vec!["HTF bias aligned".to_string()];

    if setup_break.kind == BreakKind::Bos {
        score += 15;
        reasons.push("BOS continuation".to_string());
    } else {
        score += 10;
        reasons.push("CHoCH reversal".to_string());
    }
    if swept {
        score += 15;
        reasons.push("liquidity swept".to_string());
    }
    if has_fvg {
        score += 15;
        reasons.push("fair value gap".to_string());
    }
    if has_ob {
        score += 10;
        reasons.push("order block".to_string());
    }
    let positioned = match (direction, premium_discount) {
        (Direction::Buy, Some(RangePosition::Discount)) => true,
        (Direction::Sell, Some(RangePosition::Premium)) => true,
        _ => false,
    };
    if positioned {
        score += 10;
        reasons.push("optimal range position".to_string());
    }
    // Displacement is a precondition as well
    score += 15;
    reasons.push("displacement".to_string());

    (score, reasons)
}
