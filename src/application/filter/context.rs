use crate::domain::market::order_flow::OrderFlowSnapshot;
use crate::domain::news::GuardrailMode;
use crate::domain::risk::context::StrategyKind;
use crate::domain::risk::exposure::ExposureSnapshot;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;

/// How the exposure view was obtained. The orchestrator resolves the
/// in-memory snapshot first, falls back to DB aggregation on a cache miss,
/// and marks `Unavailable` when the DB query itself failed — which the
/// filter turns into a conservative skip.
#[derive(Debug, Clone)]
pub enum ExposureResolution {
    Snapshot(ExposureSnapshot),
    DbFallback(ExposureSnapshot),
    Unavailable,
}

/// Everything the filter needs beyond the raw signal. Assembled by the
/// orchestrator so the filter itself stays pure and never suspends.
#[derive(Debug, Clone)]
pub struct FilterContext {
    pub strategy: StrategyKind,
    pub guardrail_mode: GuardrailMode,
    pub spread_pips: Option<Decimal>,
    pub now: DateTime<Utc>,
    pub timezone: Tz,
    pub today_trade_count: u32,
    pub last_trade_at: Option<DateTime<Utc>>,
    pub current_price: Decimal,
    pub daily_high: Option<Decimal>,
    pub daily_low: Option<Decimal>,
    pub exposure: ExposureResolution,
    pub loss_streak_paused: bool,
    pub order_flow: Option<OrderFlowSnapshot>,
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use crate::domain::market::timeframe::Timeframe;
    use crate::domain::market::types::{Direction, OrderKind};
    use crate::domain::signal::types::{
        Bias, BreakKind, RawSignal, SignalMetadata, TimeframeContext, TradeSignal,
    };
    use chrono::TimeZone;
    use chrono_tz::UTC;
    use rust_decimal_macros::dec;

    /// A context that passes every gate for the default XAUUSD rules.
    pub fn passing_context() -> FilterContext {
        let now = Utc.with_ymd_and_hms(2025, 1, 6, 10, 0, 0).unwrap();
        FilterContext {
            strategy: StrategyKind::Low,
            guardrail_mode: GuardrailMode::Normal,
            spread_pips: Some(dec!(25)),
            now,
            timezone: UTC,
            today_trade_count: 2,
            last_trade_at: Some(now - chrono::Duration::minutes(20)),
            current_price: dec!(2650),
            daily_high: Some(dec!(2680)),
            daily_low: Some(dec!(2630)),
            exposure: ExposureResolution::Snapshot(ExposureSnapshot::empty(now)),
            loss_streak_paused: false,
            order_flow: None,
        }
    }

    /// A buy signal whose metadata satisfies every confirmation gate.
    pub fn passing_buy_signal(symbol: &str) -> RawSignal {
        let meta = SignalMetadata {
            htf_bias: Bias::Bullish,
            structure_break: None,
            liquidity_swept: true,
            displacement_candle: true,
            fvg_htf: Some(crate::domain::signal::types::Fvg {
                direction: Direction::Buy,
                upper: dec!(2652),
                lower: dec!(2648),
                created_at: Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap(),
            }),
            fvg_ltf: None,
            order_block: None,
            premium_discount: Some(crate::domain::signal::types::RangePosition::Discount),
            itf_flow: Some(Bias::Bullish),
            volume_imbalance: Some(Direction::Buy),
            smt_divergence: None,
            session: Some("london".to_string()),
            session_valid: Some(true),
            confluence_score: Some(70),
            confluence_reasons: vec!["HTF bias aligned".to_string()],
            extensions: Default::default(),
        };
        RawSignal {
            signal: TradeSignal {
                symbol: symbol.to_string(),
                direction: Direction::Buy,
                entry: dec!(2650),
                stop_loss: dec!(2640),
                take_profit: dec!(2670),
                order_kind: OrderKind::Limit,
                reason: "test signal".to_string(),
                meta,
            },
            context: TimeframeContext {
                htf: Timeframe::H4,
                htf_trend: Bias::Bullish,
                ltf: Timeframe::M1,
                ltf_structure: Some(BreakKind::Choch),
                last_bos: Some(Direction::Buy),
                last_choch: None,
            },
        }
    }
}
