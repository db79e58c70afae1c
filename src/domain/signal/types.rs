use crate::domain::market::timeframe::Timeframe;
use crate::domain::market::types::{Direction, OrderKind};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Higher-timeframe directional bias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Bias {
    Bullish,
    Bearish,
    #[default]
    Sideways,
}

impl Bias {
    pub fn direction(self) -> Option<Direction> {
        match self {
            Bias::Bullish => Some(Direction::Buy),
            Bias::Bearish => Some(Direction::Sell),
            Bias::Sideways => None,
        }
    }

    pub fn agrees_with(self, direction: Direction) -> bool {
        self.direction() == Some(direction)
    }
}

impl fmt::Display for Bias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bias::Bullish => write!(f, "bullish"),
            Bias::Bearish => write!(f, "bearish"),
            Bias::Sideways => write!(f, "sideways"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwingKind {
    High,
    Low,
}

/// A confirmed pivot point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    pub index: usize,
    pub kind: SwingKind,
    pub price: Decimal,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BreakKind {
    /// Break of Structure: continuation beyond the last swing in trend.
    Bos,
    /// Change of Character: first break against the prevailing sequence.
    Choch,
}

/// A structural break: a close beyond a confirmed swing level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StructureEvent {
    pub kind: BreakKind,
    pub direction: Direction,
    pub level: Decimal,
    pub index: usize,
    pub time: DateTime<Utc>,
}

/// Three-candle imbalance: the middle candle's range is not overlapped by
/// its neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fvg {
    pub direction: Direction,
    pub upper: Decimal,
    pub lower: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Fvg {
    pub fn midpoint(&self) -> Decimal {
        (self.upper + self.lower) / Decimal::TWO
    }

    pub fn contains(&self, price: Decimal) -> bool {
        price >= self.lower && price <= self.upper
    }
}

/// The last counter-trend candle before a displacement; a supply/demand zone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBlockZone {
    /// Direction of the trade this block supports.
    pub direction: Direction,
    pub high: Decimal,
    pub low: Decimal,
    pub open: Decimal,
    pub close: Decimal,
    pub time: DateTime<Utc>,
}

impl OrderBlockZone {
    /// Entry anchor: zone low for longs, zone high for shorts.
    pub fn entry_anchor(&self) -> Decimal {
        match self.direction {
            Direction::Buy => self.low,
            Direction::Sell => self.high,
        }
    }

    pub fn contains(&self, price: Decimal, buffer: Decimal) -> bool {
        price >= self.low - buffer && price <= self.high + buffer
    }
}

/// Where price sits inside the current dealing range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangePosition {
    Premium,
    Discount,
    Equilibrium,
}

/// Full SMC annotation carried on a signal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalMetadata {
    pub htf_bias: Bias,
    pub structure_break: Option<StructureEvent>,
    pub liquidity_swept: bool,
    pub displacement_candle: bool,
    pub fvg_htf: Option<Fvg>,
    pub fvg_ltf: Option<Fvg>,
    pub order_block: Option<OrderBlockZone>,
    pub premium_discount: Option<RangePosition>,
    /// Intermediate-timeframe flow (M15).
    pub itf_flow: Option<Bias>,
    /// Direction the recent volume imbalance supports.
    pub volume_imbalance: Option<Direction>,
    /// Direction a correlated-instrument divergence supports, when known.
    pub smt_divergence: Option<Direction>,
    pub session: Option<String>,
    /// Upstream session validity; the filter trusts `Some(true)` and falls
    /// back to its own hour check otherwise.
    pub session_valid: Option<bool>,
    pub confluence_score: Option<u32>,
    pub confluence_reasons: Vec<String>,
    /// Forward-compatible annotations.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extensions: HashMap<String, serde_json::Value>,
}

/// Multi-timeframe context attached to a raw signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeframeContext {
    pub htf: Timeframe,
    pub htf_trend: Bias,
    pub ltf: Timeframe,
    pub ltf_structure: Option<BreakKind>,
    pub last_bos: Option<Direction>,
    pub last_choch: Option<Direction>,
}

/// A fully-specified trade proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeSignal {
    pub symbol: String,
    pub direction: Direction,
    pub entry: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub order_kind: OrderKind,
    pub reason: String,
    pub meta: SignalMetadata,
}

/// The single input to the execution filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSignal {
    pub signal: TradeSignal,
    pub context: TimeframeContext,
}

/// Machine-readable reasons the generator declined to emit a signal.
///
/// `DataNotReady` is the only variant that means "come back later"; the rest
/// mean "no setup here".
#[derive(Debug, Clone, PartialEq)]
pub enum SignalRejection {
    DataNotReady {
        timeframe: Timeframe,
        needed: usize,
        have: usize,
    },
    NoDirectionalBias,
    NoStructureBreak {
        timeframe: Timeframe,
    },
    NoDisplacement,
    NoImbalance,
    NoOrderBlock,
    PriceOutsideZone,
    NoEntryConfirmation,
}

impl SignalRejection {
    pub fn reason(&self) -> String {
        match self {
            SignalRejection::DataNotReady {
                timeframe,
                needed,
                have,
            } => format!("data not ready: {} needs {} bars, have {}", timeframe, needed, have),
            SignalRejection::NoDirectionalBias => "no directional bias".to_string(),
            SignalRejection::NoStructureBreak { timeframe } => {
                format!("no structure break on {}", timeframe)
            }
            SignalRejection::NoDisplacement => "no displacement candle".to_string(),
            SignalRejection::NoImbalance => "no fair value gap".to_string(),
            SignalRejection::NoOrderBlock => "no order block".to_string(),
            SignalRejection::PriceOutsideZone => "price outside setup zone".to_string(),
            SignalRejection::NoEntryConfirmation => "no entry confirmation".to_string(),
        }
    }

    pub fn is_data_not_ready(&self) -> bool {
        matches!(self, SignalRejection::DataNotReady { .. })
    }
}
