use crate::domain::market::types::Direction;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Broker lifecycle event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEventType {
    Opened,
    Closed,
    Modified,
    Partial,
    SlHit,
    TpHit,
}

impl OrderEventType {
    /// Events that terminate (all or part of) a position and realize PnL.
    pub fn is_close_family(self) -> bool {
        matches!(
            self,
            OrderEventType::Closed | OrderEventType::SlHit | OrderEventType::TpHit
        )
    }
}

impl fmt::Display for OrderEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderEventType::Opened => "opened",
            OrderEventType::Closed => "closed",
            OrderEventType::Modified => "modified",
            OrderEventType::Partial => "partial",
            OrderEventType::SlHit => "sl_hit",
            OrderEventType::TpHit => "tp_hit",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for OrderEventType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "opened" => Ok(OrderEventType::Opened),
            "closed" => Ok(OrderEventType::Closed),
            "modified" => Ok(OrderEventType::Modified),
            "partial" => Ok(OrderEventType::Partial),
            "sl_hit" => Ok(OrderEventType::SlHit),
            "tp_hit" => Ok(OrderEventType::TpHit),
            _ => anyhow::bail!("Invalid order event type: {}", s),
        }
    }
}

/// Source-of-truth record for closed trades and live PnL, delivered by the
/// broker bridge webhook. Idempotency key: (ticket, event_type, timestamp).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEvent {
    pub event_type: OrderEventType,
    pub ticket: i64,
    #[serde(default)]
    pub position_id: Option<i64>,
    pub symbol: String,
    pub direction: Direction,
    pub volume: Decimal,
    #[serde(default)]
    pub entry_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exit_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub entry_price: Option<Decimal>,
    #[serde(default)]
    pub exit_price: Option<Decimal>,
    #[serde(default)]
    pub sl: Option<Decimal>,
    #[serde(default)]
    pub tp: Option<Decimal>,
    #[serde(default)]
    pub commission: Decimal,
    #[serde(default)]
    pub swap: Decimal,
    #[serde(default)]
    pub profit: Decimal,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub raw: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl OrderEvent {
    pub fn idempotency_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.ticket,
            self.event_type,
            self.timestamp.timestamp_millis()
        )
    }
}

/// Engine-internal events published on the bus. One-directional: the
/// ingestor publishes, subscribers (equity, loss streak, decision log) react.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    TradeClosed {
        symbol: String,
        strategy: Option<String>,
        profit: Decimal,
        ticket: i64,
        closed_at: DateTime<Utc>,
    },
    TradeOpened {
        symbol: String,
        ticket: i64,
        direction: Direction,
    },
    KillSwitchChanged {
        active: bool,
        reasons: Vec<String>,
    },
}

pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &EngineEvent);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_close_family() {
        assert!(OrderEventType::Closed.is_close_family());
        assert!(OrderEventType::SlHit.is_close_family());
        assert!(OrderEventType::TpHit.is_close_family());
        assert!(!OrderEventType::Opened.is_close_family());
        assert!(!OrderEventType::Modified.is_close_family());
        assert!(!OrderEventType::Partial.is_close_family());
    }

    #[test]
    fn test_event_type_roundtrip() {
        for t in [
            OrderEventType::Opened,
            OrderEventType::Closed,
            OrderEventType::Modified,
            OrderEventType::Partial,
            OrderEventType::SlHit,
            OrderEventType::TpHit,
        ] {
            assert_eq!(t.to_string().parse::<OrderEventType>().unwrap(), t);
        }
    }

    #[test]
    fn test_idempotency_key_is_stable() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 6, 12, 0, 0).unwrap();
        let event = OrderEvent {
            event_type: OrderEventType::SlHit,
            ticket: 42,
            position_id: None,
            symbol: "XAUUSD".to_string(),
            direction: Direction::Buy,
            volume: dec!(0.1),
            entry_time: None,
            exit_time: Some(ts),
            entry_price: Some(dec!(2650)),
            exit_price: Some(dec!(2640)),
            sl: Some(dec!(2640)),
            tp: Some(dec!(2680)),
            commission: dec!(0.2),
            swap: dec!(0),
            profit: dec!(-100),
            reason: String::new(),
            raw: serde_json::Value::Null,
            timestamp: ts,
        };
        assert_eq!(event.idempotency_key(), format!("42:sl_hit:{}", ts.timestamp_millis()));
    }
}
