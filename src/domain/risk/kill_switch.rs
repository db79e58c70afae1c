use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What an armed kill switch applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "scope", content = "target")]
pub enum KillSwitchScope {
    Global,
    Symbol(String),
    Strategy(String),
}

impl fmt::Display for KillSwitchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KillSwitchScope::Global => write!(f, "global"),
            KillSwitchScope::Symbol(s) => write!(f, "symbol:{}", s),
            KillSwitchScope::Strategy(s) => write!(f, "strategy:{}", s),
        }
    }
}

impl KillSwitchScope {
    /// Whether an evaluation for (symbol, strategy) falls inside this scope.
    pub fn covers(&self, symbol: &str, strategy: &str) -> bool {
        match self {
            KillSwitchScope::Global => true,
            KillSwitchScope::Symbol(s) => s == symbol,
            KillSwitchScope::Strategy(s) => s == strategy,
        }
    }
}

/// Process-wide armed state. Reset rules: auto-disarm at the next day or
/// week boundary per configuration, or an operator reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KillSwitchState {
    pub active: bool,
    pub reasons: Vec<String>,
    pub activated_at: Option<DateTime<Utc>>,
    pub scope: KillSwitchScope,
}

impl KillSwitchState {
    pub fn disarmed() -> Self {
        Self {
            active: false,
            reasons: Vec::new(),
            activated_at: None,
            scope: KillSwitchScope::Global,
        }
    }

    pub fn armed(scope: KillSwitchScope, reasons: Vec<String>, at: DateTime<Utc>) -> Self {
        Self {
            active: true,
            reasons,
            activated_at: Some(at),
            scope,
        }
    }

    pub fn blocks(&self, symbol: &str, strategy: &str) -> bool {
        self.active && self.scope.covers(symbol, strategy)
    }
}

/// Persisted row for every arm/disarm transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KillSwitchEvent {
    pub timestamp: DateTime<Utc>,
    pub scope: String,
    pub active: bool,
    pub reasons: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_scope_covers() {
        assert!(KillSwitchScope::Global.covers("XAUUSD", "low"));
        assert!(KillSwitchScope::Symbol("XAUUSD".to_string()).covers("XAUUSD", "high"));
        assert!(!KillSwitchScope::Symbol("XAUUSD".to_string()).covers("EURUSD", "high"));
        assert!(KillSwitchScope::Strategy("low".to_string()).covers("EURUSD", "low"));
        assert!(!KillSwitchScope::Strategy("low".to_string()).covers("EURUSD", "high"));
    }

    #[test]
    fn test_blocks_requires_active() {
        let t = Utc.with_ymd_and_hms(2025, 1, 6, 12, 0, 0).unwrap();
        let disarmed = KillSwitchState::disarmed();
        assert!(!disarmed.blocks("XAUUSD", "low"));

        let armed = KillSwitchState::armed(
            KillSwitchScope::Global,
            vec!["kill_switch: daily_loss".to_string()],
            t,
        );
        assert!(armed.blocks("XAUUSD", "low"));
        assert!(armed.blocks("EURUSD", "high"));
    }
}
