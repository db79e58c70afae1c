use crate::domain::signal::types::TradeSignal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DecisionAction {
    Trade,
    Skip,
}

impl fmt::Display for DecisionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionAction::Trade => write!(f, "TRADE"),
            DecisionAction::Skip => write!(f, "SKIP"),
        }
    }
}

/// Outcome of the execution filter.
///
/// `Trade` is only ever constructed through [`ExecutionDecision::from_reasons`]
/// with an empty reason list; a SKIP carries every failing reason because the
/// gates never short-circuit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionDecision {
    pub action: DecisionAction,
    pub reasons: Vec<String>,
    pub signal: Option<TradeSignal>,
}

impl ExecutionDecision {
    pub fn from_reasons(reasons: Vec<String>, signal: TradeSignal) -> Self {
        if reasons.is_empty() {
            Self {
                action: DecisionAction::Trade,
                reasons,
                signal: Some(signal),
            }
        } else {
            Self {
                action: DecisionAction::Skip,
                reasons,
                signal: Some(signal),
            }
        }
    }

    /// A skip produced outside the filter (guardrail, kill switch, risk).
    pub fn skip(reasons: Vec<String>) -> Self {
        Self {
            action: DecisionAction::Skip,
            reasons,
            signal: None,
        }
    }

    pub fn is_trade(&self) -> bool {
        self.action == DecisionAction::Trade
    }
}
