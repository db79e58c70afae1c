use thiserror::Error;

/// Errors surfaced by the broker bridge.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Broker request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Broker timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("Broker rejected order: {reason}")]
    OrderRejected { reason: String },

    #[error("Invalid broker payload: {reason}")]
    InvalidPayload { reason: String },
}

/// Errors surfaced by the news-guardrail client.
#[derive(Debug, Error)]
pub enum GuardrailError {
    #[error("Guardrail request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Guardrail timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("Invalid guardrail payload: {reason}")]
    InvalidPayload { reason: String },
}

/// Data-quality problems the signal generator distinguishes from "no setup".
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Insufficient candles for {symbol} on {timeframe}: need {needed}, have {have}")]
    InsufficientCandles {
        symbol: String,
        timeframe: String,
        needed: usize,
        have: usize,
    },

    #[error("Stale tick for {symbol}: age {age_secs}s")]
    StaleTick { symbol: String, age_secs: i64 },
}

/// Persistence failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_formatting() {
        let e = DataError::InsufficientCandles {
            symbol: "XAUUSD".to_string(),
            timeframe: "H4".to_string(),
            needed: 60,
            have: 12,
        };
        let msg = e.to_string();
        assert!(msg.contains("XAUUSD"));
        assert!(msg.contains("60"));
        assert!(msg.contains("12"));
    }

    #[test]
    fn test_broker_error_formatting() {
        let e = BrokerError::Timeout { duration_ms: 5000 };
        assert!(e.to_string().contains("5000"));
    }
}
