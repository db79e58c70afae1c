use crate::domain::risk::loss_streak::LossStreakState;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{info, warn};

/// Per-symbol loss-streak throttle.
///
/// Profit resets the counter; a loss at the threshold arms a pause window
/// the execution filter checks before admitting new trades.
pub struct LossStreakService {
    threshold: u32,
    pause: Duration,
    states: Mutex<HashMap<String, LossStreakState>>,
}

impl LossStreakService {
    pub fn new(threshold: u32, pause_minutes: i64) -> Self {
        Self {
            threshold,
            pause: Duration::minutes(pause_minutes),
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Applies a realized result. Returns true when the pause armed.
    pub fn on_trade_closed(&self, symbol: &str, profit: Decimal, now: DateTime<Utc>) -> bool {
        let mut states = self.states.lock().expect("loss streak lock poisoned");
        let state = states.entry(symbol.to_string()).or_default();
        let armed = state.on_trade_closed(profit, self.threshold, self.pause, now);
        if armed {
            warn!(
                "LossStreakService [{}]: {} consecutive losses, pausing until {:?}",
                symbol, state.consecutive_losses, state.paused_until
            );
        } else if profit >= Decimal::ZERO && state.consecutive_losses == 0 {
            info!("LossStreakService [{}]: streak reset", symbol);
        }
        armed
    }

    pub fn is_paused(&self, symbol: &str, now: DateTime<Utc>) -> bool {
        let states = self.states.lock().expect("loss streak lock poisoned");
        states.get(symbol).is_some_and(|s| s.is_paused(now))
    }

    pub fn streak(&self, symbol: &str) -> u32 {
        let states = self.states.lock().expect("loss streak lock poisoned");
        states.get(symbol).map_or(0, |s| s.consecutive_losses)
    }

    /// Worst streak across the book, fed to the kill switch.
    pub fn max_streak(&self) -> u32 {
        let states = self.states.lock().expect("loss streak lock poisoned");
        states.values().map(|s| s.consecutive_losses).max().unwrap_or(0)
    }

    pub fn state(&self, symbol: &str) -> LossStreakState {
        let states = self.states.lock().expect("loss streak lock poisoned");
        states.get(symbol).cloned().unwrap_or_default()
    }
}
