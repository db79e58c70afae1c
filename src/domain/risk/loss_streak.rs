use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-symbol losing-streak state. A streak at or past the threshold arms a
/// pause window; a profitable close resets everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LossStreakState {
    pub consecutive_losses: u32,
    pub paused_until: Option<DateTime<Utc>>,
}

impl LossStreakState {
    pub fn is_paused(&self, now: DateTime<Utc>) -> bool {
        self.paused_until.is_some_and(|until| now < until)
    }

    /// Applies one realized trade result. Returns true when this update armed
    /// the pause.
    pub fn on_trade_closed(
        &mut self,
        profit: Decimal,
        threshold: u32,
        pause: Duration,
        now: DateTime<Utc>,
    ) -> bool {
        if profit >= Decimal::ZERO {
            self.consecutive_losses = 0;
            self.paused_until = None;
            return false;
        }
        self.consecutive_losses += 1;
        if self.consecutive_losses >= threshold && !self.is_paused(now) {
            self.paused_until = Some(now + pause);
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 6, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_losses_accumulate_and_arm_pause() {
        let mut state = LossStreakState::default();
        let pause = Duration::minutes(60);

        assert!(!state.on_trade_closed(dec!(-10), 3, pause, t0()));
        assert!(!state.on_trade_closed(dec!(-5), 3, pause, t0()));
        assert_eq!(state.consecutive_losses, 2);
        assert!(!state.is_paused(t0()));

        // Third loss arms the pause
        assert!(state.on_trade_closed(dec!(-1), 3, pause, t0()));
        assert!(state.is_paused(t0()));
        assert!(state.is_paused(t0() + Duration::minutes(59)));
        assert!(!state.is_paused(t0() + Duration::minutes(60)));
    }

    #[test]
    fn test_profit_resets() {
        let mut state = LossStreakState {
            consecutive_losses: 4,
            paused_until: Some(t0() + Duration::minutes(30)),
        };
        state.on_trade_closed(dec!(25), 3, Duration::minutes(60), t0());
        assert_eq!(state.consecutive_losses, 0);
        assert!(!state.is_paused(t0()));
    }

    #[test]
    fn test_breakeven_counts_as_reset() {
        let mut state = LossStreakState {
            consecutive_losses: 2,
            paused_until: None,
        };
        state.on_trade_closed(dec!(0), 3, Duration::minutes(60), t0());
        assert_eq!(state.consecutive_losses, 0);
    }
}
