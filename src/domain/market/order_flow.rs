use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One aggressive print inferred from tick movement: positive volume for
/// lifts, negative for hits.
#[derive(Debug, Clone, Copy)]
pub struct FlowEvent {
    pub time: DateTime<Utc>,
    pub signed_volume: Decimal,
}

impl FlowEvent {
    pub fn magnitude(&self) -> Decimal {
        self.signed_volume.abs()
    }
}

/// Point-in-time order-flow metrics for one symbol. Replaced as a whole by
/// the snapshotter; readers never see a partially built snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFlowSnapshot {
    pub symbol: String,
    pub delta_1s: Decimal,
    pub delta_5s: Decimal,
    pub delta_15s: Decimal,
    pub delta_60s: Decimal,
    pub cumulative_delta: Decimal,
    /// 0..=100 score of aggressive buying.
    pub buy_pressure: Decimal,
    /// 0..=100 score of aggressive selling.
    pub sell_pressure: Decimal,
    /// (buy - sell) / total over the 60s window, -1..=1.
    pub imbalance: Decimal,
    pub large_buy_orders: usize,
    pub large_sell_orders: usize,
    pub absorption_buy_side: bool,
    pub absorption_sell_side: bool,
    /// delta_15s now minus delta_15s one window ago.
    pub delta_momentum: Decimal,
    pub captured_at: DateTime<Utc>,
}

impl OrderFlowSnapshot {
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now - self.captured_at <= max_age
    }
}

fn window_delta(events: &VecDeque<FlowEvent>, now: DateTime<Utc>, secs: i64) -> Decimal {
    let cutoff = now - Duration::seconds(secs);
    events
        .iter()
        .rev()
        .take_while(|e| e.time >= cutoff)
        .map(|e| e.signed_volume)
        .sum()
}

/// Median magnitude over the retained event window; zero when empty.
pub fn rolling_median_magnitude(events: &VecDeque<FlowEvent>) -> Decimal {
    if events.is_empty() {
        return Decimal::ZERO;
    }
    let mut magnitudes: Vec<Decimal> = events.iter().map(|e| e.magnitude()).collect();
    magnitudes.sort();
    let mid = magnitudes.len() / 2;
    if magnitudes.len() % 2 == 1 {
        magnitudes[mid]
    } else {
        (magnitudes[mid - 1] + magnitudes[mid]) / Decimal::TWO
    }
}

/// Builds a snapshot from the retained flow events.
///
/// `large_order_multiplier` scales the rolling median to classify "large"
/// prints. `prev_delta_15s` feeds delta momentum. Absorption: heavy one-sided
/// volume in the last 15s while net delta stays near flat, meaning the other
/// side is soaking it up.
pub fn build_snapshot(
    symbol: &str,
    events: &VecDeque<FlowEvent>,
    cumulative_delta: Decimal,
    prev_delta_15s: Decimal,
    large_order_multiplier: Decimal,
    now: DateTime<Utc>,
) -> OrderFlowSnapshot {
    let delta_1s = window_delta(events, now, 1);
    let delta_5s = window_delta(events, now, 5);
    let delta_15s = window_delta(events, now, 15);
    let delta_60s = window_delta(events, now, 60);

    let cutoff_60 = now - Duration::seconds(60);
    let mut buy_volume = Decimal::ZERO;
    let mut sell_volume = Decimal::ZERO;
    for e in events.iter().rev().take_while(|e| e.time >= cutoff_60) {
        if e.signed_volume > Decimal::ZERO {
            buy_volume += e.signed_volume;
        } else {
            sell_volume += -e.signed_volume;
        }
    }
    let total = buy_volume + sell_volume;
    let (buy_pressure, sell_pressure, imbalance) = if total > Decimal::ZERO {
        (
            buy_volume * Decimal::ONE_HUNDRED / total,
            sell_volume * Decimal::ONE_HUNDRED / total,
            (buy_volume - sell_volume) / total,
        )
    } else {
        (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO)
    };

    let median = rolling_median_magnitude(events);
    let threshold = median * large_order_multiplier;
    let mut large_buy_orders = 0;
    let mut large_sell_orders = 0;
    if threshold > Decimal::ZERO {
        for e in events.iter().rev().take_while(|e| e.time >= cutoff_60) {
            if e.magnitude() >= threshold {
                if e.signed_volume > Decimal::ZERO {
                    large_buy_orders += 1;
                } else {
                    large_sell_orders += 1;
                }
            }
        }
    }

    let cutoff_15 = now - Duration::seconds(15);
    let mut buy_15 = Decimal::ZERO;
    let mut sell_15 = Decimal::ZERO;
    for e in events.iter().rev().take_while(|e| e.time >= cutoff_15) {
        if e.signed_volume > Decimal::ZERO {
            buy_15 += e.signed_volume;
        } else {
            sell_15 += -e.signed_volume;
        }
    }
    let total_15 = buy_15 + sell_15;
    let net_15 = (buy_15 - sell_15).abs();
    // One side dominates the tape but price delta nets out: the passive side
    // is absorbing.
    let absorbing = total_15 > Decimal::ZERO
        && median > Decimal::ZERO
        && total_15 >= median * Decimal::from(6)
        && net_15 * Decimal::from(4) <= total_15;
    let absorption_buy_side = absorbing && sell_15 >= buy_15;
    let absorption_sell_side = absorbing && buy_15 > sell_15;

    OrderFlowSnapshot {
        symbol: symbol.to_string(),
        delta_1s,
        delta_5s,
        delta_15s,
        delta_60s,
        cumulative_delta,
        buy_pressure,
        sell_pressure,
        imbalance,
        large_buy_orders,
        large_sell_orders,
        absorption_buy_side,
        absorption_sell_side,
        delta_momentum: delta_15s - prev_delta_15s,
        captured_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 6, 10, 0, 0).unwrap()
    }

    fn event(secs_ago: i64, signed: Decimal) -> FlowEvent {
        FlowEvent {
            time: now() - Duration::seconds(secs_ago),
            signed_volume: signed,
        }
    }

    #[test]
    fn test_window_deltas() {
        let mut events = VecDeque::new();
        events.push_back(event(40, dec!(5)));
        events.push_back(event(10, dec!(-2)));
        events.push_back(event(3, dec!(1)));

        let snap = build_snapshot("EURUSD", &events, dec!(0), dec!(0), dec!(3), now());
        assert_eq!(snap.delta_5s, dec!(1));
        assert_eq!(snap.delta_15s, dec!(-1));
        assert_eq!(snap.delta_60s, dec!(4));
    }

    #[test]
    fn test_imbalance_and_pressure() {
        let mut events = VecDeque::new();
        events.push_back(event(5, dec!(3)));
        events.push_back(event(4, dec!(1)));
        let snap = build_snapshot("EURUSD", &events, dec!(0), dec!(0), dec!(3), now());
        assert_eq!(snap.buy_pressure, dec!(100));
        assert_eq!(snap.sell_pressure, dec!(0));
        assert_eq!(snap.imbalance, dec!(1));
    }

    #[test]
    fn test_large_order_counts() {
        let mut events = VecDeque::new();
        // Median magnitude 1, multiplier 3 -> threshold 3
        for i in 0..10 {
            events.push_back(event(50 - i, dec!(1)));
        }
        events.push_back(event(5, dec!(9)));
        events.push_back(event(4, dec!(-7)));
        let snap = build_snapshot("EURUSD", &events, dec!(0), dec!(0), dec!(3), now());
        assert_eq!(snap.large_buy_orders, 1);
        assert_eq!(snap.large_sell_orders, 1);
    }

    #[test]
    fn test_absorption_detection() {
        let mut events = VecDeque::new();
        // Heavy two-way tape in the last 15s, sell side dominant, net ~flat
        for i in 0..6 {
            events.push_back(event(14 - i, dec!(-4)));
        }
        for i in 0..6 {
            events.push_back(event(8 - i, dec!(3.5)));
        }
        let snap = build_snapshot("EURUSD", &events, dec!(0), dec!(0), dec!(3), now());
        assert!(snap.absorption_buy_side);
        assert!(!snap.absorption_sell_side);
    }

    #[test]
    fn test_delta_momentum() {
        let mut events = VecDeque::new();
        events.push_back(event(3, dec!(5)));
        let snap = build_snapshot("EURUSD", &events, dec!(0), dec!(8), dec!(3), now());
        assert_eq!(snap.delta_momentum, dec!(-3));
    }

    #[test]
    fn test_freshness() {
        let events = VecDeque::new();
        let snap = build_snapshot("EURUSD", &events, dec!(0), dec!(0), dec!(3), now());
        assert!(snap.is_fresh(now() + Duration::seconds(2), Duration::seconds(5)));
        assert!(!snap.is_fresh(now() + Duration::seconds(9), Duration::seconds(5)));
    }
}
