use crate::domain::market::timeframe::Timeframe;
use crate::domain::market::types::Candle;
use std::collections::{HashMap, VecDeque};

/// Rolling per-symbol store of closed M1 candles.
///
/// Single writer (the candle builder); readers see either the pre-append or
/// post-append state. Candles are ordered by `start_time` and the oldest is
/// evicted once `max_candles` is reached. Gaps are allowed: timestamps, not
/// indices, are authoritative.
#[derive(Debug)]
pub struct CandleStore {
    max_candles: usize,
    candles: HashMap<String, VecDeque<Candle>>,
}

impl CandleStore {
    pub fn new(max_candles: usize) -> Self {
        Self {
            max_candles,
            candles: HashMap::new(),
        }
    }

    /// Appends a closed candle. Out-of-order candles (start time not after
    /// the latest stored bar) are dropped to keep the sequence strictly
    /// time-ordered.
    pub fn append(&mut self, candle: Candle) -> bool {
        let series = self.candles.entry(candle.symbol.clone()).or_default();
        if let Some(last) = series.back()
            && candle.start_time <= last.start_time
        {
            return false;
        }
        series.push_back(candle);
        while series.len() > self.max_candles {
            series.pop_front();
        }
        true
    }

    pub fn latest(&self, symbol: &str) -> Option<&Candle> {
        self.candles.get(symbol).and_then(|s| s.back())
    }

    pub fn len(&self, symbol: &str) -> usize {
        self.candles.get(symbol).map_or(0, |s| s.len())
    }

    pub fn is_empty(&self, symbol: &str) -> bool {
        self.len(symbol) == 0
    }

    /// Last `n` closed M1 candles, oldest first.
    pub fn last_n(&self, symbol: &str, n: usize) -> Vec<Candle> {
        let Some(series) = self.candles.get(symbol) else {
            return Vec::new();
        };
        let skip = series.len().saturating_sub(n);
        series.iter().skip(skip).cloned().collect()
    }

    pub fn clear(&mut self, symbol: &str) {
        self.candles.remove(symbol);
    }

    /// Derives a higher-timeframe view by grouping consecutive M1 bars.
    ///
    /// A bar of timeframe `tf` is emitted only when all of its M1 bars are
    /// present (an H4 bar requires 240 complete M1 bars). Returns oldest
    /// first.
    pub fn aggregate(&self, symbol: &str, tf: Timeframe) -> Vec<Candle> {
        let Some(series) = self.candles.get(symbol) else {
            return Vec::new();
        };
        if tf == Timeframe::M1 {
            return series.iter().cloned().collect();
        }

        let required = tf.m1_bars_required();
        let mut out = Vec::new();
        let mut bucket: Vec<&Candle> = Vec::with_capacity(required);
        let mut bucket_start = None;

        for candle in series.iter() {
            let period = tf.period_start(candle.start_time);
            if bucket_start != Some(period) {
                if bucket.len() == required {
                    out.push(fold_bucket(symbol, tf, &bucket));
                }
                bucket.clear();
                bucket_start = Some(period);
            }
            bucket.push(candle);
        }
        if bucket.len() == required {
            out.push(fold_bucket(symbol, tf, &bucket));
        }
        out
    }

    /// Last `n` complete higher-timeframe bars, oldest first.
    pub fn aggregate_last_n(&self, symbol: &str, tf: Timeframe, n: usize) -> Vec<Candle> {
        let mut all = self.aggregate(symbol, tf);
        let skip = all.len().saturating_sub(n);
        all.drain(..skip);
        all
    }
}

fn fold_bucket(symbol: &str, tf: Timeframe, bucket: &[&Candle]) -> Candle {
    let first = bucket[0];
    let last = bucket[bucket.len() - 1];
    let high = bucket.iter().map(|c| c.high).max().unwrap_or(first.high);
    let low = bucket.iter().map(|c| c.low).min().unwrap_or(first.low);
    let volume = bucket.iter().map(|c| c.volume).sum();
    let start_time = tf.period_start(first.start_time);
    Candle {
        symbol: symbol.to_string(),
        timeframe: tf,
        open: first.open,
        high,
        low,
        close: last.close,
        volume,
        start_time,
        end_time: start_time + tf.duration(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn m1(start: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            symbol: "EURUSD".to_string(),
            timeframe: Timeframe::M1,
            open: Decimal::try_from(open).unwrap(),
            high: Decimal::try_from(high).unwrap(),
            low: Decimal::try_from(low).unwrap(),
            close: Decimal::try_from(close).unwrap(),
            volume: dec!(10),
            start_time: start,
            end_time: start + Duration::minutes(1),
        }
    }

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 6, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_append_keeps_time_order() {
        let mut store = CandleStore::new(10);
        let t = base();
        assert!(store.append(m1(t, 1.0, 1.1, 0.9, 1.05)));
        assert!(store.append(m1(t + Duration::minutes(1), 1.05, 1.2, 1.0, 1.1)));
        // Same start time is rejected
        assert!(!store.append(m1(t + Duration::minutes(1), 9.0, 9.0, 9.0, 9.0)));
        // Earlier start time is rejected
        assert!(!store.append(m1(t, 9.0, 9.0, 9.0, 9.0)));
        assert_eq!(store.len("EURUSD"), 2);
        assert_eq!(store.latest("EURUSD").unwrap().close, dec!(1.1));
    }

    #[test]
    fn test_eviction_at_capacity() {
        let mut store = CandleStore::new(3);
        let t = base();
        for i in 0..5 {
            store.append(m1(t + Duration::minutes(i), 1.0, 1.1, 0.9, 1.0));
        }
        assert_eq!(store.len("EURUSD"), 3);
        let oldest = store.last_n("EURUSD", 3)[0].start_time;
        assert_eq!(oldest, t + Duration::minutes(2));
    }

    #[test]
    fn test_aggregate_m5_fold() {
        let mut store = CandleStore::new(100);
        let t = base();
        // One complete M5 bucket: opens 1.0, closes 1.4, high 2.4, low 0.5
        store.append(m1(t, 1.0, 1.5, 0.9, 1.1));
        store.append(m1(t + Duration::minutes(1), 1.1, 1.6, 1.0, 1.2));
        store.append(m1(t + Duration::minutes(2), 1.2, 2.4, 1.1, 1.3));
        store.append(m1(t + Duration::minutes(3), 1.3, 1.8, 0.5, 1.35));
        store.append(m1(t + Duration::minutes(4), 1.35, 1.9, 1.2, 1.4));
        // Partial next bucket must not be emitted
        store.append(m1(t + Duration::minutes(5), 1.4, 1.5, 1.3, 1.45));

        let m5 = store.aggregate("EURUSD", Timeframe::M5);
        assert_eq!(m5.len(), 1);
        let bar = &m5[0];
        assert_eq!(bar.open, dec!(1.0));
        assert_eq!(bar.close, dec!(1.4));
        assert_eq!(bar.high, dec!(2.4));
        assert_eq!(bar.low, dec!(0.5));
        assert_eq!(bar.volume, dec!(50));
        assert_eq!(bar.start_time, t);
        assert_eq!(bar.end_time, t + Duration::minutes(5));
    }

    #[test]
    fn test_aggregate_skips_gapped_bucket() {
        let mut store = CandleStore::new(100);
        let t = base();
        // Missing minute 2 of the first bucket
        for i in [0i64, 1, 3, 4] {
            store.append(m1(t + Duration::minutes(i), 1.0, 1.1, 0.9, 1.0));
        }
        for i in 5..10i64 {
            store.append(m1(t + Duration::minutes(i), 1.0, 1.1, 0.9, 1.0));
        }
        let m5 = store.aggregate("EURUSD", Timeframe::M5);
        // Only the second bucket is complete
        assert_eq!(m5.len(), 1);
        assert_eq!(m5[0].start_time, t + Duration::minutes(5));
    }

    #[test]
    fn test_aggregate_last_n() {
        let mut store = CandleStore::new(500);
        let t = base();
        for i in 0..30i64 {
            store.append(m1(t + Duration::minutes(i), 1.0, 1.1, 0.9, 1.0));
        }
        let bars = store.aggregate_last_n("EURUSD", Timeframe::M5, 2);
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].start_time, t + Duration::minutes(25));
    }

    #[test]
    fn test_unknown_symbol_queries() {
        let store = CandleStore::new(10);
        assert!(store.latest("GBPUSD").is_none());
        assert!(store.last_n("GBPUSD", 5).is_empty());
        assert!(store.aggregate("GBPUSD", Timeframe::M15).is_empty());
    }
}
