use crate::domain::risk::context::StrategyKind;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;

#[derive(Debug)]
struct StatsInner {
    date: NaiveDate,
    iso_week: (i32, u32),
    /// Realized PnL attributed per strategy; `None` bucket holds closes the
    /// engine could not attribute and is counted against every strategy.
    realized_today: HashMap<Option<StrategyKind>, Decimal>,
    realized_week_total: Decimal,
    trades_today: HashMap<(String, StrategyKind), u32>,
    trades_today_total: u32,
    trades_week_total: u32,
    last_trade_at: HashMap<(String, StrategyKind), DateTime<Utc>>,
    equity: Decimal,
}

/// Daily and weekly counters with engine-timezone rollover.
///
/// Rollover is atomic per call: the first call of a new local date resets
/// the daily buckets, the first call of a new ISO week resets the weekly
/// ones. Cooldown state survives the rollover; counters do not.
pub struct DailyStats {
    tz: Tz,
    inner: Mutex<StatsInner>,
}

impl DailyStats {
    pub fn new(tz: Tz, starting_equity: Decimal, now: DateTime<Utc>) -> Self {
        let local = now.with_timezone(&tz);
        Self {
            tz,
            inner: Mutex::new(StatsInner {
                date: local.date_naive(),
                iso_week: (local.iso_week().year(), local.iso_week().week()),
                realized_today: HashMap::new(),
                realized_week_total: Decimal::ZERO,
                trades_today: HashMap::new(),
                trades_today_total: 0,
                trades_week_total: 0,
                last_trade_at: HashMap::new(),
                equity: starting_equity,
            }),
        }
    }

    /// Rolls counters when the engine-timezone date (or ISO week) changed.
    pub fn rollover_if_needed(&self, now: DateTime<Utc>) {
        let local = now.with_timezone(&self.tz);
        let date = local.date_naive();
        let week = (local.iso_week().year(), local.iso_week().week());
        let mut inner = self.inner.lock().expect("stats lock poisoned");
        if date != inner.date {
            info!(
                "DailyStats: date rollover {} -> {}, daily counters reset",
                inner.date, date
            );
            inner.date = date;
            inner.realized_today.clear();
            inner.trades_today.clear();
            inner.trades_today_total = 0;
        }
        if week != inner.iso_week {
            info!("DailyStats: week rollover, weekly counters reset");
            inner.iso_week = week;
            inner.realized_week_total = Decimal::ZERO;
            inner.trades_week_total = 0;
        }
    }

    pub fn record_trade_opened(&self, symbol: &str, strategy: StrategyKind, now: DateTime<Utc>) {
        self.rollover_if_needed(now);
        let mut inner = self.inner.lock().expect("stats lock poisoned");
        *inner
            .trades_today
            .entry((symbol.to_string(), strategy))
            .or_insert(0) += 1;
        inner.trades_today_total += 1;
        inner.trades_week_total += 1;
        inner
            .last_trade_at
            .insert((symbol.to_string(), strategy), now);
    }

    pub fn record_trade_closed(
        &self,
        strategy: Option<StrategyKind>,
        profit: Decimal,
        now: DateTime<Utc>,
    ) {
        self.rollover_if_needed(now);
        let mut inner = self.inner.lock().expect("stats lock poisoned");
        *inner
            .realized_today
            .entry(strategy)
            .or_insert(Decimal::ZERO) += profit;
        inner.realized_week_total += profit;
        inner.equity += profit;
    }

    /// Realized PnL today attributed to one strategy only, excluding the
    /// unattributed bucket. The kill switch compares this against its caps
    /// to arm a strategy-scoped halt.
    pub fn realized_today_attributed(&self, strategy: StrategyKind) -> Decimal {
        let inner = self.inner.lock().expect("stats lock poisoned");
        inner
            .realized_today
            .get(&Some(strategy))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Strategy-attributed realized PnL today plus the unattributed bucket.
    pub fn realized_today(&self, strategy: StrategyKind) -> Decimal {
        let inner = self.inner.lock().expect("stats lock poisoned");
        let attributed = inner
            .realized_today
            .get(&Some(strategy))
            .copied()
            .unwrap_or(Decimal::ZERO);
        let unattributed = inner
            .realized_today
            .get(&None)
            .copied()
            .unwrap_or(Decimal::ZERO);
        attributed + unattributed
    }

    pub fn realized_today_total(&self) -> Decimal {
        let inner = self.inner.lock().expect("stats lock poisoned");
        inner.realized_today.values().copied().sum()
    }

    pub fn realized_week_total(&self) -> Decimal {
        self.inner.lock().expect("stats lock poisoned").realized_week_total
    }

    pub fn trades_today(&self, symbol: &str, strategy: StrategyKind) -> u32 {
        let inner = self.inner.lock().expect("stats lock poisoned");
        inner
            .trades_today
            .get(&(symbol.to_string(), strategy))
            .copied()
            .unwrap_or(0)
    }

    pub fn trades_today_total(&self) -> u32 {
        self.inner.lock().expect("stats lock poisoned").trades_today_total
    }

    /// Trades taken today across symbols for one strategy.
    pub fn trades_today_strategy(&self, strategy: StrategyKind) -> u32 {
        let inner = self.inner.lock().expect("stats lock poisoned");
        inner
            .trades_today
            .iter()
            .filter(|((_, s), _)| *s == strategy)
            .map(|(_, count)| count)
            .sum()
    }

    pub fn trades_week_total(&self) -> u32 {
        self.inner.lock().expect("stats lock poisoned").trades_week_total
    }

    pub fn last_trade_at(&self, symbol: &str, strategy: StrategyKind) -> Option<DateTime<Utc>> {
        let inner = self.inner.lock().expect("stats lock poisoned");
        inner
            .last_trade_at
            .get(&(symbol.to_string(), strategy))
            .copied()
    }

    pub fn equity(&self) -> Decimal {
        self.inner.lock().expect("stats lock poisoned").equity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::UTC;
    use rust_decimal_macros::dec;

    fn t(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_counters_and_equity() {
        let stats = DailyStats::new(UTC, dec!(10000), t(6, 9));
        stats.record_trade_opened("XAUUSD", StrategyKind::Low, t(6, 9));
        stats.record_trade_opened("XAUUSD", StrategyKind::Low, t(6, 10));
        stats.record_trade_opened("EURUSD", StrategyKind::High, t(6, 10));

        assert_eq!(stats.trades_today("XAUUSD", StrategyKind::Low), 2);
        assert_eq!(stats.trades_today("XAUUSD", StrategyKind::High), 0);
        assert_eq!(stats.trades_today_total(), 3);
        assert_eq!(stats.last_trade_at("XAUUSD", StrategyKind::Low), Some(t(6, 10)));

        stats.record_trade_closed(Some(StrategyKind::Low), dec!(-120), t(6, 11));
        assert_eq!(stats.realized_today(StrategyKind::Low), dec!(-120));
        assert_eq!(stats.equity(), dec!(9880));
    }

    #[test]
    fn test_date_rollover_resets_daily_only() {
        let stats = DailyStats::new(UTC, dec!(10000), t(6, 9));
        stats.record_trade_opened("XAUUSD", StrategyKind::Low, t(6, 9));
        stats.record_trade_closed(Some(StrategyKind::Low), dec!(-50), t(6, 9));

        // Next day, same ISO week
        stats.rollover_if_needed(t(7, 1));
        assert_eq!(stats.trades_today("XAUUSD", StrategyKind::Low), 0);
        assert_eq!(stats.realized_today(StrategyKind::Low), dec!(0));
        assert_eq!(stats.realized_week_total(), dec!(-50));
        assert_eq!(stats.trades_week_total(), 1);
        // Equity carries over
        assert_eq!(stats.equity(), dec!(9950));
    }

    #[test]
    fn test_week_rollover() {
        // Jan 6 2025 is a Monday; Jan 12 is Sunday; Jan 13 next ISO week
        let stats = DailyStats::new(UTC, dec!(10000), t(6, 9));
        stats.record_trade_opened("XAUUSD", StrategyKind::Low, t(6, 9));
        stats.record_trade_closed(Some(StrategyKind::Low), dec!(-50), t(6, 9));
        stats.rollover_if_needed(t(13, 0));
        assert_eq!(stats.realized_week_total(), dec!(0));
        assert_eq!(stats.trades_week_total(), 0);
    }

    #[test]
    fn test_unattributed_pnl_counts_for_every_strategy() {
        let stats = DailyStats::new(UTC, dec!(10000), t(6, 9));
        stats.record_trade_closed(None, dec!(-75), t(6, 9));
        assert_eq!(stats.realized_today(StrategyKind::Low), dec!(-75));
        assert_eq!(stats.realized_today(StrategyKind::High), dec!(-75));
    }

    #[test]
    fn test_attributed_pnl_excludes_shared_bucket() {
        let stats = DailyStats::new(UTC, dec!(10000), t(6, 9));
        stats.record_trade_closed(Some(StrategyKind::High), dec!(-120), t(6, 9));
        stats.record_trade_closed(None, dec!(-30), t(6, 9));
        assert_eq!(
            stats.realized_today_attributed(StrategyKind::High),
            dec!(-120)
        );
        assert_eq!(stats.realized_today_attributed(StrategyKind::Low), dec!(0));
        // The blended view still folds the shared bucket in
        assert_eq!(stats.realized_today(StrategyKind::High), dec!(-150));
    }
}
