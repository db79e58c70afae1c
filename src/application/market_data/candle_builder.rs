use crate::domain::market::timeframe::Timeframe;
use crate::domain::market::types::{Candle, Tick};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug)]
struct OpenBar {
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
    start_time: DateTime<Utc>,
    last_tick_time: DateTime<Utc>,
}

impl OpenBar {
    fn new(tick: &Tick) -> Self {
        Self {
            open: tick.mid,
            high: tick.mid,
            low: tick.mid,
            close: tick.mid,
            volume: Decimal::ONE,
            start_time: Timeframe::M1.period_start(tick.time),
            last_tick_time: tick.time,
        }
    }

    fn update(&mut self, tick: &Tick) {
        if tick.mid > self.high {
            self.high = tick.mid;
        }
        if tick.mid < self.low {
            self.low = tick.mid;
        }
        self.close = tick.mid;
        self.volume += Decimal::ONE;
        self.last_tick_time = tick.time;
    }

    fn build(&self, symbol: &str) -> Candle {
        Candle {
            symbol: symbol.to_string(),
            timeframe: Timeframe::M1,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            start_time: self.start_time,
            end_time: self.start_time + Timeframe::M1.duration(),
        }
    }
}

/// Aggregates ticks into 1-minute bars, one open bar per symbol.
///
/// Minutes with no ticks produce no candle; out-of-order ticks are
/// discarded. The only writer to the candle store.
pub struct CandleBuilder {
    bars: HashMap<String, OpenBar>,
}

impl CandleBuilder {
    pub fn new() -> Self {
        Self {
            bars: HashMap::new(),
        }
    }

    /// Processes one tick. Returns the completed candle when the tick
    /// crosses a minute boundary.
    pub fn on_tick(&mut self, tick: &Tick) -> Option<Candle> {
        let minute = Timeframe::M1.period_start(tick.time);

        match self.bars.get_mut(&tick.symbol) {
            Some(bar) => {
                if tick.time < bar.last_tick_time {
                    warn!(
                        "CandleBuilder [{}]: Discarding out-of-order tick ({} < {})",
                        tick.symbol, tick.time, bar.last_tick_time
                    );
                    return None;
                }
                if bar.start_time == minute {
                    bar.update(tick);
                    None
                } else {
                    let completed = bar.build(&tick.symbol);
                    debug!(
                        "CandleBuilder [{}]: M1 closed O:{} H:{} L:{} C:{} V:{}",
                        tick.symbol,
                        completed.open,
                        completed.high,
                        completed.low,
                        completed.close,
                        completed.volume
                    );
                    *bar = OpenBar::new(tick);
                    Some(completed)
                }
            }
            None => {
                debug!(
                    "CandleBuilder [{}]: First tick @ {}, starting aggregation",
                    tick.symbol, tick.mid
                );
                self.bars.insert(tick.symbol.clone(), OpenBar::new(tick));
                None
            }
        }
    }
}

impl Default for CandleBuilder {
    fn default() -> Self {
        Self::new()
    }
}
