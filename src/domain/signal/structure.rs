use crate::domain::market::types::{Candle, Direction};
use crate::domain::signal::types::{Bias, BreakKind, StructureEvent, SwingKind, SwingPoint};
use rust_decimal::Decimal;

/// Detects confirmed pivot swings.
///
/// With `range = 1` this is three-candle pivot detection: a swing high is
/// strictly higher than its immediate neighbours. Left side uses >=, right
/// side uses > to avoid double detection on equal highs.
pub fn detect_swings(candles: &[Candle], range: usize) -> Vec<SwingPoint> {
    let mut swings = Vec::new();
    if candles.len() < 2 * range + 1 {
        return swings;
    }

    for i in range..candles.len() - range {
        let high = candles[i].high;
        let low = candles[i].low;

        let mut is_high = true;
        let mut is_low = true;
        for offset in 1..=range {
            if candles[i - offset].high >= high || candles[i + offset].high > high {
                is_high = false;
            }
            if candles[i - offset].low <= low || candles[i + offset].low < low {
                is_low = false;
            }
            if !is_high && !is_low {
                break;
            }
        }

        if is_high {
            swings.push(SwingPoint {
                index: i,
                kind: SwingKind::High,
                price: high,
                time: candles[i].start_time,
            });
        }
        if is_low {
            swings.push(SwingPoint {
                index: i,
                kind: SwingKind::Low,
                price: low,
                time: candles[i].start_time,
            });
        }
    }
    swings
}

/// Walks closes against confirmed swing levels and emits structural breaks.
///
/// A close beyond the most recent swing high is a bullish break; in the
/// prevailing direction it is a BOS, against it the first one is a CHoCH
/// and flips the prevailing direction. A swing becomes tradeable only once
/// confirmed (`range` candles after its pivot), and is consumed by a break.
pub fn detect_structure_events(candles: &[Candle], range: usize) -> Vec<StructureEvent> {
    let swings = detect_swings(candles, range);
    let mut events = Vec::new();

    let mut active_high: Option<&SwingPoint> = None;
    let mut active_low: Option<&SwingPoint> = None;
    let mut prevailing: Option<Direction> = None;
    let mut swing_iter = swings.iter().peekable();

    for (i, candle) in candles.iter().enumerate() {
        // Activate swings confirmed at this index
        while let Some(swing) = swing_iter.peek() {
            if swing.index + range <= i {
                match swing.kind {
                    SwingKind::High => active_high = Some(swing),
                    SwingKind::Low => active_low = Some(swing),
                }
                swing_iter.next();
            } else {
                break;
            }
        }

        if let Some(high) = active_high
            && candle.close > high.price
        {
            let kind = match prevailing {
                Some(Direction::Sell) => BreakKind::Choch,
                _ => BreakKind::Bos,
            };
            events.push(StructureEvent {
                kind,
                direction: Direction::Buy,
                level: high.price,
                index: i,
                time: candle.start_time,
            });
            prevailing = Some(Direction::Buy);
            active_high = None;
        }

        if let Some(low) = active_low
            && candle.close < low.price
        {
            let kind = match prevailing {
                Some(Direction::Buy) => BreakKind::Choch,
                _ => BreakKind::Bos,
            };
            events.push(StructureEvent {
                kind,
                direction: Direction::Sell,
                level: low.price,
                index: i,
                time: candle.start_time,
            });
            prevailing = Some(Direction::Sell);
            active_low = None;
        }
    }
    events
}

/// Bias from the latest structural break; sideways when none exists.
pub fn bias_from_events(events: &[StructureEvent]) -> Bias {
    match events.last().map(|e| e.direction) {
        Some(Direction::Buy) => Bias::Bullish,
        Some(Direction::Sell) => Bias::Bearish,
        None => Bias::Sideways,
    }
}

/// Latest confirmed swing high and low prices, scanning backwards.
pub fn last_swing_levels(candles: &[Candle], range: usize) -> (Option<Decimal>, Option<Decimal>) {
    let swings = detect_swings(candles, range);
    let mut high = None;
    let mut low = None;
    for swing in swings.iter().rev() {
        match swing.kind {
            SwingKind::High if high.is_none() => high = Some(swing.price),
            SwingKind::Low if low.is_none() => low = Some(swing.price),
            _ => {}
        }
        if high.is_some() && low.is_some() {
            break;
        }
    }
    (high, low)
}

/// Liquidity sweep: within the last `lookback` candles, a wick traded
/// beyond the relevant swing level and closed back inside.
///
/// A long setup wants sell-side liquidity below the last swing low taken
/// out; a short setup wants buy-side liquidity above the last swing high.
pub fn detect_liquidity_sweep(
    candles: &[Candle],
    direction: Direction,
    range: usize,
    lookback: usize,
) -> bool {
    if candles.len() < lookback + 2 * range + 1 {
        return false;
    }
    let history = &candles[..candles.len() - lookback];
    let (swing_high, swing_low) = last_swing_levels(history, range);
    let recent = &candles[candles.len() - lookback..];

    match direction {
        Direction::Buy => swing_low.is_some_and(|level| {
            recent
                .iter()
                .any(|c| c.low < level && c.close > level)
        }),
        Direction::Sell => swing_high.is_some_and(|level| {
            recent
                .iter()
                .any(|c| c.high > level && c.close < level)
        }),
    }
}
