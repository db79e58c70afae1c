use crate::domain::market::types::{Candle, Direction};
use crate::domain::signal::types::{Fvg, OrderBlockZone, RangePosition};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Average True Range over `period`, computed on closed candles.
pub fn atr(candles: &[Candle], period: usize) -> Option<Decimal> {
    if candles.len() < period + 1 || period == 0 {
        return None;
    }
    let start = candles.len() - period;
    let mut sum = Decimal::ZERO;
    for i in start..candles.len() {
        let prev_close = candles[i - 1].close;
        let tr = (candles[i].high - candles[i].low)
            .max((candles[i].high - prev_close).abs())
            .max((candles[i].low - prev_close).abs());
        sum += tr;
    }
    Some(sum / Decimal::from(period as u64))
}

/// Finds the most recent displacement candle in `direction` within
/// `lookback` bars: an impulsive candle whose body is at least
/// `min_atr_multiple` times the ATR at that point.
pub fn find_displacement(
    candles: &[Candle],
    direction: Direction,
    min_atr_multiple: Decimal,
    atr_period: usize,
    lookback: usize,
) -> Option<usize> {
    if candles.len() < atr_period + 2 {
        return None;
    }
    let first = candles.len().saturating_sub(lookback).max(atr_period + 1);
    for i in (first..candles.len()).rev() {
        let directional = match direction {
            Direction::Buy => candles[i].is_bullish(),
            Direction::Sell => candles[i].is_bearish(),
        };
        if !directional {
            continue;
        }
        if let Some(atr_here) = atr(&candles[..i], atr_period)
            && atr_here > Decimal::ZERO
            && candles[i].body() >= min_atr_multiple * atr_here
        {
            return Some(i);
        }
    }
    None
}

/// Fair Value Gap created during the displacement at `displacement_idx`:
/// the displacement is the middle candle of the three-bar imbalance.
pub fn fvg_at_displacement(
    candles: &[Candle],
    displacement_idx: usize,
    direction: Direction,
) -> Option<Fvg> {
    if displacement_idx == 0 || displacement_idx + 1 >= candles.len() {
        return None;
    }
    let before = &candles[displacement_idx - 1];
    let middle = &candles[displacement_idx];
    let after = &candles[displacement_idx + 1];

    match direction {
        Direction::Buy if after.low > before.high => Some(Fvg {
            direction,
            upper: after.low,
            lower: before.high,
            created_at: middle.start_time,
        }),
        Direction::Sell if after.high < before.low => Some(Fvg {
            direction,
            upper: before.low,
            lower: after.high,
            created_at: middle.start_time,
        }),
        _ => None,
    }
}

/// Order block: the last counter-trend candle immediately preceding the
/// displacement.
pub fn order_block_before(
    candles: &[Candle],
    displacement_idx: usize,
    direction: Direction,
    max_scan: usize,
) -> Option<OrderBlockZone> {
    let first = displacement_idx.saturating_sub(max_scan);
    for i in (first..displacement_idx).rev() {
        let counter_trend = match direction {
            Direction::Buy => candles[i].is_bearish(),
            Direction::Sell => candles[i].is_bullish(),
        };
        if counter_trend {
            let c = &candles[i];
            return Some(OrderBlockZone {
                direction,
                high: c.high,
                low: c.low,
                open: c.open,
                close: c.close,
                time: c.start_time,
            });
        }
    }
    None
}

/// Position of `price` inside the dealing range [range_low, range_high].
/// SMC buys in discount (lower half), sells in premium (upper half).
pub fn range_position(price: Decimal, range_high: Decimal, range_low: Decimal) -> RangePosition {
    let span = range_high - range_low;
    if span <= Decimal::ZERO {
        return RangePosition::Equilibrium;
    }
    let midpoint = (range_high + range_low) / Decimal::TWO;
    // A thin band around the midpoint counts as equilibrium
    let band = span * dec!(0.02);
    if price > midpoint + band {
        RangePosition::Premium
    } else if price < midpoint - band {
        RangePosition::Discount
    } else {
        RangePosition::Equilibrium
    }
}

/// Direction supported by recent volume: bullish candle volume vs bearish
/// candle volume over `lookback` bars. Returns None when volume is balanced
/// (below the 60/40 split) or absent.
pub fn volume_imbalance_direction(candles: &[Candle], lookback: usize) -> Option<Direction> {
    if candles.is_empty() {
        return None;
    }
    let start = candles.len().saturating_sub(lookback);
    let mut bull = Decimal::ZERO;
    let mut bear = Decimal::ZERO;
    for c in &candles[start..] {
        if c.is_bullish() {
            bull += c.volume;
        } else if c.is_bearish() {
            bear += c.volume;
        }
    }
    let total = bull + bear;
    if total.is_zero() {
        return None;
    }
    let threshold = total * dec!(0.6);
    if bull >= threshold {
        Some(Direction::Buy)
    } else if bear >= threshold {
        Some(Direction::Sell)
    } else {
        None
    }
}
