use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Canonical per-symbol contract specification.
///
/// Pip definitions for non-forex symbols vary between brokers; every
/// component resolves them through this single table so that sizing,
/// exposure and exit math all agree.
#[derive(Debug, Clone, Copy)]
pub struct SymbolSpec {
    /// Smallest conventional price increment.
    pub pip_size: Decimal,
    /// Units of the base asset per 1.0 lot.
    pub contract_size: Decimal,
    /// Broker volume granularity.
    pub lot_step: Decimal,
    pub min_lot: Decimal,
    pub max_lot: Decimal,
}

const FOREX_DEFAULT: SymbolSpec = SymbolSpec {
    pip_size: dec!(0.0001),
    contract_size: dec!(100000),
    lot_step: dec!(0.01),
    min_lot: dec!(0.01),
    max_lot: dec!(100),
};

const JPY_QUOTE: SymbolSpec = SymbolSpec {
    pip_size: dec!(0.01),
    contract_size: dec!(100000),
    lot_step: dec!(0.01),
    min_lot: dec!(0.01),
    max_lot: dec!(100),
};

const GOLD: SymbolSpec = SymbolSpec {
    pip_size: dec!(0.1),
    contract_size: dec!(100),
    lot_step: dec!(0.01),
    min_lot: dec!(0.01),
    max_lot: dec!(50),
};

const US30: SymbolSpec = SymbolSpec {
    pip_size: dec!(1.0),
    contract_size: dec!(10),
    lot_step: dec!(0.1),
    min_lot: dec!(0.1),
    max_lot: dec!(50),
};

pub fn spec_for(symbol: &str) -> SymbolSpec {
    match symbol {
        "XAUUSD" => GOLD,
        "US30" => US30,
        s if s.ends_with("JPY") => JPY_QUOTE,
        _ => FOREX_DEFAULT,
    }
}

pub fn pip_size(symbol: &str) -> Decimal {
    spec_for(symbol).pip_size
}

/// Converts a raw price distance to pips.
pub fn price_to_pips(symbol: &str, distance: Decimal) -> Decimal {
    let pip = pip_size(symbol);
    if pip.is_zero() {
        return Decimal::ZERO;
    }
    distance / pip
}

/// Converts a pip count back to a raw price distance.
pub fn pips_to_price(symbol: &str, pips: Decimal) -> Decimal {
    pips * pip_size(symbol)
}

/// Monetary value (account currency) of one pip for one lot.
///
/// USD-quoted symbols value directly; USD-based pairs (e.g. USDJPY) convert
/// through the current price.
pub fn pip_value_per_lot(symbol: &str, price: Decimal) -> Decimal {
    let spec = spec_for(symbol);
    let raw = spec.pip_size * spec.contract_size;
    if symbol.starts_with("USD") && !price.is_zero() {
        raw / price
    } else {
        raw
    }
}

/// Rounds a lot size down to the broker step and clamps to the allowed range.
/// Returns zero when the size cannot reach the minimum lot.
pub fn round_to_lot_step(symbol: &str, lots: Decimal) -> Decimal {
    let spec = spec_for(symbol);
    if lots <= Decimal::ZERO || spec.lot_step.is_zero() {
        return Decimal::ZERO;
    }
    let steps = (lots / spec.lot_step).floor();
    let rounded = steps * spec.lot_step;
    if rounded < spec.min_lot {
        Decimal::ZERO
    } else {
        rounded.min(spec.max_lot)
    }
}
