use crate::config::RiskEnvConfig;
use crate::domain::market::pip;
use crate::domain::news::GuardrailMode;
use crate::domain::risk::context::{RiskContext, RiskDecision};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

/// Daily/weekly loss caps, trade-count caps and position sizing.
pub struct RiskService {
    config: RiskEnvConfig,
    /// When the execution filter is enabled it owns the spread check.
    filter_owns_spread: bool,
}

impl RiskService {
    pub fn new(config: RiskEnvConfig, filter_owns_spread: bool) -> Self {
        Self {
            config,
            filter_owns_spread,
        }
    }

    pub fn can_take_new_trade(&self, ctx: &RiskContext) -> RiskDecision {
        let cap_pct = self.config.max_daily_loss_pct(ctx.strategy);
        let cap_amount = ctx.account_equity * cap_pct / Decimal::ONE_HUNDRED;
        if ctx.today_realized_pnl <= -cap_amount {
            return RiskDecision::block(format!(
                "daily loss cap reached: {} <= -{} ({}% of equity)",
                ctx.today_realized_pnl, cap_amount, cap_pct
            ));
        }

        let max_trades = self.config.max_trades(ctx.strategy);
        if ctx.trades_taken_today >= max_trades {
            return RiskDecision::block(format!(
                "strategy trade cap reached ({}/{})",
                ctx.trades_taken_today, max_trades
            ));
        }

        let mut risk_pct = self
            .config
            .risk_percent(ctx.strategy, ctx.symbol.as_deref());
        if ctx.guardrail_mode == GuardrailMode::Reduced {
            risk_pct /= Decimal::TWO;
            debug!(
                "RiskService: guardrail reduced mode, risk halved to {}%",
                risk_pct
            );
        }
        RiskDecision::allow(risk_pct)
    }

    /// Spread acceptance; a no-op when the execution filter owns the check.
    pub fn is_spread_acceptable(&self, max_spread_pips: Decimal, spread_pips: Decimal) -> bool {
        if self.filter_owns_spread {
            return true;
        }
        spread_pips <= max_spread_pips
    }

    /// Lot size: `equity * riskPct / (slPips * pipValue)`, rounded down to
    /// the broker step and clamped. Returns zero when the stop distance or
    /// price is degenerate.
    pub fn position_size(
        &self,
        symbol: &str,
        equity: Decimal,
        risk_percent: Decimal,
        stop_loss_pips: Decimal,
        price: Decimal,
    ) -> Decimal {
        if stop_loss_pips <= Decimal::ZERO || price <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let pip_value = pip::pip_value_per_lot(symbol, price);
        if pip_value <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let risk_amount = equity * risk_percent / Decimal::ONE_HUNDRED;
        let raw_lots = risk_amount / (stop_loss_pips * pip_value);
        let lots = pip::round_to_lot_step(symbol, raw_lots);
        debug!(
            "RiskService [{}]: sizing equity={} risk%={} slPips={} -> {} lots",
            symbol, equity, risk_percent, stop_loss_pips, lots
        );
        lots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::risk::context::StrategyKind;

    fn service() -> RiskService {
        RiskService::new(RiskEnvConfig::default(), true)
    }

    fn ctx(realized: Decimal, trades: u32) -> RiskContext {
        RiskContext {
            strategy: StrategyKind::Low,
            account_equity: dec!(10000),
            today_realized_pnl: realized,
            trades_taken_today: trades,
            guardrail_mode: GuardrailMode::Normal,
            symbol: None,
        }
    }

    #[test]
    fn test_daily_loss_cap_blocks() {
        // Low strategy cap is 2% of 10_000 = 200
        let decision = service().can_take_new_trade(&ctx(dec!(-200), 0));
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("daily loss cap"));

        let decision = service().can_take_new_trade(&ctx(dec!(-199), 0));
        assert!(decision.allowed);
    }

    #[test]
    fn test_trade_cap_blocks() {
        let decision = service().can_take_new_trade(&ctx(dec!(0), 3));
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("trade cap"));
    }

    #[test]
    fn test_guardrail_reduced_halves_risk() {
        let mut context = ctx(dec!(0), 0);
        context.guardrail_mode = GuardrailMode::Reduced;
        let decision = service().can_take_new_trade(&context);
        assert!(decision.allowed);
        assert_eq!(decision.adjusted_risk_percent, Some(dec!(0.25)));
    }

    #[test]
    fn test_symbol_override_in_sizing_context() {
        let mut context = ctx(dec!(0), 0);
        context.strategy = StrategyKind::High;
        context.symbol = Some("XAUUSD".to_string());
        let decision = service().can_take_new_trade(&context);
        // XAUUSD override (0.5) wins over high-strategy default (1.0)
        assert_eq!(decision.adjusted_risk_percent, Some(dec!(0.5)));
    }

    #[test]
    fn test_position_size_scaling() {
        let service = service();
        // 10_000 * 1% = 100 risk; 100 pips at $10/pip/lot = $1000/lot -> 0.1 lots
        let lots = service.position_size("XAUUSD", dec!(10000), dec!(1), dec!(100), dec!(2650));
        assert_eq!(lots, dec!(0.1));
        // Double equity doubles size
        let lots2 = service.position_size("XAUUSD", dec!(20000), dec!(1), dec!(100), dec!(2650));
        assert_eq!(lots2, dec!(0.2));
        // Double stop distance halves size
        let lots3 = service.position_size("XAUUSD", dec!(10000), dec!(1), dec!(200), dec!(2650));
        assert_eq!(lots3, dec!(0.05));
    }

    #[test]
    fn test_position_size_degenerate_inputs() {
        let service = service();
        assert_eq!(
            service.position_size("XAUUSD", dec!(10000), dec!(1), dec!(0), dec!(2650)),
            Decimal::ZERO
        );
        // Too small for the minimum lot collapses to zero
        assert_eq!(
            service.position_size("XAUUSD", dec!(100), dec!(0.1), dec!(500), dec!(2650)),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_spread_ownership() {
        let owns = RiskService::new(RiskEnvConfig::default(), false);
        assert!(!owns.is_spread_acceptable(dec!(3), dec!(5)));
        assert!(owns.is_spread_acceptable(dec!(3), dec!(3)));
        // Filter-owned: always acceptable here
        assert!(service().is_spread_acceptable(dec!(3), dec!(50)));
    }
}
