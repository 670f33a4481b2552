// =============================================================================
// Order Calculator — pure, stateless entry sizing
// =============================================================================
//
// Quantity, stop-loss, and take-profit are all deterministic functions of
// capital, entry price, and `OrderParams`; no I/O, no clock, no history.
// =============================================================================

use rust_decimal::Decimal;

use crate::error::EngineError;
use crate::types::OrderParams;

pub struct OrderCalculator;

/// Result of sizing one entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizedOrder {
    pub quantity: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
}

impl OrderCalculator {
    /// Validate `entry_price` and `params`, then compute quantity, stop-loss,
    /// and take-profit.
    ///
    /// `lot_size`: the venue's minimum tradable increment. `None` (the
    /// default) means fractional quantities are accepted unmodified.
    pub fn calculate(
        capital: Decimal,
        entry_price: Decimal,
        params: &OrderParams,
        lot_size: Option<Decimal>,
    ) -> Result<SizedOrder, EngineError> {
        Self::validate(entry_price, params)?;

        let raw_quantity = (capital * params.risk_percentage) / entry_price;
        let quantity = floor_to_tradable(raw_quantity, lot_size);

        Ok(SizedOrder {
            quantity,
            stop_loss: entry_price * params.sl_multiplier,
            take_profit: entry_price * params.tp_multiplier,
        })
    }

    /// `InvalidParams` fails when `entry_price <= 0`, `sl_multiplier >= 1`,
    /// or `tp_multiplier <= 1`.
    pub fn validate(entry_price: Decimal, params: &OrderParams) -> Result<(), EngineError> {
        if entry_price <= Decimal::ZERO {
            return Err(EngineError::Config(format!(
                "invalid entry_price {entry_price}: must be > 0"
            )));
        }
        if params.sl_multiplier >= Decimal::ONE {
            return Err(EngineError::Config(format!(
                "invalid sl_multiplier {}: must be < 1",
                params.sl_multiplier
            )));
        }
        if params.tp_multiplier <= Decimal::ONE {
            return Err(EngineError::Config(format!(
                "invalid tp_multiplier {}: must be > 1",
                params.tp_multiplier
            )));
        }
        Ok(())
    }
}

/// Truncate `quantity` down to the nearest multiple of `lot_size`. `None`
/// (or a non-positive lot size) leaves `quantity` untouched.
fn floor_to_tradable(quantity: Decimal, lot_size: Option<Decimal>) -> Decimal {
    match lot_size {
        Some(lot) if lot > Decimal::ZERO => (quantity / lot).trunc() * lot,
        _ => quantity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn params(risk: Decimal, tp: Decimal, sl: Decimal) -> OrderParams {
        OrderParams {
            risk_percentage: risk,
            tp_multiplier: tp,
            sl_multiplier: sl,
            use_trailing_stop: false,
            extra: HashMap::new(),
        }
    }

    #[test]
    fn calculates_quantity_stop_and_target() {
        let p = params(dec!(0.02), dec!(1.5), dec!(0.9));
        let sized = OrderCalculator::calculate(dec!(10000), dec!(100), &p, None).unwrap();
        assert_eq!(sized.quantity, dec!(2)); // (10000 * 0.02) / 100
        assert_eq!(sized.stop_loss, dec!(90));
        assert_eq!(sized.take_profit, dec!(150));
    }

    #[test]
    fn invariant_sl_lt_entry_lt_tp_holds_for_valid_params() {
        let p = params(dec!(0.02), dec!(1.5), dec!(0.9));
        let sized = OrderCalculator::calculate(dec!(10000), dec!(100), &p, None).unwrap();
        assert!(sized.stop_loss < dec!(100));
        assert!(dec!(100) < sized.take_profit);
    }

    #[test]
    fn rejects_non_positive_entry_price() {
        let p = params(dec!(0.02), dec!(1.5), dec!(0.9));
        assert!(OrderCalculator::calculate(dec!(10000), dec!(0), &p, None).is_err());
        assert!(OrderCalculator::calculate(dec!(10000), dec!(-5), &p, None).is_err());
    }

    #[test]
    fn rejects_sl_multiplier_at_or_above_one() {
        let p = params(dec!(0.02), dec!(1.5), dec!(1.0));
        assert!(OrderCalculator::calculate(dec!(10000), dec!(100), &p, None).is_err());
    }

    #[test]
    fn rejects_tp_multiplier_at_or_below_one() {
        let p = params(dec!(0.02), dec!(1.0), dec!(0.9));
        assert!(OrderCalculator::calculate(dec!(10000), dec!(100), &p, None).is_err());
    }

    #[test]
    fn lot_size_truncates_fractional_quantity() {
        let p = params(dec!(0.5), dec!(1.5), dec!(0.9));
        let sized = OrderCalculator::calculate(dec!(1000), dec!(3), &p, Some(dec!(1))).unwrap();
        // raw = 500/3 = 166.66.. -> truncated to whole shares
        assert_eq!(sized.quantity, dec!(166));
    }

    #[test]
    fn deterministic_across_calls() {
        let p = params(dec!(0.02), dec!(1.5), dec!(0.9));
        let a = OrderCalculator::calculate(dec!(10000), dec!(100), &p, None).unwrap();
        let b = OrderCalculator::calculate(dec!(10000), dec!(100), &p, None).unwrap();
        assert_eq!(a, b);
    }
}
