// =============================================================================
// Bullish Engulfing Pattern
// =============================================================================
//
// A two-candle reversal pattern: the prior candle closes bearish, the current
// candle closes bullish, and the current body fully covers the prior body.

use crate::types::Candle;

/// Returns `true` when `current` is a bullish engulfing of `previous`:
///
///   1. `previous` is bearish: `close < open`.
///   2. `current` is bullish: `close > open`.
///   3. `current.open < previous.close` (opens below the prior close).
///   4. `current.close > previous.open` (closes above the prior open).
pub fn is_bullish_engulfing(previous: &Candle, current: &Candle) -> bool {
    let previous_bearish = previous.close < previous.open;
    let current_bullish = current.close > current.open;
    let opens_below_prior_close = current.open < previous.close;
    let closes_above_prior_open = current.close > previous.open;

    previous_bearish && current_bullish && opens_below_prior_close && closes_above_prior_open
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn candle(open: Decimal, close: Decimal) -> Candle {
        Candle {
            symbol: "TEST".to_string(),
            timestamp: Utc::now(),
            open,
            high: open.max(close) + dec!(1),
            low: open.min(close) - dec!(1),
            close,
            volume: 100,
        }
    }

    #[test]
    fn detects_full_engulf() {
        let previous = candle(dec!(100), dec!(97));
        let current = candle(dec!(96), dec!(101));
        assert!(is_bullish_engulfing(&previous, &current));
    }

    #[test]
    fn rejects_when_open_does_not_dip_below_prior_close() {
        let previous = candle(dec!(100), dec!(97));
        let current = candle(dec!(98), dec!(101));
        assert!(!is_bullish_engulfing(&previous, &current));
    }

    #[test]
    fn rejects_when_previous_not_bearish() {
        let previous = candle(dec!(97), dec!(100));
        let current = candle(dec!(96), dec!(101));
        assert!(!is_bullish_engulfing(&previous, &current));
    }

    #[test]
    fn rejects_when_current_not_bullish() {
        let previous = candle(dec!(100), dec!(97));
        let current = candle(dec!(96), dec!(95));
        assert!(!is_bullish_engulfing(&previous, &current));
    }
}
