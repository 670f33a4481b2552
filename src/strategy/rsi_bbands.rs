// =============================================================================
// Two-Stage Mean-Reversion Strategy (RSI + Bollinger Bands)
// =============================================================================
//
// Stage 1 — Arm: the symbol is oversold (RSI <= stage1_rsi_threshold) and the
//   close has pierced the lower Bollinger band. The symbol is flagged
//   `stage1_armed` and no signal fires yet.
//
// Stage 2 — Confirm and fire: while armed, every subsequent candle is
//   checked for three conditions simultaneously:
//     - RSI has recovered into [stage2_rsi_entry, stage2_rsi_exit).
//     - The Bollinger bandwidth is expanding faster than stage2_min_roc.
//     - The last two candles form a bullish engulfing pattern.
//   All three true => fire a `Buy` signal at the current close and disarm.
//
// Disarm-on-overshoot: while armed, if RSI rises past `stage2_rsi_exit + 5`
// without ever satisfying the stage-2 conditions, the arm is cancelled — the
// reversal is judged to have already happened without us.
// =============================================================================

use rust_decimal::prelude::ToPrimitive;
use tracing::debug;

use crate::indicators::bollinger::{calculate_bandwidth_series, calculate_bollinger};
use crate::indicators::engulfing::is_bullish_engulfing;
use crate::indicators::roc::calculate_roc;
use crate::indicators::rsi::calculate_rsi;
use crate::types::{Candle, OrderParams, Signal, SignalKind, StrategyPerSymbolState};

use super::Strategy;

/// Tunable parameters for [`RSIBBandsStrategy`].
#[derive(Debug, Clone, Copy)]
pub struct RSIBBandsParams {
    pub bb_period: usize,
    pub bb_std_dev: f64,
    pub rsi_period: usize,
    pub roc_period: usize,
    pub stage1_rsi_threshold: f64,
    pub stage2_rsi_entry: f64,
    pub stage2_rsi_exit: f64,
    pub stage2_min_roc: f64,
}

impl Default for RSIBBandsParams {
    fn default() -> Self {
        Self {
            bb_period: 20,
            bb_std_dev: 2.0,
            rsi_period: 14,
            roc_period: 9,
            stage1_rsi_threshold: 30.0,
            stage2_rsi_entry: 30.0,
            stage2_rsi_exit: 40.0,
            stage2_min_roc: 0.15,
        }
    }
}

impl RSIBBandsParams {
    /// While armed, RSI rising past this level without a stage-2 fire
    /// cancels the arm (spec: `stage2_rsi_exit + 5`).
    fn stage2_disarm_above(&self) -> f64 {
        self.stage2_rsi_exit + 5.0
    }
}

pub struct RSIBBandsStrategy {
    params: RSIBBandsParams,
    order_params: OrderParams,
}

impl RSIBBandsStrategy {
    pub fn new(params: RSIBBandsParams, order_params: OrderParams) -> Self {
        Self { params, order_params }
    }
}

impl Strategy for RSIBBandsStrategy {
    fn warmup_period(&self) -> usize {
        self.params.bb_period.max(self.params.rsi_period).max(self.params.roc_period) + 1
    }

    fn analyze(
        &self,
        symbol: &str,
        history: &[Candle],
        state: &mut StrategyPerSymbolState,
    ) -> Option<Signal> {
        if history.len() < self.warmup_period() {
            return None;
        }

        let closes: Vec<f64> = history.iter().map(|c| c.close.to_f64().unwrap_or(f64::NAN)).collect();

        let rsi = calculate_rsi(&closes, self.params.rsi_period).last().copied();
        let bb = calculate_bollinger(&closes, self.params.bb_period, self.params.bb_std_dev);
        let bandwidth_series = calculate_bandwidth_series(&closes, self.params.bb_period, self.params.bb_std_dev);
        let bandwidth_roc = calculate_roc(&bandwidth_series, self.params.roc_period).last().copied();

        let current = history.last()?;
        let previous = &history[history.len() - 2];

        let signal = decide(state, &self.params, rsi, bb.map(|b| b.lower), bandwidth_roc, previous, current);

        if signal.is_none() && !state.stage1_armed {
            debug!(symbol, "stage 1 inactive — no arm condition met");
        }

        signal.map(|price| Signal {
            kind: SignalKind::Buy,
            symbol: symbol.to_string(),
            price,
        })
    }

    fn default_order_params(&self) -> OrderParams {
        self.order_params.clone()
    }
}

/// Pure decision core, separated from indicator plumbing so the stage
/// transitions can be exercised directly with literal indicator values.
/// Mutates `state` in place; returns `Some(close)` when a BUY should fire.
fn decide(
    state: &mut StrategyPerSymbolState,
    params: &RSIBBandsParams,
    rsi: Option<f64>,
    lower_band: Option<f64>,
    bandwidth_roc: Option<f64>,
    previous: &Candle,
    current: &Candle,
) -> Option<rust_decimal::Decimal> {
    let close = current.close.to_f64().unwrap_or(f64::NAN);

    if !state.stage1_armed {
        if let (Some(rsi), Some(lower)) = (rsi, lower_band) {
            if rsi.is_finite() && lower.is_finite() && rsi <= params.stage1_rsi_threshold && close < lower {
                state.stage1_armed = true;
            }
        }
        return None;
    }

    // Armed: evaluate disarm, then fire, in that order (spec §4.6).
    let rsi = match rsi {
        Some(v) if v.is_finite() => v,
        _ => return None, // NaN decision variable => condition not satisfied, stay armed.
    };

    if rsi > params.stage2_disarm_above() {
        state.stage1_armed = false;
        return None;
    }

    let in_recovery_range = rsi >= params.stage2_rsi_entry && rsi < params.stage2_rsi_exit;
    let bandwidth_expanding = bandwidth_roc.map(|r| r.is_finite() && r > params.stage2_min_roc).unwrap_or(false);
    let engulfing = is_bullish_engulfing(previous, current);

    if in_recovery_range && bandwidth_expanding && engulfing {
        state.stage1_armed = false;
        return Some(current.close);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn candle(minute: i64, open: Decimal, close: Decimal) -> Candle {
        Candle {
            symbol: "TEST".to_string(),
            timestamp: Utc.timestamp_opt(1_700_000_000 + minute * 60, 0).unwrap(),
            open,
            high: open.max(close) + dec!(0.5),
            low: open.min(close) - dec!(0.5),
            close,
            volume: 1_000,
        }
    }

    fn order_params() -> OrderParams {
        OrderParams {
            risk_percentage: dec!(0.02),
            tp_multiplier: dec!(1.5),
            sl_multiplier: dec!(0.9),
            use_trailing_stop: false,
            extra: HashMap::new(),
        }
    }

    fn strategy() -> RSIBBandsStrategy {
        RSIBBandsStrategy::new(RSIBBandsParams::default(), order_params())
    }

    // ---- defaults -----------------------------------------------------

    #[test]
    fn default_params_match_spec() {
        let p = RSIBBandsParams::default();
        assert_eq!(p.bb_period, 20);
        assert_eq!(p.rsi_period, 14);
        assert_eq!(p.roc_period, 9);
        assert_eq!(p.stage1_rsi_threshold, 30.0);
        assert_eq!(p.stage2_rsi_entry, 30.0);
        assert_eq!(p.stage2_rsi_exit, 40.0);
        assert_eq!(p.stage2_min_roc, 0.15);
        assert_eq!(p.stage2_disarm_above(), 45.0);
    }

    #[test]
    fn default_order_params_match_spec() {
        let strat = strategy();
        let op = strat.default_order_params();
        assert_eq!(op.risk_percentage, dec!(0.02));
        assert_eq!(op.tp_multiplier, dec!(1.5));
        assert_eq!(op.sl_multiplier, dec!(0.9));
        assert!(!op.use_trailing_stop);
    }

    #[test]
    fn warmup_period_is_max_of_periods_plus_one() {
        let strat = strategy();
        // max(20, 14, 9) + 1
        assert_eq!(strat.warmup_period(), 21);
    }

    // ---- decide(): arm/confirm/disarm scenarios --------------------------

    #[test]
    fn scenario_1_stage1_arming() {
        let mut state = StrategyPerSymbolState::default();
        let params = RSIBBandsParams::default();
        let previous = candle(0, dec!(96), dec!(96));
        let current = candle(1, dec!(96), dec!(95));

        let signal = decide(&mut state, &params, Some(28.0), Some(100.0), None, &previous, &current);

        assert!(signal.is_none());
        assert!(state.stage1_armed);
    }

    #[test]
    fn stage1_does_not_arm_on_exact_band_touch() {
        // close == lower must NOT arm — spec requires strict `<`.
        let mut state = StrategyPerSymbolState::default();
        let params = RSIBBandsParams::default();
        let previous = candle(0, dec!(100), dec!(100));
        let current = candle(1, dec!(100), dec!(100));

        let signal = decide(&mut state, &params, Some(28.0), Some(100.0), None, &previous, &current);

        assert!(signal.is_none());
        assert!(!state.stage1_armed);
    }

    #[test]
    fn scenario_2_full_two_stage_fire() {
        let mut state = StrategyPerSymbolState { stage1_armed: true };
        let params = RSIBBandsParams::default();
        let previous = candle(0, dec!(100), dec!(97)); // bearish
        let current = candle(1, dec!(96), dec!(101)); // bullish, engulfs

        let signal = decide(&mut state, &params, Some(35.0), Some(90.0), Some(0.20), &previous, &current);

        assert_eq!(signal, Some(dec!(101)));
        assert!(!state.stage1_armed);
    }

    #[test]
    fn scenario_3_engulfing_missing_means_no_fire() {
        // Same as scenario 2 but open_t=98 does not dip below close_{t-1}=97.
        let mut state = StrategyPerSymbolState { stage1_armed: true };
        let params = RSIBBandsParams::default();
        let previous = candle(0, dec!(100), dec!(97));
        let current = candle(1, dec!(98), dec!(101));

        let signal = decide(&mut state, &params, Some(35.0), Some(90.0), Some(0.20), &previous, &current);

        assert!(signal.is_none());
        assert!(state.stage1_armed, "should remain armed without confirmation");
    }

    #[test]
    fn scenario_4_disarm_on_recovery_overshoot() {
        let mut state = StrategyPerSymbolState { stage1_armed: true };
        let params = RSIBBandsParams::default();
        let previous = candle(0, dec!(100), dec!(101));
        let current = candle(1, dec!(101), dec!(102));

        let signal = decide(&mut state, &params, Some(50.0), Some(90.0), Some(0.20), &previous, &current);

        assert!(signal.is_none());
        assert!(!state.stage1_armed);
    }

    #[test]
    fn rsi_exactly_at_stage2_exit_does_not_satisfy_range() {
        // Strict `<` on the upper bound.
        let mut state = StrategyPerSymbolState { stage1_armed: true };
        let params = RSIBBandsParams::default();
        let previous = candle(0, dec!(100), dec!(97));
        let current = candle(1, dec!(96), dec!(101));

        let signal = decide(&mut state, &params, Some(40.0), Some(90.0), Some(0.20), &previous, &current);

        assert!(signal.is_none());
        assert!(state.stage1_armed, "40.0 does not satisfy exit+5 disarm either, stays armed");
    }

    #[test]
    fn bandwidth_roc_at_or_below_threshold_does_not_fire() {
        let mut state = StrategyPerSymbolState { stage1_armed: true };
        let params = RSIBBandsParams::default();
        let previous = candle(0, dec!(100), dec!(97));
        let current = candle(1, dec!(96), dec!(101));

        let signal = decide(&mut state, &params, Some(35.0), Some(90.0), Some(0.15), &previous, &current);

        assert!(signal.is_none());
        assert!(state.stage1_armed);
    }

    #[test]
    fn nan_bandwidth_roc_is_treated_as_condition_not_satisfied() {
        let mut state = StrategyPerSymbolState { stage1_armed: true };
        let params = RSIBBandsParams::default();
        let previous = candle(0, dec!(100), dec!(97));
        let current = candle(1, dec!(96), dec!(101));

        let signal = decide(&mut state, &params, Some(35.0), Some(90.0), Some(f64::NAN), &previous, &current);

        assert!(signal.is_none());
        assert!(state.stage1_armed);
    }

    #[test]
    fn nan_rsi_leaves_state_unchanged() {
        let mut state = StrategyPerSymbolState { stage1_armed: true };
        let params = RSIBBandsParams::default();
        let previous = candle(0, dec!(100), dec!(97));
        let current = candle(1, dec!(96), dec!(101));

        let signal = decide(&mut state, &params, Some(f64::NAN), Some(90.0), Some(0.20), &previous, &current);

        assert!(signal.is_none());
        assert!(state.stage1_armed);
    }

    // ---- analyze(): warmup gating over realistic histories --------------

    fn declining_history(length: usize) -> Vec<Candle> {
        let mut history = Vec::with_capacity(length);
        let mut price = dec!(150);
        for i in 0..length {
            let close = if i + 1 == length {
                price - dec!(12) // sharp final drop, pierces the lower band
            } else {
                price - dec!(1)
            };
            history.push(candle(i as i64, price, close));
            price = close;
        }
        history
    }

    #[test]
    fn analyze_returns_none_below_warmup_period() {
        let strat = strategy();
        let mut state = StrategyPerSymbolState::default();
        let history = declining_history(strat.warmup_period() - 1);

        let signal = strat.analyze("TEST", &history, &mut state);

        assert!(signal.is_none());
        assert!(!state.stage1_armed, "no state change below warmup");
    }

    #[test]
    fn analyze_arms_on_a_realistic_oversold_decline() {
        let strat = strategy();
        let mut state = StrategyPerSymbolState::default();
        let history = declining_history(strat.warmup_period() + 5);

        let signal = strat.analyze("TEST", &history, &mut state);

        assert!(signal.is_none());
        assert!(state.stage1_armed, "expected stage 1 to arm after a sharp oversold decline");
    }

    #[test]
    fn analyze_is_deterministic_on_replay() {
        let strat = strategy();
        let history = declining_history(strat.warmup_period() + 5);

        let mut state_a = StrategyPerSymbolState::default();
        let signal_a = strat.analyze("TEST", &history, &mut state_a);

        let mut state_b = StrategyPerSymbolState::default();
        let signal_b = strat.analyze("TEST", &history, &mut state_b);

        assert_eq!(signal_a, signal_b);
        assert_eq!(state_a, state_b);
    }
}
