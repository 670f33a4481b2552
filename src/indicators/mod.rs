// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the indicators the two-stage
// mean-reversion strategy evaluates on each completed candle. Every public
// function returns `Option<T>` (or an empty series) so callers are forced to
// handle insufficient-data and numerical-edge-case scenarios.

pub mod bollinger;
pub mod engulfing;
pub mod roc;
pub mod rsi;
