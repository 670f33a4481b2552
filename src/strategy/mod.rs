// =============================================================================
// Strategy capability
// =============================================================================
//
// A `Strategy` consumes completed-candle history and per-symbol state and
// emits at most one `Signal` per call. Strategies own no broker or clock
// access — sizing and order placement are the order manager's job.
// =============================================================================

pub mod rsi_bbands;

pub use rsi_bbands::{RSIBBandsParams, RSIBBandsStrategy};

use crate::types::{Candle, OrderParams, Signal, StrategyPerSymbolState};

pub trait Strategy: Send + Sync {
    /// Minimum number of completed candles required before `analyze` can
    /// produce a signal.
    fn warmup_period(&self) -> usize;

    /// Evaluate the latest candle history for `symbol`, mutating its
    /// per-symbol state in place, and return a `Signal` if an entry
    /// condition just fired.
    fn analyze(
        &self,
        symbol: &str,
        history: &[Candle],
        state: &mut StrategyPerSymbolState,
    ) -> Option<Signal>;

    /// Risk/exit parameters handed to the order manager for entries this
    /// strategy produces.
    fn default_order_params(&self) -> OrderParams;
}
