// =============================================================================
// TradingEngine — orchestrates warmup, reconciliation, subscription, dispatch
// =============================================================================
//
// Owns exactly what spec §4.7 says it owns: one `BarAggregator` per symbol,
// one `OrderManager`, one `Strategy`, a fixed capital figure, and the
// subscribed symbol set. Phase A (warmup + reconciliation) is async; Phase B
// hands an `on_bar` closure to the stream's blocking run-loop, mirroring the
// teacher's split between its async reconciliation loop and the synchronous
// kline-stream callback it drives with `block_on`.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::broker::BrokerClient;
use crate::error::EngineError;
use crate::market_data::BarAggregator;
use crate::order::OrderManager;
use crate::strategy::Strategy;
use crate::types::{Bar, SignalKind, StrategyPerSymbolState};

/// Known broker-tier constraint (spec §6, §4.7): recent data inside this
/// window is not queryable on the free tier, so warmup's end time is shifted
/// back by this much.
const WARMUP_END_SHIFT_MINUTES: i64 = 16;

/// Fudge factor applied to `warmup_period × timeframe_minutes` when sizing
/// the warmup lookback window, to absorb gaps in the historical feed.
const WARMUP_LOOKBACK_FACTOR: f64 = 1.5;

/// Bridge from `on_bar`'s synchronous callback context back to an async
/// future, without re-entering an already-entered runtime. Requires the
/// ambient runtime to be multi-threaded (see `AlpacaStream::run`).
fn block_on_current<F: std::future::Future>(fut: F) -> F::Output {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(fut))
}

pub struct TradingEngine {
    broker: Arc<dyn BrokerClient>,
    strategy: Arc<dyn Strategy>,
    order_manager: Arc<OrderManager>,
    capital: Decimal,
    timeframe_minutes: usize,
    symbols: Vec<String>,
    aggregators: Mutex<HashMap<String, BarAggregator>>,
    strategy_state: Mutex<HashMap<String, StrategyPerSymbolState>>,
}

impl TradingEngine {
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        strategy: Arc<dyn Strategy>,
        order_manager: Arc<OrderManager>,
        capital: Decimal,
        timeframe_minutes: usize,
        history_size: usize,
        symbols: Vec<String>,
    ) -> Self {
        let aggregators = symbols
            .iter()
            .map(|s| (s.clone(), BarAggregator::new(timeframe_minutes, history_size)))
            .collect();
        let strategy_state = symbols
            .iter()
            .map(|s| (s.clone(), StrategyPerSymbolState::default()))
            .collect();

        Self {
            broker,
            strategy,
            order_manager,
            capital,
            timeframe_minutes,
            symbols,
            aggregators: Mutex::new(aggregators),
            strategy_state: Mutex::new(strategy_state),
        }
    }

    /// Phase A: fetch historical bars for every subscribed symbol and fold
    /// them into each symbol's aggregator before live streaming starts.
    /// Best-effort — a fetch failure for one symbol is logged and does not
    /// prevent the engine from running (spec §4.7 step 5, §9).
    pub async fn warmup(&self) {
        let warmup_period = self.strategy.warmup_period();
        let lookback_minutes =
            ((warmup_period * self.timeframe_minutes) as f64 * WARMUP_LOOKBACK_FACTOR).ceil() as i64;

        let end = Utc::now() - ChronoDuration::minutes(WARMUP_END_SHIFT_MINUTES);
        let start = end - ChronoDuration::minutes(lookback_minutes);

        info!(
            symbols = ?self.symbols,
            lookback_minutes,
            start = %start,
            end = %end,
            "warmup starting"
        );

        let bars = match self.broker.historical_bars(&self.symbols, start, end).await {
            Ok(bars) => bars,
            Err(e) => {
                warn!(error = %e, "warmup historical fetch failed — continuing with no pre-seeded history");
                return;
            }
        };

        let mut by_symbol: HashMap<String, Vec<crate::types::Bar>> = HashMap::new();
        for bar in bars {
            by_symbol.entry(bar.symbol.clone()).or_default().push(bar);
        }

        let mut aggregators = self.aggregators.lock();
        for (symbol, mut symbol_bars) in by_symbol {
            let Some(aggregator) = aggregators.get_mut(&symbol) else {
                continue;
            };
            symbol_bars.sort_by_key(|b| b.timestamp);
            for bar in symbol_bars {
                aggregator.add(bar);
            }
            info!(symbol, candles = aggregator.history_len(), "warmup seeded symbol history");
        }

        for symbol in &self.symbols {
            let candles = aggregators.get(symbol).map(|a| a.history_len()).unwrap_or(0);
            if candles < warmup_period {
                warn!(symbol, candles, warmup_period, "insufficient warmup history — signals deferred until live data accumulates");
            }
        }
    }

    /// Reconcile internally tracked orders against broker-reported positions.
    /// Called once, after warmup and before subscribing (spec §4.7).
    pub async fn reconcile(&self) {
        match self.order_manager.sync_positions().await {
            Ok(report) => info!(?report, "startup reconciliation complete"),
            Err(e) => error!(error = %e, "startup reconciliation failed"),
        }
    }

    /// Single-threaded per-bar dispatch (spec §4.7, §5). Never propagates —
    /// every error is logged with symbol/timestamp context and suppressed,
    /// since a panicking or error-returning callback would terminate the
    /// stream's run-loop. The caller (`main`) wires this directly as the
    /// `on_bar` callback handed to `MarketDataStream::run` from a dedicated
    /// blocking thread, after `warmup`/`reconcile` have completed.
    pub fn on_bar(&self, bar: crate::types::Bar) {
        let symbol = bar.symbol.clone();
        let timestamp = bar.timestamp;

        // Step 0: reject a malformed bar before it reaches monitoring or
        // aggregation (spec §7 DataError) — a non-finite or non-positive
        // price flowing into `monitor` would otherwise trip a spurious
        // stop-loss/take-profit comparison.
        if let Err(e) = validate_bar(&bar) {
            warn!(symbol, %timestamp, error = %e, "dropping malformed bar");
            return;
        }

        // Step 1: exit monitoring runs before aggregation, so an entry
        // decided on this bar's close cannot be stopped out by the same
        // close that produced it.
        //
        // `on_bar` is called synchronously from inside the stream's own
        // async poll loop (see `AlpacaStream::run_async`), so bridging back
        // to the order manager's async broker calls needs
        // `block_in_place` + `Handle::block_on` rather than a bare nested
        // `block_on` — the latter would panic re-entering an already
        // entered runtime.
        let exit = block_on_current(self.order_manager.monitor(&symbol, bar.close));
        if let Some(exit) = exit {
            info!(symbol = %exit.symbol, order_id = %exit.order_id, reason = ?exit.reason, exit_price = %exit.exit_price, "position exited");
        }

        // Step 2: fold the bar into this symbol's aggregator.
        let produced = {
            let mut aggregators = self.aggregators.lock();
            match aggregators.get_mut(&symbol) {
                Some(aggregator) => aggregator.add(bar),
                None => {
                    warn!(symbol, %timestamp, "bar for unsubscribed symbol — dropped");
                    return;
                }
            }
        };

        if !produced {
            return;
        }

        // Step 3: a new candle closed — run the strategy over this symbol's
        // history snapshot. History trimming has already been committed by
        // `add` before we read it here.
        let history = {
            let aggregators = self.aggregators.lock();
            aggregators.get(&symbol).map(|a| a.snapshot_history())
        };
        let Some(history) = history else { return };

        let signal = {
            let mut states = self.strategy_state.lock();
            let state = states.entry(symbol.clone()).or_default();
            self.strategy.analyze(&symbol, &history, state)
        };

        // Step 4: for each BUY signal, place an order. Rejections (including
        // StateConflict from an already-active order) are logged and ignored.
        if let Some(signal) = signal {
            if signal.kind == SignalKind::Buy {
                match block_on_current(self.order_manager.place(
                    &symbol,
                    crate::types::Side::Buy,
                    self.capital,
                    signal.price,
                    None,
                )) {
                    Ok(order) => info!(symbol = %symbol, order_id = %order.id, price = %signal.price, "entry placed"),
                    Err(e) => warn!(symbol = %symbol, error = %e, "entry placement rejected"),
                }
            }
        }
    }
}

/// Reject a malformed bar (spec §7 DataError): non-positive price, a
/// high/low that doesn't bracket the rest of the OHLC, or negative volume.
/// Dropped-and-logged by the caller; never propagated.
fn validate_bar(bar: &Bar) -> Result<(), EngineError> {
    if bar.open <= Decimal::ZERO || bar.high <= Decimal::ZERO || bar.low <= Decimal::ZERO || bar.close <= Decimal::ZERO {
        return Err(EngineError::data(bar.symbol.clone(), "non-positive price"));
    }
    if bar.high < bar.low {
        return Err(EngineError::data(bar.symbol.clone(), "high < low"));
    }
    if bar.high < bar.open || bar.high < bar.close || bar.low > bar.open || bar.low > bar.close {
        return Err(EngineError::data(bar.symbol.clone(), "high/low does not bracket open/close"));
    }
    if bar.volume < 0 {
        return Err(EngineError::data(bar.symbol.clone(), "negative volume"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn bar(open: Decimal, high: Decimal, low: Decimal, close: Decimal, volume: i64) -> Bar {
        Bar {
            symbol: "TEST".to_string(),
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            open,
            high,
            low,
            close,
            volume,
        }
    }

    #[test]
    fn accepts_a_well_formed_bar() {
        let b = bar(dec!(10), dec!(11), dec!(9), dec!(10.5), 100);
        assert!(validate_bar(&b).is_ok());
    }

    #[test]
    fn rejects_zero_close() {
        let b = bar(dec!(10), dec!(11), dec!(9), dec!(0), 100);
        assert!(validate_bar(&b).is_err());
    }

    #[test]
    fn rejects_negative_price() {
        let b = bar(dec!(-10), dec!(11), dec!(9), dec!(10.5), 100);
        assert!(validate_bar(&b).is_err());
    }

    #[test]
    fn rejects_high_below_low() {
        let b = bar(dec!(10), dec!(8), dec!(9), dec!(10), 100);
        assert!(validate_bar(&b).is_err());
    }

    #[test]
    fn rejects_negative_volume() {
        let b = bar(dec!(10), dec!(11), dec!(9), dec!(10.5), -1);
        assert!(validate_bar(&b).is_err());
    }

    #[test]
    fn rejects_high_not_bracketing_close() {
        let b = bar(dec!(10), dec!(10.2), dec!(9), dec!(10.5), 100);
        assert!(validate_bar(&b).is_err());
    }
}
