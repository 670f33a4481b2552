// =============================================================================
// Bar Aggregator — folds N 1-minute bars into one aggregated candle
// =============================================================================
//
// Boundaries are fixed by count-of-bars seen, not by wall-clock alignment: the
// aggregator never synthesizes missing bars, and gaps in wall time are
// tolerated. History is a bounded ring, oldest evicted first.
// =============================================================================

use std::collections::VecDeque;

use crate::types::{Bar, Candle};

pub struct BarAggregator {
    timeframe_minutes: usize,
    history_size: usize,
    buffer: Vec<Bar>,
    history: VecDeque<Candle>,
}

impl BarAggregator {
    /// Create a new aggregator that folds every `timeframe_minutes` bars into
    /// one candle, retaining at most `history_size` completed candles.
    pub fn new(timeframe_minutes: usize, history_size: usize) -> Self {
        assert!(timeframe_minutes > 0, "timeframe_minutes must be positive");
        Self {
            timeframe_minutes,
            history_size,
            buffer: Vec::with_capacity(timeframe_minutes),
            history: VecDeque::with_capacity(history_size),
        }
    }

    /// Feed one 1-minute bar. Returns `true` when this bar completed an
    /// aggregation boundary and a new candle was appended to history.
    pub fn add(&mut self, bar: Bar) -> bool {
        self.buffer.push(bar);

        if self.buffer.len() < self.timeframe_minutes {
            return false;
        }

        let candle = fold_candle(&self.buffer);
        self.history.push_back(candle);
        while self.history.len() > self.history_size {
            self.history.pop_front();
        }
        self.buffer.clear();

        true
    }

    /// An immutable snapshot of the completed-candle history, oldest first.
    pub fn snapshot_history(&self) -> Vec<Candle> {
        self.history.iter().cloned().collect()
    }

    /// Number of bars currently buffered toward the next boundary.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

fn fold_candle(bars: &[Bar]) -> Candle {
    let first = bars.first().expect("fold_candle called with empty buffer");
    let last = bars.last().expect("fold_candle called with empty buffer");

    let high = bars.iter().map(|b| b.high).max().expect("non-empty");
    let low = bars.iter().map(|b| b.low).min().expect("non-empty");
    let volume = bars.iter().map(|b| b.volume).sum();

    Candle {
        symbol: first.symbol.clone(),
        timestamp: last.timestamp,
        open: first.open,
        high,
        low,
        close: last.close,
        volume,
    }
}
