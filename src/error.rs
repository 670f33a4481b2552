// =============================================================================
// Engine error taxonomy
// =============================================================================
//
// Five kinds, matching the propagation policy: `Config` aborts the process at
// construction; everything else is caught at the `on_bar` boundary, logged
// with symbol/timestamp context, and suppressed.
// =============================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing credentials or invalid `OrderParams`. Fatal at construction.
    #[error("config error: {0}")]
    Config(String),

    /// Broker HTTP/WebSocket failure.
    #[error("transport error: {source}")]
    Transport {
        #[source]
        source: anyhow::Error,
    },

    /// Malformed bar (missing field, non-finite price, non-positive volume).
    #[error("data error for {symbol}: {reason}")]
    Data { symbol: String, reason: String },

    /// Indicator produced a non-finite decision variable.
    #[error("strategy error: {0}")]
    Strategy(String),

    /// Attempt to place an order while one is active for the same symbol.
    #[error("duplicate position for {symbol}")]
    StateConflict { symbol: String },
}

impl EngineError {
    pub fn transport(source: impl Into<anyhow::Error>) -> Self {
        Self::Transport { source: source.into() }
    }

    pub fn data(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Data { symbol: symbol.into(), reason: reason.into() }
    }
}
