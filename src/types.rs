// =============================================================================
// Shared types used across the trading engine
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Long or short — typed rather than a raw string (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Kind of entry intent carried by a `Signal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalKind {
    Buy,
    Sell,
}

/// A 1-minute OHLCV bar, as delivered by the market-data stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
}

/// An aggregated N-minute candle, folded from `timeframe_minutes` bars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
}

/// Entry intent emitted by a strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub symbol: String,
    pub price: Decimal,
}

/// Immutable risk/exit configuration a strategy hands to the order manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderParams {
    /// Fraction of capital risked per entry, in (0, 1].
    pub risk_percentage: Decimal,
    /// Take-profit multiplier on entry price, > 1.
    pub tp_multiplier: Decimal,
    /// Stop-loss multiplier on entry price, in (0, 1).
    pub sl_multiplier: Decimal,
    /// Trailing-stop flag — reserved, inactive in the reference strategy.
    pub use_trailing_stop: bool,
    /// Strategy-specific extension fields, passed through opaquely.
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Where an `ActiveOrder` originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderOrigin {
    /// Placed by this process via `OrderManager::place`.
    Placed,
    /// Adopted from a pre-existing broker position during reconciliation.
    Adopted,
}

/// A currently-monitored order. Immutable after creation; removal on exit is
/// the only terminal transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveOrder {
    pub id: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub opened_at: DateTime<Utc>,
    pub origin: OrderOrigin,
}

/// Per-symbol state owned exclusively by the two-stage strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StrategyPerSymbolState {
    pub stage1_armed: bool,
}
