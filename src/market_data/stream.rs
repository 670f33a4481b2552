// =============================================================================
// MarketDataStream capability — external contract + a concrete Alpaca adapter
// =============================================================================
//
// `run` is deliberately synchronous from the caller's point of view (spec
// §5): Phase A (warmup, reconciliation) is async, but Phase B dispatches one
// bar at a time through a plain callback so the strategy/order-manager stack
// never has to be `Send`-safe across an await point. The concrete adapter
// still speaks WebSocket underneath — it just drives its own event loop with
// `block_on` rather than exposing one to the caller, the same shape as the
// teacher's `run_kline_stream` but collapsed onto a blocking call.
// =============================================================================

use anyhow::Context;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::EngineError;
use crate::types::Bar;

/// External contract consumed by the engine (spec §6). `run` blocks the
/// calling thread, invoking `on_bar` once per completed 1-minute bar, until
/// the stream ends or a transport error occurs.
pub trait MarketDataStream: Send {
    fn run(&mut self, on_bar: &mut dyn FnMut(Bar)) -> Result<(), EngineError>;
}

// ---------------------------------------------------------------------------
// Alpaca adapter
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AlpacaBarMessage {
    #[serde(rename = "T")]
    message_type: String,
    #[serde(rename = "S")]
    symbol: Option<String>,
    #[serde(rename = "o")]
    open: Option<Decimal>,
    #[serde(rename = "h")]
    high: Option<Decimal>,
    #[serde(rename = "l")]
    low: Option<Decimal>,
    #[serde(rename = "c")]
    close: Option<Decimal>,
    #[serde(rename = "v")]
    volume: Option<i64>,
    #[serde(rename = "t")]
    timestamp: Option<DateTime<Utc>>,
}

/// WebSocket client for Alpaca's real-time bar feed
/// (`wss://stream.data.alpaca.markets/v2/iex`).
pub struct AlpacaStream {
    key_id: String,
    secret_key: String,
    symbols: Vec<String>,
}

impl AlpacaStream {
    pub fn new(key_id: impl Into<String>, secret_key: impl Into<String>, symbols: Vec<String>) -> Self {
        Self {
            key_id: key_id.into(),
            secret_key: secret_key.into(),
            symbols,
        }
    }

    async fn run_async(&mut self, on_bar: &mut dyn FnMut(Bar)) -> Result<(), EngineError> {
        let url = "wss://stream.data.alpaca.markets/v2/iex";
        info!(url, symbols = ?self.symbols, "connecting to bar WebSocket");

        let (ws_stream, _response) = connect_async(url)
            .await
            .context("failed to connect to bar WebSocket")
            .map_err(EngineError::transport)?;

        let (mut write, mut read) = ws_stream.split();

        let auth = serde_json::json!({
            "action": "auth",
            "key": self.key_id,
            "secret": self.secret_key,
        });
        write
            .send(Message::Text(auth.to_string()))
            .await
            .context("failed to send auth frame")
            .map_err(EngineError::transport)?;

        let subscribe = serde_json::json!({
            "action": "subscribe",
            "bars": self.symbols,
        });
        write
            .send(Message::Text(subscribe.to_string()))
            .await
            .context("failed to send subscribe frame")
            .map_err(EngineError::transport)?;

        info!(symbols = ?self.symbols, "bar stream subscribed");

        loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => {
                    for bar in parse_bar_messages(&text) {
                        on_bar(bar);
                    }
                }
                Some(Ok(_)) => {
                    // Ping/Pong/Binary/Close frames carry no bar data.
                }
                Some(Err(e)) => {
                    error!(error = %e, "bar WebSocket read error");
                    return Err(EngineError::transport(e));
                }
                None => {
                    warn!("bar WebSocket stream ended");
                    return Ok(());
                }
            }
        }
    }
}

impl MarketDataStream for AlpacaStream {
    /// Builds its own multi-threaded runtime rather than reusing
    /// `Handle::current()` — the caller is expected to invoke this from a
    /// dedicated blocking thread (`tokio::task::spawn_blocking` or
    /// `std::thread::spawn`), never from inside a task already driven by an
    /// ambient runtime, which would panic on re-entry.
    ///
    /// Multi-threaded (rather than current-thread) so that `on_bar`
    /// callbacks dispatched from inside `run_async`'s poll loop can bridge
    /// back out to async broker calls via `tokio::task::block_in_place`,
    /// which requires a multi-threaded runtime to move other work off the
    /// blocking thread.
    fn run(&mut self, on_bar: &mut dyn FnMut(Bar)) -> Result<(), EngineError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| EngineError::transport(anyhow::anyhow!(e)))?;
        runtime.block_on(self.run_async(on_bar))
    }
}

/// Alpaca sends an array of messages per frame; only `"b"` (bar) entries
/// carry OHLCV data we act on.
fn parse_bar_messages(text: &str) -> Vec<Bar> {
    let messages: Vec<AlpacaBarMessage> = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            debug!(error = %e, "failed to parse bar frame — skipping");
            return Vec::new();
        }
    };

    messages
        .into_iter()
        .filter(|m| m.message_type == "b")
        .filter_map(|m| {
            Some(Bar {
                symbol: m.symbol?,
                timestamp: m.timestamp?,
                open: m.open?,
                high: m.high?,
                low: m.low?,
                close: m.close?,
                volume: m.volume?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bar_frame_and_ignores_non_bar_messages() {
        let text = r#"[
            {"T":"success","msg":"connected"},
            {"T":"b","S":"AAPL","o":100.1,"h":100.5,"l":99.8,"c":100.3,"v":1200,"t":"2026-07-26T13:30:00Z"}
        ]"#;

        let bars = parse_bar_messages(text);
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].symbol, "AAPL");
        assert_eq!(bars[0].volume, 1200);
    }

    #[test]
    fn malformed_frame_yields_no_bars() {
        assert!(parse_bar_messages("not json").is_empty());
    }
}
