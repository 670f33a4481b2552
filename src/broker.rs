// =============================================================================
// BrokerClient capability — external contract + a concrete Alpaca adapter
// =============================================================================
//
// `BrokerClient` is the trait the engine consumes; everything below the trait
// is the concrete adapter: base URL + header auth + typed response +
// `anyhow::Context` on every request, using Alpaca's header-based API-key
// auth.
// =============================================================================

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::error::EngineError;
use crate::types::{Bar, Side};

/// A broker-side open position, as reported by `get_all_positions`.
#[derive(Debug, Clone)]
pub struct BrokerPosition {
    pub symbol: String,
    pub quantity: Decimal,
    pub avg_entry_price: Decimal,
    pub side: Side,
    pub position_id: String,
}

/// Time-in-force for a submitted order. Only `Gtc` is used by this engine
/// (spec §4.5): market orders only, no limit/bracket orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeInForce {
    Gtc,
}

/// Screener ranking criterion for `most_actives` (spec §6: "enum values for
/// 'screener criterion' ... must be passed as typed enums, not raw strings").
/// Only `MostActives` (rank by rolling volume) is used by this engine today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenerCriterion {
    MostActives,
}

impl ScreenerCriterion {
    /// The wire value Alpaca's screener endpoint expects for `by=`.
    fn as_query_value(self) -> &'static str {
        match self {
            Self::MostActives => "volume",
        }
    }
}

/// A market order submission request.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub tif: TimeInForce,
}

/// External contract consumed by the engine (spec §6). Implementations own
/// the concrete transport (REST + WebSocket), credential handling, and rate
/// limiting.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Top-`n` symbols ranked by `criterion`.
    async fn most_actives(&self, n: usize, criterion: ScreenerCriterion) -> Result<Vec<String>, EngineError>;

    /// 1-minute bars for `symbols` in `[start, end]`, UTC timestamps.
    async fn historical_bars(
        &self,
        symbols: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, EngineError>;

    /// All currently open positions on the account.
    async fn get_all_positions(&self) -> Result<Vec<BrokerPosition>, EngineError>;

    /// Submit a market order; returns the broker-assigned order id.
    async fn submit_market_order(&self, request: OrderRequest) -> Result<String, EngineError>;
}

// ---------------------------------------------------------------------------
// Alpaca adapter
// ---------------------------------------------------------------------------

/// REST client for Alpaca's trading + market-data APIs, authenticated via the
/// `APCA-API-KEY-ID` / `APCA-API-SECRET-KEY` headers.
pub struct AlpacaClient {
    trading_base_url: String,
    data_base_url: String,
    client: reqwest::Client,
}

impl AlpacaClient {
    pub fn new(key_id: impl Into<String>, secret_key: impl Into<String>) -> anyhow::Result<Self> {
        let key_id = key_id.into();
        let secret_key = secret_key.into();

        let mut headers = HeaderMap::new();
        headers.insert("APCA-API-KEY-ID", HeaderValue::from_str(&key_id)?);
        headers.insert("APCA-API-SECRET-KEY", HeaderValue::from_str(&secret_key)?);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("failed to build reqwest client")?;

        debug!("AlpacaClient initialised");

        Ok(Self {
            trading_base_url: "https://paper-api.alpaca.markets/v2".to_string(),
            data_base_url: "https://data.alpaca.markets/v2".to_string(),
            client,
        })
    }
}

#[derive(Debug, Deserialize)]
struct AlpacaBarsResponse {
    bars: std::collections::HashMap<String, Vec<AlpacaBar>>,
}

#[derive(Debug, Deserialize)]
struct AlpacaBar {
    t: DateTime<Utc>,
    o: Decimal,
    h: Decimal,
    l: Decimal,
    c: Decimal,
    v: i64,
}

#[derive(Debug, Deserialize)]
struct AlpacaPositionResponse {
    symbol: String,
    qty: Decimal,
    avg_entry_price: Decimal,
    side: String,
    asset_id: String,
}

#[derive(Debug, Deserialize)]
struct AlpacaOrderResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AlpacaMostActiveResponse {
    most_actives: Vec<AlpacaMostActiveEntry>,
}

#[derive(Debug, Deserialize)]
struct AlpacaMostActiveEntry {
    symbol: String,
}

#[async_trait]
impl BrokerClient for AlpacaClient {
    #[instrument(skip(self), name = "alpaca::most_actives")]
    async fn most_actives(&self, n: usize, criterion: ScreenerCriterion) -> Result<Vec<String>, EngineError> {
        let url = format!(
            "{}/screener/stocks/most-actives?by={}&top={n}",
            self.data_base_url,
            criterion.as_query_value()
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET most-actives request failed")
            .map_err(EngineError::transport)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(EngineError::transport(anyhow::anyhow!(
                "most-actives returned {status}"
            )));
        }

        let body: AlpacaMostActiveResponse = resp
            .json()
            .await
            .context("failed to parse most-actives response")
            .map_err(EngineError::transport)?;

        let symbols: Vec<String> = body.most_actives.into_iter().map(|e| e.symbol).collect();
        debug!(count = symbols.len(), "most-actives fetched");
        Ok(symbols)
    }

    #[instrument(skip(self), name = "alpaca::historical_bars")]
    async fn historical_bars(
        &self,
        symbols: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, EngineError> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!(
            "{}/stocks/bars?symbols={}&timeframe=1Min&start={}&end={}&limit=10000",
            self.data_base_url,
            symbols.join(","),
            start.to_rfc3339(),
            end.to_rfc3339(),
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET historical bars request failed")
            .map_err(EngineError::transport)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(EngineError::transport(anyhow::anyhow!(
                "historical bars returned {status}"
            )));
        }

        let body: AlpacaBarsResponse = resp
            .json()
            .await
            .context("failed to parse historical bars response")
            .map_err(EngineError::transport)?;

        let mut bars = Vec::new();
        for (symbol, raw_bars) in body.bars {
            for raw in raw_bars {
                bars.push(Bar {
                    symbol: symbol.clone(),
                    timestamp: raw.t,
                    open: raw.o,
                    high: raw.h,
                    low: raw.l,
                    close: raw.c,
                    volume: raw.v,
                });
            }
        }
        bars.sort_by_key(|b| b.timestamp);

        debug!(count = bars.len(), "historical bars fetched");
        Ok(bars)
    }

    #[instrument(skip(self), name = "alpaca::get_all_positions")]
    async fn get_all_positions(&self) -> Result<Vec<BrokerPosition>, EngineError> {
        let url = format!("{}/positions", self.trading_base_url);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET positions request failed")
            .map_err(EngineError::transport)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(EngineError::transport(anyhow::anyhow!(
                "get positions returned {status}"
            )));
        }

        let body: Vec<AlpacaPositionResponse> = resp
            .json()
            .await
            .context("failed to parse positions response")
            .map_err(EngineError::transport)?;

        let positions = body
            .into_iter()
            .filter_map(|p| {
                let side = match p.side.as_str() {
                    "long" => Side::Buy,
                    "short" => Side::Sell,
                    other => {
                        warn!(side = other, symbol = %p.symbol, "unrecognised position side — skipping");
                        return None;
                    }
                };
                Some(BrokerPosition {
                    symbol: p.symbol,
                    quantity: p.qty,
                    avg_entry_price: p.avg_entry_price,
                    side,
                    position_id: p.asset_id,
                })
            })
            .collect::<Vec<_>>();

        debug!(count = positions.len(), "positions fetched");
        Ok(positions)
    }

    #[instrument(skip(self), name = "alpaca::submit_market_order")]
    async fn submit_market_order(&self, request: OrderRequest) -> Result<String, EngineError> {
        let url = format!("{}/orders", self.trading_base_url);

        let tif = match request.tif {
            TimeInForce::Gtc => "gtc",
        };

        let payload = serde_json::json!({
            "symbol": request.symbol,
            "qty": request.quantity.to_string(),
            "side": match request.side { Side::Buy => "buy", Side::Sell => "sell" },
            "type": "market",
            "time_in_force": tif,
        });

        debug!(symbol = %request.symbol, side = %request.side, quantity = %request.quantity, "submitting market order");

        let resp = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .context("POST order request failed")
            .map_err(EngineError::transport)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(EngineError::transport(anyhow::anyhow!(
                "submit order returned {status}"
            )));
        }

        let body: AlpacaOrderResponse = resp
            .json()
            .await
            .context("failed to parse order response")
            .map_err(EngineError::transport)?;

        debug!(order_id = %body.id, "order submitted");
        Ok(body.id)
    }
}
