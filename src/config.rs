// =============================================================================
// Engine Configuration — credentials from env, tunables from JSON
// =============================================================================
//
// Secrets never live in a committed file and are read from the environment
// (via `.env` in development); everything else is a hot-editable JSON
// document with `#[serde(default = "...")]` on every field so that adding a
// new tunable never breaks loading an older config file. Persistence uses an
// atomic tmp + rename.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::strategy::RSIBBandsParams;
use crate::types::OrderParams;

fn default_symbol_universe_size() -> usize {
    20
}

fn default_timeframe_minutes() -> usize {
    5
}

fn default_history_size() -> usize {
    200
}

fn default_risk_percentage() -> Decimal {
    "0.02".parse().expect("valid decimal literal")
}

fn default_tp_multiplier() -> Decimal {
    "1.5".parse().expect("valid decimal literal")
}

fn default_sl_multiplier() -> Decimal {
    "0.9".parse().expect("valid decimal literal")
}

fn default_rsi_period() -> usize {
    14
}

fn default_bb_period() -> usize {
    20
}

fn default_bb_std_dev() -> f64 {
    2.0
}

fn default_roc_period() -> usize {
    9
}

fn default_stage1_rsi_threshold() -> f64 {
    30.0
}

fn default_stage2_rsi_entry() -> f64 {
    30.0
}

fn default_stage2_rsi_exit() -> f64 {
    40.0
}

fn default_stage2_min_roc() -> f64 {
    0.15
}

/// Strategy and sizing tunables, loaded from a JSON file on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of top-volume symbols to trade when `symbols` is not set.
    #[serde(default = "default_symbol_universe_size")]
    pub symbol_universe_size: usize,

    /// Explicit symbol universe. When set, the CLI trades exactly these
    /// symbols instead of calling `most_actives`.
    #[serde(default)]
    pub symbols: Option<Vec<String>>,

    /// Number of 1-minute bars folded into one aggregated candle.
    #[serde(default = "default_timeframe_minutes")]
    pub timeframe_minutes: usize,

    /// Number of completed candles retained per symbol.
    #[serde(default = "default_history_size")]
    pub history_size: usize,

    /// Fraction of capital risked per entry, in (0, 1].
    #[serde(default = "default_risk_percentage")]
    pub risk_percentage: Decimal,

    /// Take-profit multiplier on entry price, > 1.
    #[serde(default = "default_tp_multiplier")]
    pub tp_multiplier: Decimal,

    /// Stop-loss multiplier on entry price, in (0, 1).
    #[serde(default = "default_sl_multiplier")]
    pub sl_multiplier: Decimal,

    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,

    #[serde(default = "default_bb_period")]
    pub bb_period: usize,

    #[serde(default = "default_bb_std_dev")]
    pub bb_std_dev: f64,

    #[serde(default = "default_roc_period")]
    pub roc_period: usize,

    #[serde(default = "default_stage1_rsi_threshold")]
    pub stage1_rsi_threshold: f64,

    #[serde(default = "default_stage2_rsi_entry")]
    pub stage2_rsi_entry: f64,

    #[serde(default = "default_stage2_rsi_exit")]
    pub stage2_rsi_exit: f64,

    #[serde(default = "default_stage2_min_roc")]
    pub stage2_min_roc: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbol_universe_size: default_symbol_universe_size(),
            symbols: None,
            timeframe_minutes: default_timeframe_minutes(),
            history_size: default_history_size(),
            risk_percentage: default_risk_percentage(),
            tp_multiplier: default_tp_multiplier(),
            sl_multiplier: default_sl_multiplier(),
            rsi_period: default_rsi_period(),
            bb_period: default_bb_period(),
            bb_std_dev: default_bb_std_dev(),
            roc_period: default_roc_period(),
            stage1_rsi_threshold: default_stage1_rsi_threshold(),
            stage2_rsi_entry: default_stage2_rsi_entry(),
            stage2_rsi_exit: default_stage2_rsi_exit(),
            stage2_min_roc: default_stage2_min_roc(),
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file, falling back to defaults for any field missing
    /// or added since the file was last written.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;
        let config: Self =
            serde_json::from_str(&content).context("failed to parse engine config JSON")?;
        info!(path = %path.display(), "engine config loaded");
        Ok(config)
    }

    /// Persist via atomic tmp + rename so a crash mid-write never leaves a
    /// truncated config file in place.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self).context("failed to serialise engine config")?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }

    pub fn order_params(&self) -> OrderParams {
        OrderParams {
            risk_percentage: self.risk_percentage,
            tp_multiplier: self.tp_multiplier,
            sl_multiplier: self.sl_multiplier,
            use_trailing_stop: false,
            extra: Default::default(),
        }
    }

    pub fn strategy_params(&self) -> RSIBBandsParams {
        RSIBBandsParams {
            bb_period: self.bb_period,
            bb_std_dev: self.bb_std_dev,
            rsi_period: self.rsi_period,
            roc_period: self.roc_period,
            stage1_rsi_threshold: self.stage1_rsi_threshold,
            stage2_rsi_entry: self.stage2_rsi_entry,
            stage2_rsi_exit: self.stage2_rsi_exit,
            stage2_min_roc: self.stage2_min_roc,
        }
    }

    /// Validate the order-sizing tunables against `OrderCalculator`'s rules,
    /// independent of any particular entry price (spec §4.9: construction
    /// fails with `EngineError::Config` if the loaded `OrderParams` are
    /// invalid).
    pub fn validate(&self) -> Result<(), crate::error::EngineError> {
        crate::order::OrderCalculator::validate(rust_decimal::Decimal::ONE, &self.order_params())
            .map_err(|_| {
                crate::error::EngineError::Config(format!(
                    "invalid order params: risk={}, tp={}, sl={}",
                    self.risk_percentage, self.tp_multiplier, self.sl_multiplier
                ))
            })
    }
}

/// Credentials, read from the environment (`.env` in development, real
/// environment variables in production). Never serialised.
#[derive(Debug, Clone)]
pub struct BrokerCredentials {
    pub key_id: String,
    pub secret_key: String,
}

impl BrokerCredentials {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Ok(Self {
            key_id: std::env::var("ALPACA_KEY").context("ALPACA_KEY not set")?,
            secret_key: std::env::var("ALPACA_SECRET").context("ALPACA_SECRET not set")?,
        })
    }
}
