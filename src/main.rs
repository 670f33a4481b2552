// =============================================================================
// meridian-trader — CLI entry point
// =============================================================================
//
// Builds the broker client, loads the tunable config, picks a symbol
// universe, constructs the trading engine with the two-stage mean-reversion
// strategy, runs warmup + reconciliation, then hands control to the market
// data stream's blocking run-loop on a dedicated thread until the process is
// interrupted. Shutdown is handled via `tokio::signal::ctrl_c`: a clean
// interrupt exits 0, a construction failure exits nonzero.
// =============================================================================

mod broker;
mod config;
mod engine;
mod error;
mod indicators;
mod market_data;
mod order;
mod strategy;
mod types;

use std::sync::Arc;

use rust_decimal_macros::dec;
use tracing_subscriber::EnvFilter;

use broker::{AlpacaClient, BrokerClient, ScreenerCriterion};
use config::{BrokerCredentials, EngineConfig};
use engine::TradingEngine;
use market_data::{AlpacaStream, MarketDataStream};
use order::OrderManager;
use strategy::{RSIBBandsStrategy, Strategy};

const CONFIG_PATH: &str = "engine_config.json";

/// Fixed capital allocated to the engine for the lifetime of the process.
/// A real deployment would source this from the account's buying power;
/// out of core scope here (spec §4.7 treats it as a constant the engine is
/// constructed with).
const CAPITAL: rust_decimal::Decimal = dec!(100000);

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "failed to build tokio runtime");
            std::process::exit(1);
        }
    };

    match runtime.block_on(run()) {
        Ok(()) => {
            tracing::info!("engine shut down cleanly");
            std::process::exit(0);
        }
        Err(e) => {
            tracing::error!(error = %e, "engine exited with a fatal error");
            std::process::exit(1);
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let config = load_or_init_config();
    config.validate()?;

    let credentials = BrokerCredentials::from_env()?;
    let broker: Arc<dyn BrokerClient> =
        Arc::new(AlpacaClient::new(credentials.key_id.clone(), credentials.secret_key.clone())?);

    let symbols = match &config.symbols {
        Some(configured) if !configured.is_empty() => {
            tracing::info!(symbols = ?configured, "using configured symbol universe");
            configured.clone()
        }
        _ => {
            let fetched = broker
                .most_actives(config.symbol_universe_size, ScreenerCriterion::MostActives)
                .await?;
            tracing::info!(symbols = ?fetched, "symbol universe selected via most_actives");
            fetched
        }
    };
    if symbols.is_empty() {
        anyhow::bail!("no symbols to trade (most_actives returned none and none configured)");
    }

    let strategy: Arc<dyn Strategy> = Arc::new(RSIBBandsStrategy::new(
        config.strategy_params(),
        config.order_params(),
    ));

    let order_manager = Arc::new(OrderManager::new(broker.clone(), config.order_params()));

    let engine = Arc::new(TradingEngine::new(
        broker,
        strategy,
        order_manager,
        CAPITAL,
        config.timeframe_minutes,
        config.history_size,
        symbols.clone(),
    ));

    engine.warmup().await;
    engine.reconcile().await;

    let mut stream = AlpacaStream::new(credentials.key_id, credentials.secret_key, symbols);
    let dispatch_engine = engine.clone();

    tracing::info!("handing control to bar stream run-loop");
    let stream_task = tokio::task::spawn_blocking(move || {
        let mut on_bar = move |bar: types::Bar| dispatch_engine.on_bar(bar);
        stream.run(&mut on_bar)
    });

    tokio::select! {
        joined = stream_task => {
            match joined {
                Ok(Ok(())) => {
                    tracing::warn!("bar stream ended");
                    Ok(())
                }
                Ok(Err(e)) => Err(anyhow::anyhow!("bar stream failed: {e}")),
                Err(join_err) => Err(anyhow::anyhow!("bar stream task panicked: {join_err}")),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("ctrl-c received — shutting down (no queues drained, nothing persisted)");
            Ok(())
        }
    }
}

fn load_or_init_config() -> EngineConfig {
    match EngineConfig::load(CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(error = %e, path = CONFIG_PATH, "no usable config file — using defaults");
            let config = EngineConfig::default();
            if let Err(e) = config.save(CONFIG_PATH) {
                tracing::warn!(error = %e, "failed to persist default config");
            }
            config
        }
    }
}
