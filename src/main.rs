//! Proof of Insight - prediction staking server
//!
//! Accepts multi-period price forecasts over HTTP, settles them against exchange candles
//! on read, and serves scores and rewards.

use anyhow::{Context, Result};
use axum::{middleware, Router};
use dotenv::dotenv;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use proof_of_insight::{
    api::{create_router, AppState},
    middleware::request_logging,
    models::{resolve_data_path, Config},
    predictions::{JsonFilePersistence, PredictionPoller, PredictionStore, StoreSettings},
    scrapers::{BinanceKlinesClient, CandleReplay, MarketDataSource},
};

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let config = Config::from_env().context("Invalid configuration")?;
    info!(
        "🚀 Proof of Insight starting: {} {} x{} periods",
        config.pair,
        config.timeframe.as_str(),
        config.horizon.len()
    );

    let market = build_market_source(&config)?;

    let data_path = resolve_data_path(Some(config.data_path.as_str()), "user_predictions.json");
    let store = Arc::new(
        PredictionStore::open(
            StoreSettings::from(&config),
            Arc::new(JsonFilePersistence::new(&data_path)),
        )
        .with_context(|| format!("Failed to open prediction store at {}", data_path.display()))?,
    );
    info!("💾 Predictions stored at: {}", data_path.display());

    let poller = Arc::new(PredictionPoller::new(store, market, config.kline_limit));

    let app = Router::new()
        .merge(create_router(AppState::new(poller)))
        .layer(middleware::from_fn(request_logging))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("🎯 API server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

fn build_market_source(config: &Config) -> Result<Arc<dyn MarketDataSource>> {
    if let Some(path) = &config.replay_path {
        let path = resolve_data_path(Some(path.as_str()), "candles.json");
        let replay = CandleReplay::from_json_file(&path)?;
        info!("📼 Serving candles from replay file {}", path.display());
        return Ok(Arc::new(replay));
    }

    let timeout = Duration::from_secs(config.market_data_timeout_secs);
    let http_client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")?;

    info!("📈 Market data: Binance klines at {}", config.binance_base_url);
    Ok(Arc::new(BinanceKlinesClient::new(
        http_client,
        config.binance_base_url.clone(),
        timeout,
    )))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "proof_of_insight=debug,poi_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    let _ = dotenv();

    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let candidate = manifest_dir.join(".env");
    if candidate.exists() {
        let _ = dotenv::from_path(&candidate);
    }
}
