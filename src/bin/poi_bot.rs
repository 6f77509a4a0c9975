//! Bot Submission CLI
//!
//! Writes a bot prediction straight into the JSON prediction file, bypassing the HTTP API.
//! The start time is the current minute.
//!
//! Usage:
//!   poi-bot --username BotAlpha --stake 10 --predictions 30000,30010,30020,...
//!
//! Environment:
//!   POI_DATA_PATH - Prediction file (default: user_predictions.json)
//!   POI_HORIZON - Predictions per submission, 7 or 14 (default: 7)
//!   POI_PAIR / POI_TIMEFRAME - Market the forecast is for (default: BTCUSDT / 1h)

use anyhow::{Context, Result};
use chrono::{DateTime, DurationRound, SecondsFormat, Utc};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use proof_of_insight::models::{resolve_data_path, Horizon, Timeframe};
use proof_of_insight::predictions::{
    JsonFilePersistence, NewSubmission, PredictionStore, StoreSettings, StrategyNote,
};

const DEFAULT_STRATEGY: &str = "Bot strategy: Random forecast";

#[derive(Parser, Debug)]
#[command(name = "poi-bot")]
#[command(about = "Submit a bot prediction directly into the prediction file")]
struct Args {
    /// Submitter name
    #[arg(long, env = "POI_BOT_USERNAME", default_value = "BotAlpha")]
    username: String,

    /// Amount staked
    #[arg(long, env = "POI_BOT_STAKE", default_value = "10")]
    stake: f64,

    /// Comma-separated forecasts; defaults to 30000 + 10 per period
    #[arg(long, value_delimiter = ',')]
    predictions: Option<Vec<f64>>,

    /// Prediction file; relative paths resolve against the crate directory, as in poi-server
    #[arg(long, env = "POI_DATA_PATH", default_value = "user_predictions.json")]
    data_path: String,

    /// Predictions per submission (7 or 14)
    #[arg(long, env = "POI_HORIZON", default_value = "7", value_parser = parse_horizon)]
    horizon: Horizon,

    #[arg(long, env = "POI_PAIR", default_value = "BTCUSDT")]
    pair: String,

    /// 1h, 4h or 1d
    #[arg(long, env = "POI_TIMEFRAME", default_value = "1h")]
    timeframe: Timeframe,

    /// Strategy note stored with the submission
    #[arg(long, default_value = DEFAULT_STRATEGY)]
    strategy: String,
}

fn parse_horizon(raw: &str) -> Result<Horizon, String> {
    let n: usize = raw
        .trim()
        .parse()
        .map_err(|_| format!("not a number: {}", raw))?;
    Horizon::try_from(n)
}

fn data_file(args: &Args) -> PathBuf {
    resolve_data_path(Some(args.data_path.as_str()), "user_predictions.json")
}

fn default_predictions(n: usize) -> Vec<f64> {
    (0..n).map(|i| 30000.0 + i as f64 * 10.0).collect()
}

fn current_minute(now: DateTime<Utc>) -> DateTime<Utc> {
    now.duration_trunc(chrono::Duration::minutes(1)).unwrap_or(now)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("proof_of_insight=info,poi_bot=info")),
        )
        .init();

    let args = Args::parse();
    let path = data_file(&args);

    let predictions = args
        .predictions
        .unwrap_or_else(|| default_predictions(args.horizon.len()));
    let start_time = current_minute(Utc::now()).to_rfc3339_opts(SecondsFormat::Secs, true);

    let store = PredictionStore::open(
        StoreSettings {
            horizon: args.horizon,
            default_pair: args.pair.clone(),
            default_timeframe: args.timeframe,
        },
        Arc::new(JsonFilePersistence::new(&path)),
    )
    .with_context(|| format!("Failed to open {}", path.display()))?;

    let draft = NewSubmission::new(&args.username, args.stake, start_time, predictions)
        .with_pair(args.pair)
        .with_timeframe(args.timeframe)
        .with_strategy(StrategyNote {
            strategies: Some(args.strategy),
            ..Default::default()
        });

    let id = store.submit(draft).context("Bot submission rejected")?;
    info!(path = %path.display(), "bot prediction stored");
    println!("✅ Bot prediction submitted with ID: {}", id);

    Ok(())
}
