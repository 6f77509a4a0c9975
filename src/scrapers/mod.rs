pub mod binance_klines; // Binance spot klines over REST
pub mod candle_replay; // Fixed candle set for offline runs

pub use binance_klines::BinanceKlinesClient;
pub use candle_replay::CandleReplay;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PoiResult;
use crate::models::Timeframe;

/// One OHLCV bar. `open_time` marks the start of the period it covers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Instant the bar closes for a given granularity.
    pub fn close_time(&self, timeframe: Timeframe) -> DateTime<Utc> {
        self.open_time + timeframe.period()
    }

    pub fn is_closed(&self, timeframe: Timeframe, now: DateTime<Utc>) -> bool {
        self.close_time(timeframe) <= now
    }
}

/// Source of realized prices. Failures surface as `PoiError::DataUnavailable`.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Candles for `pair` at `timeframe`, ascending by `open_time`, starting at or after
    /// `since` when given, at most `limit` of them.
    async fn fetch_observations(
        &self,
        pair: &str,
        timeframe: Timeframe,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> PoiResult<Vec<Candle>>;

    fn name(&self) -> &'static str;
}
