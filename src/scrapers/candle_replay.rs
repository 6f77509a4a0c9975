//! In-memory candle source.
//!
//! Serves a fixed (or manually extended) set of candles through the same interface as the
//! live Binance client. Used for offline deployments and for exercising settlement without
//! network access.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::{Candle, MarketDataSource};
use crate::error::PoiResult;
use crate::models::{normalize_pair, Timeframe};

/// One pair/granularity series as stored in a replay file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaySeries {
    pub pair: String,
    pub timeframe: Timeframe,
    pub candles: Vec<Candle>,
}

#[derive(Debug, Default)]
pub struct CandleReplay {
    series: RwLock<HashMap<(String, Timeframe), Vec<Candle>>>,
}

impl CandleReplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON array of [`ReplaySeries`].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read replay file {}", path.display()))?;
        let series: Vec<ReplaySeries> = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse replay file {}", path.display()))?;

        let replay = Self::new();
        for s in series {
            replay.extend(&s.pair, s.timeframe, s.candles);
        }
        Ok(replay)
    }

    pub fn with_candles(self, pair: &str, timeframe: Timeframe, candles: Vec<Candle>) -> Self {
        self.extend(pair, timeframe, candles);
        self
    }

    /// Add candles to a series; a candle with an existing `open_time` replaces the old one.
    pub fn extend(&self, pair: &str, timeframe: Timeframe, candles: Vec<Candle>) {
        let key = (normalize_pair(pair).unwrap_or_default(), timeframe);
        let mut map = self.series.write();
        let series = map.entry(key).or_default();
        for candle in candles {
            match series.binary_search_by_key(&candle.open_time, |c| c.open_time) {
                Ok(i) => series[i] = candle,
                Err(i) => series.insert(i, candle),
            }
        }
    }

    pub fn push(&self, pair: &str, timeframe: Timeframe, candle: Candle) {
        self.extend(pair, timeframe, vec![candle]);
    }
}

#[async_trait]
impl MarketDataSource for CandleReplay {
    async fn fetch_observations(
        &self,
        pair: &str,
        timeframe: Timeframe,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> PoiResult<Vec<Candle>> {
        let key = (normalize_pair(pair).unwrap_or_default(), timeframe);
        let map = self.series.read();
        let Some(series) = map.get(&key) else {
            return Ok(Vec::new());
        };

        Ok(series
            .iter()
            .filter(|c| since.map_or(true, |s| c.open_time >= s))
            .take(limit)
            .copied()
            .collect())
    }

    fn name(&self) -> &'static str {
        "replay"
    }
}
