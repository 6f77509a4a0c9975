use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::{Candle, MarketDataSource};
use crate::error::{PoiError, PoiResult};
use crate::models::Timeframe;

/// Binance rejects larger `limit` values.
pub const MAX_KLINE_LIMIT: usize = 1000;

/// Binance spot klines (`GET /api/v3/klines`).
#[derive(Debug, Clone)]
pub struct BinanceKlinesClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl BinanceKlinesClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    async fn fetch(
        &self,
        pair: &str,
        timeframe: Timeframe,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let mut query: Vec<(&str, String)> = vec![
            ("symbol", pair.to_string()),
            ("interval", timeframe.as_str().to_string()),
            ("limit", limit.clamp(1, MAX_KLINE_LIMIT).to_string()),
        ];
        if let Some(since) = since {
            query.push(("startTime", since.timestamp_millis().to_string()));
        }

        let response = self
            .http
            .get(format!("{}/api/v3/klines", self.base_url))
            .timeout(self.timeout)
            .header(reqwest::header::USER_AGENT, "ProofOfInsight/1.0")
            .query(&query)
            .send()
            .await
            .context("binance klines request failed")?
            .error_for_status()
            .context("binance klines status")?;

        let body = response.text().await.context("binance klines text")?;
        debug!(pair = %pair, interval = timeframe.as_str(), body_len = body.len(), "binance klines received");

        parse_klines(&body).map_err(|e| {
            warn!(pair = %pair, error = %e, body_preview = %body.chars().take(300).collect::<String>(), "binance klines parse failed");
            e
        })
    }
}

#[async_trait]
impl MarketDataSource for BinanceKlinesClient {
    async fn fetch_observations(
        &self,
        pair: &str,
        timeframe: Timeframe,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> PoiResult<Vec<Candle>> {
        let started = Instant::now();
        match self.fetch(pair, timeframe, since, limit).await {
            Ok(candles) => {
                debug!(
                    pair = %pair,
                    candles = candles.len(),
                    latency_ms = started.elapsed().as_millis() as u64,
                    "binance klines fetched"
                );
                Ok(candles)
            }
            Err(e) => {
                warn!(pair = %pair, error = %e, "⚠️ Binance klines unavailable");
                Err(PoiError::data_unavailable(format!("{:#}", e)))
            }
        }
    }

    fn name(&self) -> &'static str {
        "binance"
    }
}

/// Decode a klines payload: an array of
/// `[open_time_ms, "open", "high", "low", "close", "volume", close_time_ms, ...]`.
pub fn parse_klines(body: &str) -> Result<Vec<Candle>> {
    let rows: Vec<Vec<Value>> = serde_json::from_str(body).context("klines json parse")?;

    let mut candles = rows
        .iter()
        .enumerate()
        .map(|(i, row)| parse_row(row).with_context(|| format!("kline row {}", i)))
        .collect::<Result<Vec<_>>>()?;

    candles.sort_by_key(|c| c.open_time);
    candles.dedup_by_key(|c| c.open_time);
    Ok(candles)
}

fn parse_row(row: &[Value]) -> Result<Candle> {
    if row.len() < 6 {
        anyhow::bail!("expected at least 6 fields, got {}", row.len());
    }

    let open_ms = row[0]
        .as_i64()
        .context("open time is not an integer")?;
    let open_time = Utc
        .timestamp_millis_opt(open_ms)
        .single()
        .context("open time out of range")?;

    Ok(Candle {
        open_time,
        open: decimal_field(&row[1]).context("open")?,
        high: decimal_field(&row[2]).context("high")?,
        low: decimal_field(&row[3]).context("low")?,
        close: decimal_field(&row[4]).context("close")?,
        volume: decimal_field(&row[5]).context("volume")?,
    })
}

// Binance quotes prices as strings ("30123.45000000"); accept plain numbers too.
fn decimal_field(v: &Value) -> Result<f64> {
    let parsed = match v {
        Value::String(s) => s.parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };
    parsed
        .filter(|x| x.is_finite())
        .with_context(|| format!("not a decimal: {}", v))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
        [1735693200000, "93000.10", "93500.00", "92800.00", "93250.55", "812.4", 1735696799999, "0", 100, "0", "0", "0"],
        [1735689600000, "92900.00", "93100.00", "92750.00", "93000.10", "640.1", 1735693199999, "0", 90, "0", "0", "0"]
    ]"#;

    #[test]
    fn test_parse_klines_sorts_ascending() {
        let candles = parse_klines(SAMPLE).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(
            candles[0].open_time,
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(candles[0].close, 93000.10);
        assert_eq!(candles[1].close, 93250.55);
        assert_eq!(candles[1].volume, 812.4);
    }

    #[test]
    fn test_parse_klines_accepts_numbers() {
        let candles = parse_klines("[[0, 1, 2, 0.5, 1.5, 10]]").unwrap();
        assert_eq!(candles[0].close, 1.5);
    }

    #[test]
    fn test_parse_klines_rejects_malformed() {
        assert!(parse_klines(r#"{"code": -1121, "msg": "Invalid symbol."}"#).is_err());
        assert!(parse_klines(r#"[[1735689600000, "1", "2"]]"#).is_err());
        assert!(parse_klines(r#"[[1735689600000, "x", "2", "1", "1", "1"]]"#).is_err());
    }

    #[test]
    fn test_close_time() {
        let candles = parse_klines(SAMPLE).unwrap();
        let c = candles[0];
        assert_eq!(
            c.close_time(Timeframe::OneHour),
            Utc.with_ymd_and_hms(2025, 1, 1, 1, 0, 0).unwrap()
        );
        assert!(c.is_closed(Timeframe::OneHour, c.close_time(Timeframe::OneHour)));
        assert!(!c.is_closed(Timeframe::OneDay, c.close_time(Timeframe::OneHour)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_data_unavailable() {
        let http = reqwest::Client::new();
        let client = BinanceKlinesClient::new(http, "http://127.0.0.1:9", Duration::from_millis(500));
        let err = client
            .fetch_observations("BTCUSDT", Timeframe::OneHour, None, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, PoiError::DataUnavailable(_)));
    }
}
