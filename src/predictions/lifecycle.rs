//! Pending -> finalized transition.
//!
//! Nothing runs in the background. Each read polls: fetch candles for the submission's
//! window, align them by period index, and settle once all N periods have closed. The
//! first settled result is cached by the store and never recomputed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::models::{PredictionRecord, PredictionSubmission};
use super::store::PredictionStore;
use crate::error::{PoiError, PoiResult};
use crate::models::Timeframe;
use crate::scoring::{settle, EvaluationResult};
use crate::scrapers::{Candle, MarketDataSource};

/// Where a submission stands after a poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PredictionStatus {
    Pending { observed: usize, expected: usize },
    Finalized { result: EvaluationResult },
}

impl PredictionStatus {
    pub fn is_finalized(&self) -> bool {
        matches!(self, PredictionStatus::Finalized { .. })
    }

    pub fn result(&self) -> Option<&EvaluationResult> {
        match self {
            PredictionStatus::Finalized { result } => Some(result),
            PredictionStatus::Pending { .. } => None,
        }
    }
}

/// Per-period view; `actual` is `None` while the period has not closed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodView {
    pub period: usize,
    pub period_start: DateTime<Utc>,
    pub predicted: f64,
    pub actual: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PollOutcome {
    pub submission: PredictionSubmission,
    pub status: PredictionStatus,
    pub periods: Vec<PeriodView>,
    /// Market data could not be fetched this poll; shown as "temporarily unavailable".
    pub data_unavailable: bool,
}

/// First `n` closed candles opening at or after the first candle boundary at or after
/// `start`, in ascending time order.
///
/// Alignment is by index: the i-th returned candle is the actual for period i, which starts
/// at `timeframe.align_up(start) + i * period`.
pub fn align_observations(
    start: DateTime<Utc>,
    timeframe: Timeframe,
    candles: &[Candle],
    n: usize,
    now: DateTime<Utc>,
) -> Vec<Candle> {
    let first = timeframe.align_up(start);
    let mut eligible: Vec<Candle> = candles
        .iter()
        .filter(|c| c.open_time >= first && c.is_closed(timeframe, now))
        .copied()
        .collect();
    eligible.sort_by_key(|c| c.open_time);
    eligible.dedup_by_key(|c| c.open_time);
    eligible.truncate(n);
    eligible
}

/// Drives settlement of pending submissions against a market data source.
pub struct PredictionPoller {
    store: Arc<PredictionStore>,
    market: Arc<dyn MarketDataSource>,
    fetch_limit: usize,
}

impl PredictionPoller {
    pub fn new(
        store: Arc<PredictionStore>,
        market: Arc<dyn MarketDataSource>,
        fetch_limit: usize,
    ) -> Self {
        Self {
            store,
            market,
            fetch_limit: fetch_limit.max(1),
        }
    }

    pub fn store(&self) -> &Arc<PredictionStore> {
        &self.store
    }

    pub async fn poll(&self, id: Uuid) -> PoiResult<PollOutcome> {
        self.poll_at(id, Utc::now()).await
    }

    /// Poll one submission as of `now`.
    pub async fn poll_at(&self, id: Uuid, now: DateTime<Utc>) -> PoiResult<PollOutcome> {
        let record = self.store.record(id)?;
        if record.is_finalized() {
            return Ok(self.outcome(record, &[], false));
        }

        let (pair, timeframe) = self.market_key(&record.submission);
        let fetched = self
            .market
            .fetch_observations(
                &pair,
                timeframe,
                Some(record.submission.first_period_start(timeframe)),
                self.fetch_limit,
            )
            .await;

        Ok(self.advance(record, fetched.as_deref().map_err(Clone::clone), now))
    }

    pub async fn poll_all(&self) -> Vec<PollOutcome> {
        self.poll_all_at(Utc::now()).await
    }

    /// Poll every submission, one fetch per (pair, timeframe) that has pending work.
    pub async fn poll_all_at(&self, now: DateTime<Utc>) -> Vec<PollOutcome> {
        let records = self.store.records();

        let mut earliest: HashMap<(String, Timeframe), DateTime<Utc>> = HashMap::new();
        for record in records.iter().filter(|r| !r.is_finalized()) {
            let key = self.market_key(&record.submission);
            let start = record.submission.first_period_start(key.1);
            earliest
                .entry(key)
                .and_modify(|t| *t = (*t).min(start))
                .or_insert(start);
        }

        let mut fetched: HashMap<(String, Timeframe), PoiResult<Vec<Candle>>> = HashMap::new();
        for ((pair, timeframe), since) in earliest {
            let result = self
                .market
                .fetch_observations(&pair, timeframe, Some(since), self.fetch_limit)
                .await;
            fetched.insert((pair, timeframe), result);
        }

        records
            .into_iter()
            .map(|record| {
                if record.is_finalized() {
                    return self.outcome(record, &[], false);
                }
                let key = self.market_key(&record.submission);
                let candles = match fetched.get(&key) {
                    Some(Ok(c)) => Ok(c.as_slice()),
                    Some(Err(e)) => Err(e.clone()),
                    None => Ok(&[][..]),
                };
                self.advance(record, candles, now)
            })
            .collect()
    }

    fn market_key(&self, submission: &PredictionSubmission) -> (String, Timeframe) {
        let settings = self.store.settings();
        (
            submission
                .pair
                .clone()
                .unwrap_or_else(|| settings.default_pair.clone()),
            submission.timeframe.unwrap_or(settings.default_timeframe),
        )
    }

    /// Apply one fetch result to a pending record, finalizing it if the window is complete.
    fn advance(
        &self,
        record: PredictionRecord,
        fetched: Result<&[Candle], PoiError>,
        now: DateTime<Utc>,
    ) -> PollOutcome {
        let id = record.id();
        let candles = match fetched {
            Ok(candles) => candles,
            Err(e) => {
                debug!(id = %id, error = %e, "market data unavailable, staying pending");
                return self.outcome(record, &[], true);
            }
        };

        let (_, timeframe) = self.market_key(&record.submission);
        let expected = record.submission.predictions.len();
        let aligned = align_observations(
            record.submission.start_time,
            timeframe,
            candles,
            expected,
            now,
        );

        if aligned.len() < expected {
            return self.outcome(record, &aligned, false);
        }

        let actual: Vec<f64> = aligned.iter().map(|c| c.close).collect();
        let settled = settle(&record.submission.predictions, &actual, record.submission.stake)
            .and_then(|result| self.store.finalize(id, result));

        match settled {
            Ok(_) => match self.store.record(id) {
                Ok(finalized) => self.outcome(finalized, &aligned, false),
                Err(_) => self.outcome(record, &aligned, false),
            },
            Err(e) => {
                warn!(id = %id, error = %e, "could not settle prediction, staying pending");
                self.outcome(record, &aligned, false)
            }
        }
    }

    fn outcome(
        &self,
        record: PredictionRecord,
        aligned: &[Candle],
        data_unavailable: bool,
    ) -> PollOutcome {
        let (_, timeframe) = self.market_key(&record.submission);
        let expected = record.submission.predictions.len();

        let actuals: Vec<Option<f64>> = match &record.evaluation {
            Some(result) => result.actual_values.iter().copied().map(Some).collect(),
            None => (0..expected)
                .map(|i| aligned.get(i).map(|c| c.close))
                .collect(),
        };

        let periods = record
            .submission
            .predictions
            .iter()
            .enumerate()
            .map(|(i, &predicted)| PeriodView {
                period: i + 1,
                period_start: record.submission.period_start(i, timeframe),
                predicted,
                actual: actuals.get(i).copied().flatten(),
            })
            .collect();

        let status = match record.evaluation {
            Some(result) => PredictionStatus::Finalized { result },
            None => PredictionStatus::Pending {
                observed: aligned.len().min(expected),
                expected,
            },
        };

        PollOutcome {
            submission: record.submission,
            status,
            periods,
            data_unavailable,
        }
    }
}
