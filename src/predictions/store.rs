//! Prediction Record Store
//!
//! Holds every submission in memory, keyed by id, and writes the whole set through the
//! injected [`SubmissionPersistence`] on each mutation. A mutation only becomes visible
//! once its write succeeds; failed writes are rolled back.

use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::models::{NewSubmission, PredictionRecord, PredictionSubmission, StrategyNote};
use super::persistence::{MemoryPersistence, SubmissionPersistence};
use crate::error::{PoiError, PoiResult};
use crate::models::{normalize_pair, parse_utc_timestamp, Config, Horizon, Timeframe};
use crate::scoring::EvaluationResult;

/// Deployment-wide submission rules.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub horizon: Horizon,
    pub default_pair: String,
    pub default_timeframe: Timeframe,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            horizon: Horizon::Seven,
            default_pair: "BTCUSDT".to_string(),
            default_timeframe: Timeframe::OneHour,
        }
    }
}

impl From<&Config> for StoreSettings {
    fn from(config: &Config) -> Self {
        Self {
            horizon: config.horizon,
            default_pair: config.pair.clone(),
            default_timeframe: config.timeframe,
        }
    }
}

#[derive(Default)]
struct StoreState {
    records: HashMap<Uuid, PredictionRecord>,
    /// Insertion order of `records`.
    order: Vec<Uuid>,
    /// username -> most recently created id.
    latest_by_user: HashMap<String, Uuid>,
}

impl StoreState {
    fn snapshot(&self) -> Vec<PredictionRecord> {
        self.order
            .iter()
            .filter_map(|id| self.records.get(id).cloned())
            .collect()
    }

    fn insert(&mut self, record: PredictionRecord) -> Option<Uuid> {
        let id = record.id();
        let username = record.submission.username.clone();
        self.order.push(id);
        self.records.insert(id, record);
        self.latest_by_user.insert(username, id)
    }

    fn remove_last(&mut self, id: Uuid, previous_latest: Option<Uuid>) {
        if let Some(record) = self.records.remove(&id) {
            let username = record.submission.username;
            match previous_latest {
                Some(prev) => {
                    self.latest_by_user.insert(username, prev);
                }
                None => {
                    self.latest_by_user.remove(&username);
                }
            }
        }
        if self.order.last() == Some(&id) {
            self.order.pop();
        }
    }
}

/// Process-wide prediction store. Construct once and share behind an `Arc`.
pub struct PredictionStore {
    state: RwLock<StoreState>,
    persistence: Arc<dyn SubmissionPersistence>,
    settings: StoreSettings,
}

impl PredictionStore {
    /// Open the store, loading whatever the persistence layer already holds.
    pub fn open(
        settings: StoreSettings,
        persistence: Arc<dyn SubmissionPersistence>,
    ) -> PoiResult<Self> {
        let loaded = persistence.load().map_err(PoiError::persistence)?;

        let mut state = StoreState::default();
        for mut record in loaded {
            let trimmed = record.submission.username.trim();
            if trimmed.len() != record.submission.username.len() {
                record.submission.username = trimmed.to_string();
            }
            if record.submission.pair.is_none() {
                record.submission.pair = Some(settings.default_pair.clone());
            }
            if record.submission.timeframe.is_none() {
                record.submission.timeframe = Some(settings.default_timeframe);
            }
            if state.records.contains_key(&record.id()) {
                warn!(id = %record.id(), "duplicate prediction id on load, keeping first");
                continue;
            }
            state.insert(record);
        }

        info!(
            records = state.order.len(),
            horizon = settings.horizon.len(),
            "📦 Prediction store opened"
        );

        Ok(Self {
            state: RwLock::new(state),
            persistence,
            settings,
        })
    }

    /// Store backed only by memory.
    pub fn in_memory(settings: StoreSettings) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            persistence: Arc::new(MemoryPersistence::new()),
            settings,
        }
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub fn horizon(&self) -> Horizon {
        self.settings.horizon
    }

    /// Create a submission from the four required fields.
    pub fn create(
        &self,
        username: &str,
        stake: f64,
        start_time: &str,
        predicted_values: Vec<f64>,
    ) -> PoiResult<Uuid> {
        self.submit(NewSubmission::new(username, stake, start_time, predicted_values))
    }

    /// Validate, store and persist a submission. Nothing is stored if validation or the
    /// write fails.
    pub fn submit(&self, draft: NewSubmission) -> PoiResult<Uuid> {
        let submission = self.validate(draft)?;
        let id = submission.id;
        let username = submission.username.clone();

        let mut state = self.state.write();
        let previous_latest = state.insert(PredictionRecord::new(submission));

        if let Err(e) = self.persistence.save(&state.snapshot()) {
            state.remove_last(id, previous_latest);
            warn!(error = %e, username = %username, "failed to persist submission, rolled back");
            return Err(PoiError::persistence(e));
        }

        info!(id = %id, username = %username, "✅ Prediction submitted");
        Ok(id)
    }

    fn validate(&self, draft: NewSubmission) -> PoiResult<PredictionSubmission> {
        let username = draft.username.trim();
        if username.is_empty() {
            return Err(PoiError::validation("username is required"));
        }

        if !draft.stake.is_finite() || draft.stake <= 0.0 {
            return Err(PoiError::validation(format!(
                "stake must be a positive number, got {}",
                draft.stake
            )));
        }

        let expected = self.settings.horizon.len();
        if draft.predictions.len() != expected {
            return Err(PoiError::validation(format!(
                "expected exactly {} predictions, got {}",
                expected,
                draft.predictions.len()
            )));
        }
        if let Some(i) = draft.predictions.iter().position(|p| !p.is_finite()) {
            return Err(PoiError::validation(format!(
                "prediction for period {} is not a finite number",
                i + 1
            )));
        }

        let start_time = parse_utc_timestamp(&draft.start_time).ok_or_else(|| {
            PoiError::validation(format!(
                "start_time must be an ISO-8601 UTC timestamp, got {:?}",
                draft.start_time
            ))
        })?;

        let pair = match draft.pair {
            Some(raw) => normalize_pair(&raw)
                .ok_or_else(|| PoiError::validation(format!("invalid pair {:?}", raw)))?,
            None => self.settings.default_pair.clone(),
        };

        let strategy = draft.strategy.normalized();

        Ok(PredictionSubmission {
            id: Uuid::new_v4(),
            username: username.to_string(),
            stake: draft.stake,
            submission_time: Utc::now(),
            start_time,
            pair: Some(pair),
            timeframe: Some(draft.timeframe.unwrap_or(self.settings.default_timeframe)),
            predictions: draft.predictions,
            strategies: strategy.strategies,
            code: strategy.code,
            link: strategy.link,
        })
    }

    /// Replace the strategy metadata of a submission (last write wins).
    pub fn attach_strategy(&self, id: Uuid, note: StrategyNote) -> PoiResult<()> {
        let note = note.normalized();
        let mut state = self.state.write();

        let record = state.records.get_mut(&id).ok_or(PoiError::NotFound(id))?;
        let previous = record.submission.strategy();
        record.submission.strategies = note.strategies;
        record.submission.code = note.code;
        record.submission.link = note.link;

        if let Err(e) = self.persistence.save(&state.snapshot()) {
            if let Some(record) = state.records.get_mut(&id) {
                record.submission.strategies = previous.strategies;
                record.submission.code = previous.code;
                record.submission.link = previous.link;
            }
            warn!(id = %id, error = %e, "failed to persist strategy, rolled back");
            return Err(PoiError::persistence(e));
        }

        info!(id = %id, "📝 Strategy attached");
        Ok(())
    }

    pub fn get(&self, id: Uuid) -> PoiResult<PredictionSubmission> {
        self.record(id).map(|r| r.submission)
    }

    /// Submission together with its cached evaluation, if finalized.
    pub fn record(&self, id: Uuid) -> PoiResult<PredictionRecord> {
        self.state
            .read()
            .records
            .get(&id)
            .cloned()
            .ok_or(PoiError::NotFound(id))
    }

    pub fn evaluation(&self, id: Uuid) -> PoiResult<Option<EvaluationResult>> {
        self.record(id).map(|r| r.evaluation)
    }

    /// Every submission in insertion order.
    pub fn list_all(&self) -> Vec<PredictionSubmission> {
        self.records().into_iter().map(|r| r.submission).collect()
    }

    pub fn records(&self) -> Vec<PredictionRecord> {
        self.state.read().snapshot()
    }

    /// Submissions still waiting for observations, in insertion order.
    pub fn pending(&self) -> Vec<PredictionSubmission> {
        self.records()
            .into_iter()
            .filter(|r| !r.is_finalized())
            .map(|r| r.submission)
            .collect()
    }

    /// Most recent submission by `username`.
    ///
    /// Two submissions from the same user racing each other can leave either one as
    /// "latest"; callers that need a specific submission should use its id.
    pub fn find_latest_by_user(&self, username: &str) -> Option<Uuid> {
        self.state
            .read()
            .latest_by_user
            .get(username.trim())
            .copied()
    }

    pub fn len(&self) -> usize {
        self.state.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cache the evaluation of a submission. The first result wins: if one is already
    /// cached it is returned unchanged and `result` is dropped.
    ///
    /// A failed write keeps the in-memory result; recomputing it later yields the same value.
    pub fn finalize(&self, id: Uuid, result: EvaluationResult) -> PoiResult<EvaluationResult> {
        let mut state = self.state.write();
        let record = state.records.get_mut(&id).ok_or(PoiError::NotFound(id))?;

        if let Some(existing) = &record.evaluation {
            return Ok(existing.clone());
        }

        record.evaluation = Some(result.clone());
        record.finalized_at = Some(Utc::now());
        let username = record.submission.username.clone();

        if let Err(e) = self.persistence.save(&state.snapshot()) {
            warn!(id = %id, error = %e, "failed to persist evaluation, keeping in-memory result");
        }

        info!(
            id = %id,
            username = %username,
            score = result.score,
            reward = result.reward,
            "🏁 Prediction finalized"
        );
        Ok(result)
    }
}
