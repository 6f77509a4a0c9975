//! Prediction records as stored and served.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Timeframe;
use crate::scoring::EvaluationResult;

/// A user's forecast for N consecutive periods of one pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionSubmission {
    /// Filled from the document key when absent (files written by the bot scripts).
    #[serde(default = "Uuid::nil")]
    pub id: Uuid,
    pub username: String,
    pub stake: f64,
    #[serde(with = "utc_timestamp")]
    pub submission_time: DateTime<Utc>,
    #[serde(with = "utc_timestamp")]
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub pair: Option<String>,
    #[serde(default)]
    pub timeframe: Option<Timeframe>,
    pub predictions: Vec<f64>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub strategies: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub link: Option<String>,
}

impl PredictionSubmission {
    /// Open time of the first candle the window covers: `start_time` rounded up to the
    /// next candle boundary.
    pub fn first_period_start(&self, timeframe: Timeframe) -> DateTime<Utc> {
        timeframe.align_up(self.start_time)
    }

    /// Start of the `index`-th period (zero-based).
    pub fn period_start(&self, index: usize, timeframe: Timeframe) -> DateTime<Utc> {
        self.first_period_start(timeframe) + timeframe.period() * index as i32
    }

    pub fn strategy(&self) -> StrategyNote {
        StrategyNote {
            strategies: self.strategies.clone(),
            code: self.code.clone(),
            link: self.link.clone(),
        }
    }
}

/// Free-text explanation attached to a submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyNote {
    #[serde(default)]
    pub strategies: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
}

impl StrategyNote {
    /// Blank strings count as absent.
    pub fn normalized(self) -> Self {
        fn clean(v: Option<String>) -> Option<String> {
            v.filter(|s| !s.trim().is_empty())
        }
        Self {
            strategies: clean(self.strategies),
            code: clean(self.code),
            link: clean(self.link),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_none() && self.code.is_none() && self.link.is_none()
    }
}

/// Unvalidated submission input.
#[derive(Debug, Clone, Default)]
pub struct NewSubmission {
    pub username: String,
    pub stake: f64,
    pub start_time: String,
    pub predictions: Vec<f64>,
    pub pair: Option<String>,
    pub timeframe: Option<Timeframe>,
    pub strategy: StrategyNote,
}

impl NewSubmission {
    pub fn new(
        username: impl Into<String>,
        stake: f64,
        start_time: impl Into<String>,
        predictions: Vec<f64>,
    ) -> Self {
        Self {
            username: username.into(),
            stake,
            start_time: start_time.into(),
            predictions,
            ..Default::default()
        }
    }

    pub fn with_pair(mut self, pair: impl Into<String>) -> Self {
        self.pair = Some(pair.into());
        self
    }

    pub fn with_timeframe(mut self, timeframe: Timeframe) -> Self {
        self.timeframe = Some(timeframe);
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyNote) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Stored unit: the submission plus its cached evaluation once finalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    #[serde(flatten)]
    pub submission: PredictionSubmission,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationResult>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "utc_timestamp::option"
    )]
    pub finalized_at: Option<DateTime<Utc>>,
}

impl PredictionRecord {
    pub fn new(submission: PredictionSubmission) -> Self {
        Self {
            submission,
            evaluation: None,
            finalized_at: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.submission.id
    }

    pub fn is_finalized(&self) -> bool {
        self.evaluation.is_some()
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let v = Option::<String>::deserialize(deserializer)?;
    Ok(v.filter(|s| !s.trim().is_empty()))
}

/// RFC 3339 on write; any form `parse_utc_timestamp` accepts on read.
pub(crate) mod utc_timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::models::parse_utc_timestamp;

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse_utc_timestamp(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {:?}", raw)))
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            ts: &Option<DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => super::serialize(ts, s),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(d)? {
                Some(raw) => parse_utc_timestamp(&raw).map(Some).ok_or_else(|| {
                    serde::de::Error::custom(format!("invalid timestamp: {:?}", raw))
                }),
                None => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_submission() -> PredictionSubmission {
        PredictionSubmission {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            stake: 10.0,
            submission_time: Utc.with_ymd_and_hms(2025, 1, 1, 9, 30, 0).unwrap(),
            start_time: Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap(),
            pair: Some("BTCUSDT".to_string()),
            timeframe: Some(Timeframe::OneHour),
            predictions: vec![100.0; 7],
            strategies: Some("mean reversion".to_string()),
            code: None,
            link: None,
        }
    }

    #[test]
    fn test_record_serialization_layout() {
        let record = PredictionRecord::new(sample_submission());
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["username"], "alice");
        assert_eq!(json["start_time"], "2025-01-01T10:00:00Z");
        assert_eq!(json["timeframe"], "1h");
        assert!(json.get("evaluation").is_none());
        assert!(json.get("finalized_at").is_none());

        let back: PredictionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_legacy_bot_record_parses() {
        let legacy = r#"{
            "username": "BotAlpha",
            "stake": 10,
            "submission_time": "2025-01-01T09:30:12.123456",
            "start_time": "2025-01-01T09:30:00",
            "predictions": [30000, 30010, 30020, 30030, 30040, 30050, 30060],
            "strategies": "Bot strategy: Random forecast",
            "code": "",
            "link": ""
        }"#;

        let record: PredictionRecord = serde_json::from_str(legacy).unwrap();
        let sub = &record.submission;
        assert!(sub.id.is_nil());
        assert_eq!(sub.stake, 10.0);
        assert_eq!(sub.start_time, Utc.with_ymd_and_hms(2025, 1, 1, 9, 30, 0).unwrap());
        assert_eq!(sub.predictions[6], 30060.0);
        assert_eq!(sub.code, None);
        assert_eq!(sub.pair, None);
        assert!(!record.is_finalized());
    }

    #[test]
    fn test_period_start() {
        let sub = sample_submission();
        assert_eq!(
            sub.period_start(3, Timeframe::OneHour),
            Utc.with_ymd_and_hms(2025, 1, 1, 13, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_period_start_rounds_up_to_candle_boundary() {
        let mut sub = sample_submission();
        assert_eq!(
            sub.period_start(0, Timeframe::FourHours),
            Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
        );
        assert_eq!(
            sub.period_start(3, Timeframe::FourHours),
            Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap()
        );

        sub.start_time = Utc.with_ymd_and_hms(2025, 1, 1, 0, 30, 0).unwrap();
        assert_eq!(
            sub.first_period_start(Timeframe::OneHour),
            Utc.with_ymd_and_hms(2025, 1, 1, 1, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_strategy_note_normalized() {
        let note = StrategyNote {
            strategies: Some("  ".to_string()),
            code: Some("print(1)".to_string()),
            link: None,
        }
        .normalized();

        assert_eq!(note.strategies, None);
        assert_eq!(note.code.as_deref(), Some("print(1)"));
        assert!(!note.is_empty());
        assert!(StrategyNote::default().is_empty());
    }
}
