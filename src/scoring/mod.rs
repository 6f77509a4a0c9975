//! Scoring Engine
//!
//! Converts a completed window of (predicted, actual) pairs into a bounded insight
//! score and a tiered reward. Everything here is pure.

pub mod engine;
pub mod reward;

pub use engine::{evaluate, recency_weights, Scorecard};
pub use reward::{compute_reward, RewardTier};

use serde::{Deserialize, Serialize};

use crate::error::PoiResult;

/// Outcome of a finalized prediction window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub actual_values: Vec<f64>,
    pub per_period_errors: Vec<f64>,
    pub weighted_error: f64,
    pub score: f64,
    pub reward: f64,
    #[serde(default)]
    pub tier: Option<RewardTier>,
}

/// Score the window and price the reward on `stake`.
pub fn settle(predicted: &[f64], actual: &[f64], stake: f64) -> PoiResult<EvaluationResult> {
    let card = evaluate(predicted, actual)?;
    Ok(EvaluationResult {
        actual_values: actual.to_vec(),
        reward: compute_reward(card.score, stake),
        tier: RewardTier::for_score(card.score),
        per_period_errors: card.per_period_errors,
        weighted_error: card.weighted_error,
        score: card.score,
    })
}
