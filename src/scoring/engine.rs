//! Forecast error aggregation.
//!
//! Pure functions only: identical inputs always produce bit-identical output.

use serde::{Deserialize, Serialize};

use crate::error::{PoiError, PoiResult};

/// Multiplier applied to the weighted percentage error before subtracting from 100.
pub const ERROR_PENALTY: f64 = 1.5;
pub const MAX_SCORE: f64 = 100.0;
pub const MIN_SCORE: f64 = 0.0;
/// Exponent reached by the last period's raw weight (`exp(-2)` relative to the first).
pub const DECAY_SPAN: f64 = 2.0;

// Weighted error is snapped to 1e-9 so summation noise never crosses a tier boundary.
const ERROR_SCALE: f64 = 1e9;

/// Error breakdown for one completed window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scorecard {
    pub per_period_errors: Vec<f64>,
    pub weighted_error: f64,
    pub score: f64,
}

/// Normalized `exp(linspace(0, -DECAY_SPAN, n))`: earliest period heaviest, sums to 1.
pub fn recency_weights(n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![1.0];
    }

    let step = DECAY_SPAN / (n - 1) as f64;
    let raw: Vec<f64> = (0..n).map(|i| (-(i as f64) * step).exp()).collect();
    let total: f64 = raw.iter().sum();
    raw.into_iter().map(|w| w / total).collect()
}

/// Absolute percentage error of one period.
#[inline]
pub fn period_error(predicted: f64, actual: f64) -> f64 {
    (predicted - actual).abs() * 100.0 / actual
}

pub fn score_from_error(weighted_error: f64) -> f64 {
    (MAX_SCORE - weighted_error * ERROR_PENALTY).clamp(MIN_SCORE, MAX_SCORE)
}

/// Score a completed window of predictions against realized values.
pub fn evaluate(predicted: &[f64], actual: &[f64]) -> PoiResult<Scorecard> {
    if predicted.is_empty() {
        return Err(PoiError::invalid_input("no periods to score"));
    }
    if predicted.len() != actual.len() {
        return Err(PoiError::invalid_input(format!(
            "{} predictions but {} actual values",
            predicted.len(),
            actual.len()
        )));
    }
    if let Some(i) = predicted.iter().position(|p| !p.is_finite()) {
        return Err(PoiError::invalid_input(format!(
            "prediction for period {} is not finite",
            i + 1
        )));
    }
    if let Some(i) = actual.iter().position(|a| !a.is_finite() || *a <= 0.0) {
        return Err(PoiError::invalid_input(format!(
            "actual value for period {} must be positive, got {}",
            i + 1,
            actual[i]
        )));
    }

    let per_period_errors: Vec<f64> = predicted
        .iter()
        .zip(actual)
        .map(|(&p, &a)| period_error(p, a))
        .collect();

    let weights = recency_weights(per_period_errors.len());
    let raw_weighted: f64 = per_period_errors
        .iter()
        .zip(&weights)
        .map(|(e, w)| e * w)
        .sum();
    let weighted_error = (raw_weighted * ERROR_SCALE).round() / ERROR_SCALE;

    Ok(Scorecard {
        score: score_from_error(weighted_error),
        per_period_errors,
        weighted_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_sum_to_one() {
        for n in 1..=30 {
            let weights = recency_weights(n);
            assert_eq!(weights.len(), n);
            let total: f64 = weights.iter().sum();
            assert!((total - 1.0).abs() < 1e-12, "n={} total={}", n, total);
        }
        assert!(recency_weights(0).is_empty());
    }

    #[test]
    fn test_weights_decay_towards_later_periods() {
        let weights = recency_weights(7);
        for pair in weights.windows(2) {
            assert!(pair[0] > pair[1]);
        }

        let ratio = weights[6] / weights[0];
        assert!((ratio - (-2.0f64).exp()).abs() < 1e-12);
        assert!((weights[0] - 0.313909).abs() < 1e-6);
    }

    #[test]
    fn test_perfect_forecast_scores_100() {
        let values = [100.0; 7];
        let card = evaluate(&values, &values).unwrap();

        assert!(card.per_period_errors.iter().all(|&e| e == 0.0));
        assert_eq!(card.weighted_error, 0.0);
        assert_eq!(card.score, 100.0);
    }

    #[test]
    fn test_uniform_ten_percent_error_scores_85() {
        let card = evaluate(&[110.0; 7], &[100.0; 7]).unwrap();
        assert!(card.per_period_errors.iter().all(|&e| e == 10.0));
        assert_eq!(card.weighted_error, 10.0);
        assert_eq!(card.score, 85.0);
    }

    #[test]
    fn test_fourteen_period_boundary_is_exact() {
        // Raw summation over 14 weights lands a hair above 10.0.
        let card = evaluate(&[90.0; 14], &[100.0; 14]).unwrap();
        assert_eq!(card.weighted_error, 10.0);
        assert_eq!(card.score, 85.0);
    }

    #[test]
    fn test_early_periods_dominate() {
        let actual = [100.0; 7];
        let mut early_miss = [100.0; 7];
        early_miss[0] = 120.0;
        let mut late_miss = [100.0; 7];
        late_miss[6] = 120.0;

        let early = evaluate(&early_miss, &actual).unwrap();
        let late = evaluate(&late_miss, &actual).unwrap();
        assert!(early.score < late.score);
    }

    #[test]
    fn test_mixed_errors() {
        let predicted = [101.0, 102.0, 99.0, 100.0, 105.0, 95.0, 100.0];
        let card = evaluate(&predicted, &[100.0; 7]).unwrap();

        assert_eq!(card.per_period_errors, vec![1.0, 2.0, 1.0, 0.0, 5.0, 5.0, 0.0]);
        assert!((card.weighted_error - 1.6351032).abs() < 1e-6);
        assert!((card.score - 97.5473452).abs() < 1e-6);
    }

    #[test]
    fn test_score_clamped_for_wild_forecasts() {
        let card = evaluate(&[1000.0; 7], &[100.0; 7]).unwrap();
        assert_eq!(card.weighted_error, 900.0);
        assert_eq!(card.score, 0.0);

        assert_eq!(score_from_error(-5.0), 100.0);
    }

    #[test]
    fn test_evaluate_is_deterministic() {
        let predicted = [30_100.0, 30_250.5, 29_980.0, 30_400.0, 30_010.0, 29_500.0, 31_000.0];
        let actual = [30_000.0, 30_200.0, 30_050.0, 30_300.0, 30_100.0, 29_900.0, 30_500.0];

        let a = evaluate(&predicted, &actual).unwrap();
        let b = evaluate(&predicted, &actual).unwrap();
        assert_eq!(a.score.to_bits(), b.score.to_bits());
        assert_eq!(a.weighted_error.to_bits(), b.weighted_error.to_bits());
    }

    #[test]
    fn test_rejects_non_positive_actuals() {
        let err = evaluate(&[1.0, 2.0], &[1.0, 0.0]).unwrap_err();
        assert!(matches!(err, PoiError::InvalidInput(_)));

        let err = evaluate(&[1.0], &[-3.0]).unwrap_err();
        assert!(matches!(err, PoiError::InvalidInput(_)));
    }

    #[test]
    fn test_rejects_shape_mismatch() {
        assert!(matches!(
            evaluate(&[1.0, 2.0], &[1.0]),
            Err(PoiError::InvalidInput(_))
        ));
        assert!(matches!(evaluate(&[], &[]), Err(PoiError::InvalidInput(_))));
        assert!(matches!(
            evaluate(&[f64::NAN], &[1.0]),
            Err(PoiError::InvalidInput(_))
        ));
    }
}
