//! Tiered reward multipliers.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardTier {
    Platinum,
    Gold,
    Silver,
    Bronze,
}

/// Highest threshold first; the first tier whose minimum the score meets wins.
pub const REWARD_TIERS: [RewardTier; 4] = [
    RewardTier::Platinum,
    RewardTier::Gold,
    RewardTier::Silver,
    RewardTier::Bronze,
];

impl RewardTier {
    pub fn min_score(&self) -> f64 {
        match self {
            RewardTier::Platinum => 98.0,
            RewardTier::Gold => 95.0,
            RewardTier::Silver => 90.0,
            RewardTier::Bronze => 85.0,
        }
    }

    pub fn multiplier(&self) -> f64 {
        match self {
            RewardTier::Platinum => 4.0,
            RewardTier::Gold => 2.5,
            RewardTier::Silver => 1.5,
            RewardTier::Bronze => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RewardTier::Platinum => "platinum",
            RewardTier::Gold => "gold",
            RewardTier::Silver => "silver",
            RewardTier::Bronze => "bronze",
        }
    }

    pub fn for_score(score: f64) -> Option<Self> {
        REWARD_TIERS
            .iter()
            .copied()
            .find(|tier| score >= tier.min_score())
    }
}

/// Round to cents, half to even, deciding ties on the exact binary value of `value`.
///
/// `value * 100.0` can land on an exact `.5` even when `value` itself sits just off the
/// midpoint (7.77 * 1.5 is slightly below 11.655); the fused residual recovers which side.
fn round_cents(value: f64) -> f64 {
    let scaled = value * 100.0;
    let residual = value.mul_add(100.0, -scaled);
    let floor = scaled.floor();

    let rounded = if scaled - floor == 0.5 {
        if residual > 0.0 {
            floor + 1.0
        } else if residual < 0.0 {
            floor
        } else {
            scaled.round_ties_even()
        }
    } else {
        scaled.round()
    };
    rounded / 100.0
}

/// Reward owed for `score` on `stake`; zero below the Bronze threshold.
pub fn compute_reward(score: f64, stake: f64) -> f64 {
    match RewardTier::for_score(score) {
        Some(tier) => round_cents(stake * tier.multiplier()),
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_thresholds() {
        assert_eq!(RewardTier::for_score(100.0), Some(RewardTier::Platinum));
        assert_eq!(RewardTier::for_score(98.0), Some(RewardTier::Platinum));
        assert_eq!(RewardTier::for_score(97.99), Some(RewardTier::Gold));
        assert_eq!(RewardTier::for_score(95.0), Some(RewardTier::Gold));
        assert_eq!(RewardTier::for_score(90.0), Some(RewardTier::Silver));
        assert_eq!(RewardTier::for_score(85.0), Some(RewardTier::Bronze));
        assert_eq!(RewardTier::for_score(84.999), None);
        assert_eq!(RewardTier::for_score(0.0), None);
    }

    #[test]
    fn test_reward_amounts() {
        assert_eq!(compute_reward(100.0, 10.0), 40.0);
        assert_eq!(compute_reward(96.0, 10.0), 25.0);
        assert_eq!(compute_reward(91.0, 10.0), 15.0);
        assert_eq!(compute_reward(85.0, 10.0), 10.0);
        assert_eq!(compute_reward(84.9, 10.0), 0.0);
    }

    #[test]
    fn test_bronze_boundary_returns_stake() {
        for stake in [5.0, 12.5, 1000.0] {
            assert_eq!(compute_reward(85.0, stake), stake);
        }
    }

    #[test]
    fn test_reward_rounded_to_cents() {
        assert_eq!(compute_reward(86.0, 12.3456), 12.35);
        assert_eq!(compute_reward(91.0, 7.77), 11.65);
    }

    #[test]
    fn test_reward_cent_ties_round_to_even() {
        assert_eq!(compute_reward(85.0, 0.125), 0.12);
        assert_eq!(compute_reward(85.0, 0.375), 0.38);
        assert_eq!(compute_reward(85.0, 2.675), 2.67);
        assert_eq!(compute_reward(91.0, 0.25), 0.38);
    }

    #[test]
    fn test_reward_monotonic_in_score() {
        let stake = 25.0;
        let mut previous = compute_reward(0.0, stake);
        let mut score = 0.0;
        while score <= 100.0 {
            let reward = compute_reward(score, stake);
            assert!(reward >= previous, "reward dropped at score {}", score);
            previous = reward;
            score += 0.25;
        }
    }

    #[test]
    fn test_tier_serialization() {
        let json = serde_json::to_string(&RewardTier::Platinum).unwrap();
        assert_eq!(json, r#""platinum""#);
        assert_eq!(RewardTier::Silver.as_str(), "silver");
    }
}
