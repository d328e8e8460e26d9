//! Risk Scoring Engine
//!
//! Pure combination of message analyses and participant levels into a
//! bounded session score. Deterministic; no I/O.

use super::rules::ScoringRules;
use super::types::ScoreBreakdown;
use crate::constants::{MAX_RISK_SCORE, MIN_RISK_SCORE};
use crate::logic::session::RiskLevel;

#[derive(Debug, Clone, Default)]
pub struct RiskScoringEngine {
    rules: ScoringRules,
}

impl RiskScoringEngine {
    pub fn new(rules: ScoringRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &ScoringRules {
        &self.rules
    }

    /// Score a session from its message analysis scores and participant levels
    pub fn score(&self, message_scores: &[f64], participant_levels: &[RiskLevel]) -> ScoreBreakdown {
        let avg_message_risk = if message_scores.is_empty() {
            0.0
        } else {
            message_scores.iter().sum::<f64>() / message_scores.len() as f64
        };

        let participant_risk = participant_levels
            .iter()
            .map(|level| self.rules.contributions.for_level(*level))
            .fold(0.0, f64::max);

        let raw = avg_message_risk * self.rules.message_weight + participant_risk * self.rules.participant_weight;

        ScoreBreakdown {
            avg_message_risk,
            participant_risk,
            message_weight: self.rules.message_weight,
            participant_weight: self.rules.participant_weight,
            messages_scored: message_scores.len(),
            score: bound(raw),
        }
    }
}

/// Clamp to [0, 10], then round to two decimals
pub fn bound(raw: f64) -> f64 {
    if raw.is_nan() {
        return MIN_RISK_SCORE;
    }
    let clamped = raw.clamp(MIN_RISK_SCORE, MAX_RISK_SCORE);
    (clamped * 100.0).round() / 100.0
}
