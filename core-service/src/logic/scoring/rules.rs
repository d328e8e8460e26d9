//! Scoring Policy
//!
//! Weights and the participant contribution table. No scoring logic here.

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::logic::session::RiskLevel;

// ============================================================================
// PARTICIPANT CONTRIBUTIONS
// ============================================================================

pub const CRITICAL_CONTRIBUTION: f64 = 5.0;
pub const HIGH_CONTRIBUTION: f64 = 3.0;
pub const MEDIUM_CONTRIBUTION: f64 = 1.5;
pub const LOW_CONTRIBUTION: f64 = 0.5;

/// Tolerance when checking that weights sum to one
const WEIGHT_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskContributions {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for RiskContributions {
    fn default() -> Self {
        Self {
            low: LOW_CONTRIBUTION,
            medium: MEDIUM_CONTRIBUTION,
            high: HIGH_CONTRIBUTION,
            critical: CRITICAL_CONTRIBUTION,
        }
    }
}

impl RiskContributions {
    pub fn for_level(&self, level: RiskLevel) -> f64 {
        match level {
            RiskLevel::Unknown => 0.0,
            RiskLevel::Low => self.low,
            RiskLevel::Medium => self.medium,
            RiskLevel::High => self.high,
            RiskLevel::Critical => self.critical,
        }
    }
}

// ============================================================================
// CONFIGURABLE RULES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringRules {
    /// Weight of the mean message risk
    pub message_weight: f64,
    /// Weight of the highest participant contribution
    pub participant_weight: f64,
    pub contributions: RiskContributions,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            message_weight: constants::DEFAULT_MESSAGE_WEIGHT,
            participant_weight: constants::DEFAULT_PARTICIPANT_WEIGHT,
            contributions: RiskContributions::default(),
        }
    }
}

impl ScoringRules {
    /// Custom weights; both non-negative and summing to one
    pub fn with_weights(message_weight: f64, participant_weight: f64) -> Result<Self, String> {
        if message_weight < 0.0 || participant_weight < 0.0 {
            return Err(format!(
                "weights must be non-negative (message {}, participant {})",
                message_weight, participant_weight
            ));
        }
        if (message_weight + participant_weight - 1.0).abs() > WEIGHT_EPSILON {
            return Err(format!(
                "weights must sum to 1.0 (got {})",
                message_weight + participant_weight
            ));
        }
        Ok(Self {
            message_weight,
            participant_weight,
            ..Self::default()
        })
    }
}
