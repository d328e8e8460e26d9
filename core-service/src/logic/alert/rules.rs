//! Alert Policy
//!
//! Severity bands, alert type fallbacks, and the channel/priority table.
//! No state machine here.

use serde::{Deserialize, Serialize};

use super::types::{AlertType, Severity};
use crate::constants;
use crate::logic::notify::{NotificationChannel, NotificationPriority};
use crate::logic::scoring::AnalysisType;

// ============================================================================
// SEVERITY BANDS
// ============================================================================

/// Inclusive lower edges. Scores below `medium` never open an alert.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityBands {
    pub emergency: f64,
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
}

impl Default for SeverityBands {
    fn default() -> Self {
        Self {
            emergency: constants::DEFAULT_EMERGENCY_BAND,
            critical: constants::DEFAULT_CRITICAL_BAND,
            high: constants::DEFAULT_HIGH_BAND,
            medium: constants::DEFAULT_MEDIUM_BAND,
        }
    }
}

impl SeverityBands {
    pub fn band(&self, score: f64) -> Option<Severity> {
        if score >= self.emergency {
            Some(Severity::Emergency)
        } else if score >= self.critical {
            Some(Severity::Critical)
        } else if score >= self.high {
            Some(Severity::High)
        } else if score >= self.medium {
            Some(Severity::Medium)
        } else {
            None
        }
    }

    /// Edges must ascend strictly inside the score range
    pub fn is_ordered(&self) -> bool {
        constants::MIN_RISK_SCORE < self.medium
            && self.medium < self.high
            && self.high < self.critical
            && self.critical < self.emergency
            && self.emergency <= constants::MAX_RISK_SCORE
    }
}

// ============================================================================
// ALERT TYPE
// ============================================================================

/// Alert type when the oracle does not suggest one
pub fn alert_type_for(analysis_type: Option<AnalysisType>) -> AlertType {
    match analysis_type {
        Some(AnalysisType::GroomingDetection) => AlertType::GroomingDetected,
        Some(AnalysisType::ToxicityDetection) => AlertType::Cyberbullying,
        Some(AnalysisType::AgeVerification) => AlertType::StrangerContact,
        _ => AlertType::SuspiciousBehavior,
    }
}

// ============================================================================
// DISPATCH TABLE
// ============================================================================

pub fn channels_for(severity: Severity) -> Vec<NotificationChannel> {
    use NotificationChannel::*;

    match severity {
        Severity::Low | Severity::Medium => vec![Dashboard],
        Severity::High => vec![Dashboard, Push],
        Severity::Critical => vec![Dashboard, Push, Email, Sms],
        Severity::Emergency => vec![Dashboard, Push, Email, Sms, EmergencyCall],
    }
}

pub fn priority_for(severity: Severity) -> NotificationPriority {
    match severity {
        Severity::Low | Severity::Medium => NotificationPriority::Normal,
        Severity::High => NotificationPriority::High,
        Severity::Critical => NotificationPriority::Urgent,
        Severity::Emergency => NotificationPriority::Immediate,
    }
}
