use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::error::OracleError;
use crate::logic::alert::AlertType;
use crate::logic::session::RiskLevel;

// ============================================================================
// ANALYSIS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AnalysisType {
    GroomingDetection,
    Sentiment,
    IntentClassification,
    EntityExtraction,
    ToxicityDetection,
    AgeVerification,
    RiskAssessment,
}

/// What an analysis is about: exactly one message or one whole session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AnalysisTarget {
    Message(Uuid),
    Session(Uuid),
}

/// Structured indicators attached to an analysis, versioned so readers
/// can validate instead of guessing at shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "version")]
pub enum Indicators {
    #[serde(rename = "1")]
    V1 {
        #[serde(default)]
        patterns: Vec<String>,
        #[serde(default)]
        sender_risk: Option<RiskLevel>,
        #[serde(default)]
        suggested_alert_type: Option<AlertType>,
        #[serde(default)]
        notes: Option<String>,
    },
}

impl Default for Indicators {
    fn default() -> Self {
        Indicators::V1 {
            patterns: vec![],
            sender_risk: None,
            suggested_alert_type: None,
            notes: None,
        }
    }
}

impl Indicators {
    pub fn sender_risk(&self) -> Option<RiskLevel> {
        match self {
            Indicators::V1 { sender_risk, .. } => *sender_risk,
        }
    }

    pub fn suggested_alert_type(&self) -> Option<AlertType> {
        match self {
            Indicators::V1 { suggested_alert_type, .. } => *suggested_alert_type,
        }
    }

    pub fn patterns(&self) -> &[String] {
        match self {
            Indicators::V1 { patterns, .. } => patterns,
        }
    }
}

/// Raw oracle output, before it is bound to a target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleVerdict {
    pub analysis_type: AnalysisType,
    pub confidence: f64,
    pub risk_score: f64,
    #[serde(default)]
    pub indicators: Indicators,
    #[serde(default)]
    pub model_version: Option<String>,
}

impl OracleVerdict {
    /// Reject verdicts whose numbers fall outside their contract ranges
    pub fn validate(&self) -> Result<(), OracleError> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(OracleError::InvalidResponse(format!(
                "confidence {} outside [0, 1]",
                self.confidence
            )));
        }
        if !(0.0..=10.0).contains(&self.risk_score) {
            return Err(OracleError::InvalidResponse(format!(
                "risk score {} outside [0, 10]",
                self.risk_score
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: Uuid,
    pub session_id: Uuid,
    pub target: AnalysisTarget,
    pub analysis_type: AnalysisType,
    pub confidence: f64,
    pub risk_score: f64,
    pub indicators: Indicators,
    pub model_version: Option<String>,
    pub processed_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn from_verdict(session_id: Uuid, target: AnalysisTarget, verdict: OracleVerdict, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            target,
            analysis_type: verdict.analysis_type,
            confidence: verdict.confidence,
            risk_score: verdict.risk_score,
            indicators: verdict.indicators,
            model_version: verdict.model_version,
            processed_at: at,
        }
    }

    pub fn message_id(&self) -> Option<Uuid> {
        match self.target {
            AnalysisTarget::Message(id) => Some(id),
            AnalysisTarget::Session(_) => None,
        }
    }
}

// ============================================================================
// SCORE BREAKDOWN
// ============================================================================

/// How a session score was produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub avg_message_risk: f64,
    pub participant_risk: f64,
    pub message_weight: f64,
    pub participant_weight: f64,
    pub messages_scored: usize,
    /// Final score, clamped to [0, 10] and rounded to two decimals
    pub score: f64,
}
