use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::logic::scoring::{AnalysisType, ScoreBreakdown};

// ============================================================================
// ENUMS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlertType {
    GroomingDetected,
    InappropriateContent,
    StrangerContact,
    PersonalInfoRequest,
    MeetingRequest,
    SuspiciousBehavior,
    Cyberbullying,
    SelfHarmIndicators,
    EmergencyKeywords,
    PlatformViolation,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
    Emergency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlertStatus {
    New,
    Acknowledged,
    Investigating,
    Resolved,
    Escalated,
    FalsePositive,
    Dismissed,
}

impl AlertStatus {
    /// Non-terminal and not escalated: the dedup unit for (session, type)
    pub fn is_active(&self) -> bool {
        matches!(self, AlertStatus::New | AlertStatus::Acknowledged | AlertStatus::Investigating)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AlertStatus::Resolved | AlertStatus::FalsePositive | AlertStatus::Dismissed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Urgency {
    Normal,
    Medium,
    High,
    Urgent,
    Immediate,
    Critical,
}

// ============================================================================
// TRIGGER
// ============================================================================

/// Pointer to the evidence that raised or last updated an alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "version")]
pub enum Trigger {
    #[serde(rename = "1")]
    V1 {
        message_id: Option<Uuid>,
        #[serde(default)]
        analysis_ids: Vec<Uuid>,
        analysis_type: Option<AnalysisType>,
        #[serde(default)]
        patterns: Vec<String>,
        breakdown: ScoreBreakdown,
    },
}

impl Trigger {
    pub fn message_id(&self) -> Option<Uuid> {
        match self {
            Trigger::V1 { message_id, .. } => *message_id,
        }
    }

    pub fn analysis_ids(&self) -> &[Uuid] {
        match self {
            Trigger::V1 { analysis_ids, .. } => analysis_ids,
        }
    }
}

// ============================================================================
// ALERT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertAction {
    pub action: String,
    pub actor: String,
    pub at: DateTime<Utc>,
    pub from: AlertStatus,
    pub to: AlertStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub session_id: Uuid,
    pub child_id: Uuid,
    pub guardian_id: Option<Uuid>,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub status: AlertStatus,
    pub title: String,
    pub description: String,
    pub risk_score: f64,
    pub confidence_score: f64,
    pub trigger: Trigger,

    pub false_positive: bool,
    pub false_positive_reason: Option<String>,
    pub resolution_notes: Option<String>,

    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub investigating_at: Option<DateTime<Utc>>,
    pub investigating_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub escalated_at: Option<DateTime<Utc>>,
    pub escalated_by: Option<String>,
    pub escalation_target: Option<String>,
    pub escalation_reference: Option<String>,

    /// Escalated alert this one was manually reopened from
    pub reopened_from: Option<Uuid>,
    pub history: Vec<AlertAction>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Alert {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub(crate) fn push_action(
        &mut self,
        action: &str,
        actor: &str,
        from: AlertStatus,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) {
        self.history.push(AlertAction {
            action: action.to_string(),
            actor: actor.to_string(),
            at,
            from,
            to: self.status,
            notes,
        });
        self.updated_at = at;
    }

    /// Urgency decays with age for everything below emergency
    pub fn urgency(&self, now: DateTime<Utc>) -> Urgency {
        let hours = now.signed_duration_since(self.created_at).num_minutes() as f64 / 60.0;

        match self.severity {
            Severity::Emergency if hours > 1.0 => Urgency::Critical,
            Severity::Emergency => Urgency::Immediate,
            Severity::Critical if hours > 4.0 => Urgency::High,
            Severity::Critical => Urgency::Urgent,
            Severity::High if hours > 24.0 => Urgency::Medium,
            Severity::High => Urgency::High,
            Severity::Medium | Severity::Low => Urgency::Normal,
        }
    }

    pub fn recommended_actions(&self) -> Vec<&'static str> {
        let mut actions: Vec<&'static str> = match self.alert_type {
            AlertType::GroomingDetected => vec![
                "Review conversation history immediately",
                "Talk with your child about the interaction",
                "Consider blocking the contact",
                "Preserve evidence for a possible report",
            ],
            AlertType::InappropriateContent => vec![
                "Review the flagged content",
                "Discuss appropriate online behavior",
                "Adjust content filtering settings",
            ],
            AlertType::StrangerContact => vec![
                "Verify who the contact is",
                "Discuss stranger safety",
                "Review privacy settings",
            ],
            AlertType::PersonalInfoRequest => vec![
                "Review the conversation now",
                "Explain why personal details stay private",
                "Block the requesting contact",
                "Report to the platform if needed",
            ],
            AlertType::MeetingRequest => vec![
                "Review the conversation now",
                "Contact your child directly",
                "Block the contact asking to meet",
                "Consider contacting authorities",
            ],
            AlertType::EmergencyKeywords | AlertType::SelfHarmIndicators => vec![
                "Contact your child immediately",
                "Review the full conversation context",
                "Contact emergency services if needed",
            ],
            _ => vec![
                "Review the flagged content",
                "Act on what the context shows",
                "Watch for similar incidents",
            ],
        };

        if self.severity >= Severity::Critical {
            actions.insert(0, "Immediate attention required");
            actions.push("Consider escalating to authorities");
        }
        actions
    }
}
