use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::logic::alert::AlertOp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditAction {
    SessionStarted,
    SessionEnded,
    SessionExpired,
    SessionStatusChanged,
    ParticipantUpserted,
    ParticipantRiskRaised,
    ParticipantRiskReset,
    MessageAccepted,
    MessageAmended,
    AnalysisStored,
    ScoreRecomputed,
    ScoringGap,
    AlertOpened,
    AlertUpdated,
    AlertAcknowledged,
    AlertInvestigated,
    AlertResolved,
    AlertDismissed,
    AlertEscalated,
    AlertReassessed,
    AlertReopened,
    EvidenceCaptured,
    EvidenceAccessed,
    EvidenceExported,
    EvidenceVerified,
    EvidenceLegalHold,
    EvidencePurged,
    AuditCompacted,
}

impl From<&AlertOp> for AuditAction {
    fn from(op: &AlertOp) -> Self {
        match op {
            AlertOp::Acknowledge { .. } => AuditAction::AlertAcknowledged,
            AlertOp::Investigate { .. } => AuditAction::AlertInvestigated,
            AlertOp::Resolve { .. } => AuditAction::AlertResolved,
            AlertOp::Dismiss { .. } => AuditAction::AlertDismissed,
            AlertOp::Escalate { .. } => AuditAction::AlertEscalated,
            AlertOp::Reassess { .. } => AuditAction::AlertReassessed,
            AlertOp::Reopen { .. } => AuditAction::AlertReopened,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResourceType {
    Session,
    Participant,
    Message,
    Analysis,
    Alert,
    Evidence,
    Audit,
}

/// Append-only record of one mutating action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub at: DateTime<Utc>,
    /// `YYYY-MM` retention bucket
    pub partition: String,
    pub actor: String,
    pub action: AuditAction,
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub success: bool,
    pub detail: Option<String>,
}

pub fn partition_of(at: &DateTime<Utc>) -> String {
    format!("{:04}-{:02}", at.year(), at.month())
}

impl AuditEntry {
    pub fn new(
        actor: impl Into<String>,
        action: AuditAction,
        resource_type: ResourceType,
        resource_id: impl ToString,
    ) -> Self {
        let at = Utc::now();
        Self {
            id: Uuid::new_v4(),
            at,
            partition: partition_of(&at),
            actor: actor.into(),
            action,
            resource_type,
            resource_id: resource_id.to_string(),
            before: None,
            after: None,
            success: true,
            detail: None,
        }
    }

    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = at;
        self.partition = partition_of(&at);
        self
    }

    pub fn before<T: Serialize>(mut self, value: &T) -> Self {
        self.before = serde_json::to_value(value).ok();
        self
    }

    pub fn after<T: Serialize>(mut self, value: &T) -> Self {
        self.after = serde_json::to_value(value).ok();
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Record an attempt that did not go through
    pub fn failed(mut self, reason: impl Into<String>) -> Self {
        self.success = false;
        self.detail = Some(reason.into());
        self
    }
}
