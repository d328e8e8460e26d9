use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MonitorError;
use crate::logic::session::{AmendmentKind, ContentType, ParticipantRole, RiskLevel, SessionType};

// ============================================================================
// EVENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStart {
    pub child_id: Uuid,
    #[serde(default)]
    pub guardian_id: Option<Uuid>,
    pub platform_connection_id: Uuid,
    pub session_type: SessionType,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEnd {
    pub session_id: Uuid,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticipantSeen {
    pub session_id: Uuid,
    pub platform_user_id: String,
    #[serde(default)]
    pub role: Option<ParticipantRole>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub age_estimate: Option<i32>,
    #[serde(default)]
    pub seen_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageReceived {
    pub session_id: Uuid,
    #[serde(default)]
    pub platform_message_id: Option<String>,
    pub sender_id: String,
    #[serde(default)]
    pub recipient_id: Option<String>,
    pub content_type: ContentType,
    pub content_hash: String,
    pub timestamp: DateTime<Utc>,
}

/// Edit/delete marker for an accepted message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageAmended {
    pub session_id: Uuid,
    pub platform_message_id: String,
    pub kind: AmendmentKind,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IngestEvent {
    SessionStart(SessionStart),
    SessionEnd(SessionEnd),
    ParticipantSeen(ParticipantSeen),
    MessageReceived(MessageReceived),
    MessageAmended(MessageAmended),
}

impl IngestEvent {
    /// Target session; a start has none yet
    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            IngestEvent::SessionStart(_) => None,
            IngestEvent::SessionEnd(e) => Some(e.session_id),
            IngestEvent::ParticipantSeen(e) => Some(e.session_id),
            IngestEvent::MessageReceived(e) => Some(e.session_id),
            IngestEvent::MessageAmended(e) => Some(e.session_id),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            IngestEvent::SessionStart(_) => "session_start",
            IngestEvent::SessionEnd(_) => "session_end",
            IngestEvent::ParticipantSeen(_) => "participant_seen",
            IngestEvent::MessageReceived(_) => "message_received",
            IngestEvent::MessageAmended(_) => "message_amended",
        }
    }
}

// ============================================================================
// OUTCOMES
// ============================================================================

/// Every event ends in exactly one of these
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    Accepted { resource_id: Uuid },
    /// Already processed; treated as success
    Duplicate { resource_id: Uuid },
    Rejected { reason: String, retryable: bool },
}

impl IngestOutcome {
    pub fn rejected(reason: impl Into<String>) -> Self {
        IngestOutcome::Rejected {
            reason: reason.into(),
            retryable: false,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, IngestOutcome::Accepted { .. })
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, IngestOutcome::Duplicate { .. })
    }

    pub fn resource_id(&self) -> Option<Uuid> {
        match self {
            IngestOutcome::Accepted { resource_id } | IngestOutcome::Duplicate { resource_id } => Some(*resource_id),
            IngestOutcome::Rejected { .. } => None,
        }
    }
}

impl From<MonitorError> for IngestOutcome {
    fn from(err: MonitorError) -> Self {
        IngestOutcome::Rejected {
            retryable: err.is_retryable(),
            reason: err.to_string(),
        }
    }
}
