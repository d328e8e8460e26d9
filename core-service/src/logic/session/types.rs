use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{Display, EnumString};
use uuid::Uuid;

// ============================================================================
// ENUMS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionType {
    Messaging,
    VideoCall,
    VoiceCall,
    GroupChat,
    LiveStream,
    Gaming,
    Browsing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Paused,
    Terminated,
    Flagged,
    Emergency,
}

impl SessionStatus {
    /// Open sessions still accept events
    pub fn is_open(&self) -> bool {
        !matches!(self, SessionStatus::Completed | SessionStatus::Terminated)
    }

    /// Escalation rank used so an open session's status only moves upward
    fn rank(&self) -> u8 {
        match self {
            SessionStatus::Active | SessionStatus::Paused => 0,
            SessionStatus::Flagged => 1,
            SessionStatus::Emergency => 2,
            SessionStatus::Completed | SessionStatus::Terminated => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ParticipantRole {
    Child,
    Participant,
    Moderator,
    Admin,
    Bot,
}

/// Participant risk classification, ordered from least to most dangerous
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContentType {
    Text,
    Image,
    Video,
    Audio,
    File,
    Sticker,
    Gif,
    Location,
    Contact,
    Poll,
    Story,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AmendmentKind {
    Edited,
    Deleted,
}

// ============================================================================
// SESSION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringGap {
    pub at: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub child_id: Uuid,
    pub guardian_id: Option<Uuid>,
    pub platform_connection_id: Uuid,
    pub session_type: SessionType,
    pub status: SessionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub message_count: i64,
    pub participant_count: i64,
    /// Current score, bounded [0, 10]
    pub risk_score: f64,
    /// Historical maximum of `risk_score`; never lowered
    pub peak_risk_score: f64,
    pub last_activity: DateTime<Utc>,
    pub scoring_gaps: i64,
    pub last_scoring_gap: Option<ScoringGap>,
}

impl Session {
    pub fn start(
        child_id: Uuid,
        guardian_id: Option<Uuid>,
        platform_connection_id: Uuid,
        session_type: SessionType,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            child_id,
            guardian_id,
            platform_connection_id,
            session_type,
            status: SessionStatus::Active,
            start_time,
            end_time: None,
            duration_seconds: None,
            message_count: 0,
            participant_count: 0,
            risk_score: 0.0,
            peak_risk_score: 0.0,
            last_activity: start_time,
            scoring_gaps: 0,
            last_scoring_gap: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// Close the session. The end time never precedes the start time.
    pub fn close(&mut self, status: SessionStatus, at: DateTime<Utc>) {
        let end = at.max(self.start_time);
        self.status = status;
        self.end_time = Some(end);
        self.duration_seconds = Some(end.signed_duration_since(self.start_time).num_seconds());
    }

    /// Raise the status to match the score. Returns true on change.
    pub fn escalate_status(&mut self, flagged: f64, emergency: f64) -> bool {
        if !self.is_open() {
            return false;
        }

        let target = if self.risk_score >= emergency {
            SessionStatus::Emergency
        } else if self.risk_score >= flagged {
            SessionStatus::Flagged
        } else {
            return false;
        };

        if target.rank() > self.status.rank() {
            self.status = target;
            true
        } else {
            false
        }
    }

    pub fn touch(&mut self, at: DateTime<Utc>) {
        if at > self.last_activity {
            self.last_activity = at;
        }
    }
}

// ============================================================================
// PARTICIPANT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: Uuid,
    pub session_id: Uuid,
    pub platform_user_id: String,
    pub display_name: Option<String>,
    pub username: Option<String>,
    pub role: ParticipantRole,
    pub risk_level: RiskLevel,
    pub first_interaction: DateTime<Utc>,
    pub last_interaction: DateTime<Utc>,
    pub message_count: i64,
    pub age_estimate: Option<i32>,
    pub is_verified: bool,
}

impl Participant {
    pub fn new(session_id: Uuid, platform_user_id: String, role: ParticipantRole, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            platform_user_id,
            display_name: None,
            username: None,
            role,
            risk_level: RiskLevel::Unknown,
            first_interaction: at,
            last_interaction: at,
            message_count: 0,
            age_estimate: None,
            is_verified: false,
        }
    }

    /// Move the risk level up the ordered scale. Lower levels are ignored.
    pub fn raise_risk(&mut self, level: RiskLevel) -> bool {
        if level > self.risk_level {
            self.risk_level = level;
            true
        } else {
            false
        }
    }
}

// ============================================================================
// MESSAGE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub session_id: Uuid,
    pub platform_message_id: Option<String>,
    pub sender_id: String,
    pub recipient_id: Option<String>,
    pub content_type: ContentType,
    pub content_hash: String,
    pub timestamp: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    /// Natural key, unique per session
    pub dedup_key: String,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Natural dedup key: the platform id when present, otherwise
    /// sender + content hash + timestamp bucket.
    pub fn dedup_key(
        platform_message_id: Option<&str>,
        sender_id: &str,
        content_hash: &str,
        timestamp: DateTime<Utc>,
        bucket_secs: i64,
    ) -> String {
        match platform_message_id {
            Some(id) => format!("pm:{}", id),
            None => {
                let bucket = timestamp.timestamp().div_euclid(bucket_secs.max(1));
                let mut hasher = Sha256::new();
                hasher.update(sender_id.as_bytes());
                hasher.update([0u8]);
                hasher.update(content_hash.as_bytes());
                format!("ch:{}:{}", hex::encode(&hasher.finalize()[..16]), bucket)
            }
        }
    }

    pub fn is_superseded(&self) -> bool {
        self.edited_at.is_some() || self.deleted_at.is_some()
    }
}
