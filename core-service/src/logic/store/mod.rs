//! Persistence Interface
//!
//! The only resource shared by all session workers. Inserts on natural
//! keys are idempotent: a conflicting insert hands back the existing row
//! instead of failing, so upstream retries are always safe.
//!
//! Natural keys:
//! - one open session per platform connection
//! - (session, platform user id) for participants
//! - (session, dedup key) for messages
//! - one active alert per (session, alert type)

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::logic::alert::Alert;
use crate::logic::audit::AuditEntry;
use crate::logic::evidence::Evidence;
use crate::logic::scoring::AnalysisResult;
use crate::logic::session::{Message, Participant, Session};

pub use memory::MemoryStore;

/// Result of an idempotent insert
#[derive(Debug, Clone, PartialEq)]
pub enum Insert<T> {
    Inserted(T),
    /// A row with the same natural key already existed; it is returned unchanged
    Existing(T),
}

impl<T> Insert<T> {
    pub fn is_new(&self) -> bool {
        matches!(self, Insert::Inserted(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Insert::Inserted(v) | Insert::Existing(v) => v,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditFilter {
    pub resource_id: Option<String>,
    pub actor: Option<String>,
    pub since: Option<DateTime<Utc>>,
    /// Newest first; zero means the default page size
    pub limit: usize,
}

impl AuditFilter {
    pub const DEFAULT_LIMIT: usize = 100;

    pub fn effective_limit(&self) -> usize {
        if self.limit == 0 {
            Self::DEFAULT_LIMIT
        } else {
            self.limit
        }
    }

    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.resource_id.as_ref().map_or(true, |id| &entry.resource_id == id)
            && self.actor.as_ref().map_or(true, |a| &entry.actor == a)
            && self.since.map_or(true, |since| entry.at >= since)
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    // ---- sessions ----
    /// Idempotent per open platform connection
    async fn insert_session(&self, session: &Session) -> StoreResult<Insert<Session>>;
    async fn get_session(&self, id: Uuid) -> StoreResult<Option<Session>>;
    async fn update_session(&self, session: &Session) -> StoreResult<()>;
    /// Open sessions whose last activity is before `cutoff`
    async fn idle_sessions(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Session>>;

    // ---- participants ----
    async fn upsert_participant(&self, participant: &Participant) -> StoreResult<()>;
    async fn participants(&self, session_id: Uuid) -> StoreResult<Vec<Participant>>;

    // ---- messages ----
    /// Idempotent per (session, dedup key)
    async fn insert_message(&self, message: &Message) -> StoreResult<Insert<Message>>;
    async fn find_message(&self, session_id: Uuid, dedup_key: &str) -> StoreResult<Option<Message>>;
    async fn get_message(&self, id: Uuid) -> StoreResult<Option<Message>>;
    async fn count_messages(&self, session_id: Uuid) -> StoreResult<i64>;
    /// Only the edit/delete markers may change
    async fn update_message_markers(&self, message: &Message) -> StoreResult<()>;

    // ---- analyses ----
    async fn insert_analysis(&self, result: &AnalysisResult) -> StoreResult<()>;
    async fn analyses(&self, session_id: Uuid) -> StoreResult<Vec<AnalysisResult>>;

    // ---- alerts ----
    /// Idempotent per active (session, alert type)
    async fn insert_alert(&self, alert: &Alert) -> StoreResult<Insert<Alert>>;
    async fn update_alert(&self, alert: &Alert) -> StoreResult<()>;
    async fn get_alert(&self, id: Uuid) -> StoreResult<Option<Alert>>;
    async fn alerts_for_session(&self, session_id: Uuid) -> StoreResult<Vec<Alert>>;

    // ---- evidence ----
    async fn insert_evidence(&self, evidence: &Evidence) -> StoreResult<()>;
    async fn update_evidence(&self, evidence: &Evidence) -> StoreResult<()>;
    async fn get_evidence(&self, id: Uuid) -> StoreResult<Option<Evidence>>;
    async fn evidence_for_alert(&self, alert_id: Uuid) -> StoreResult<Vec<Evidence>>;
    /// Past retention and not under legal hold
    async fn expired_evidence(&self, now: DateTime<Utc>) -> StoreResult<Vec<Evidence>>;
    /// Refuses evidence under legal hold with [`crate::StoreError::Conflict`]
    async fn delete_evidence(&self, id: Uuid) -> StoreResult<()>;

    // ---- audit ----
    async fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()>;
    async fn query_audit(&self, filter: &AuditFilter) -> StoreResult<Vec<AuditEntry>>;
    /// Drop whole partitions strictly older than `partition` (`YYYY-MM`)
    async fn drop_audit_partitions_before(&self, partition: &str) -> StoreResult<u64>;
}
