//! In-memory store. Enforces the same natural keys as the SQL schema.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::{AuditFilter, Insert, Store};
use crate::error::{StoreError, StoreResult};
use crate::logic::alert::Alert;
use crate::logic::audit::AuditEntry;
use crate::logic::evidence::Evidence;
use crate::logic::scoring::AnalysisResult;
use crate::logic::session::{Message, Participant, Session};

#[derive(Default)]
struct Tables {
    sessions: HashMap<Uuid, Session>,
    participants: HashMap<(Uuid, String), Participant>,
    messages: HashMap<Uuid, Message>,
    message_keys: HashMap<(Uuid, String), Uuid>,
    analyses: Vec<AnalysisResult>,
    alerts: HashMap<Uuid, Alert>,
    evidence: HashMap<Uuid, Evidence>,
    /// Partition (`YYYY-MM`) -> entries in append order
    audit: BTreeMap<String, Vec<AuditEntry>>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
    audit_unavailable: AtomicBool,
    session_updates_unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail as if the backend were down
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    /// Make only audit appends fail
    pub fn set_audit_unavailable(&self, down: bool) {
        self.audit_unavailable.store(down, Ordering::SeqCst);
    }

    /// Make only session updates fail
    pub fn set_session_updates_unavailable(&self, down: bool) {
        self.session_updates_unavailable.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store marked unavailable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    // ========================================================================
    // SESSIONS
    // ========================================================================

    async fn insert_session(&self, session: &Session) -> StoreResult<Insert<Session>> {
        self.check()?;
        let mut t = self.tables.write();

        if let Some(existing) = t
            .sessions
            .values()
            .find(|s| s.platform_connection_id == session.platform_connection_id && s.is_open())
        {
            return Ok(Insert::Existing(existing.clone()));
        }
        t.sessions.insert(session.id, session.clone());
        Ok(Insert::Inserted(session.clone()))
    }

    async fn get_session(&self, id: Uuid) -> StoreResult<Option<Session>> {
        self.check()?;
        Ok(self.tables.read().sessions.get(&id).cloned())
    }

    async fn update_session(&self, session: &Session) -> StoreResult<()> {
        self.check()?;
        if self.session_updates_unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("sessions table unavailable".into()));
        }
        let mut t = self.tables.write();
        match t.sessions.get_mut(&session.id) {
            Some(slot) => {
                *slot = session.clone();
                Ok(())
            }
            None => Err(StoreError::Conflict(format!("session {} does not exist", session.id))),
        }
    }

    async fn idle_sessions(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Session>> {
        self.check()?;
        Ok(self
            .tables
            .read()
            .sessions
            .values()
            .filter(|s| s.is_open() && s.last_activity < cutoff)
            .cloned()
            .collect())
    }

    // ========================================================================
    // PARTICIPANTS
    // ========================================================================

    async fn upsert_participant(&self, participant: &Participant) -> StoreResult<()> {
        self.check()?;
        let key = (participant.session_id, participant.platform_user_id.clone());
        self.tables.write().participants.insert(key, participant.clone());
        Ok(())
    }

    async fn participants(&self, session_id: Uuid) -> StoreResult<Vec<Participant>> {
        self.check()?;
        let mut list: Vec<Participant> = self
            .tables
            .read()
            .participants
            .values()
            .filter(|p| p.session_id == session_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.first_interaction.cmp(&b.first_interaction));
        Ok(list)
    }

    // ========================================================================
    // MESSAGES
    // ========================================================================

    async fn insert_message(&self, message: &Message) -> StoreResult<Insert<Message>> {
        self.check()?;
        let mut t = self.tables.write();
        let key = (message.session_id, message.dedup_key.clone());

        if let Some(id) = t.message_keys.get(&key) {
            let existing = t
                .messages
                .get(id)
                .cloned()
                .ok_or_else(|| StoreError::Corrupt(format!("dangling message key {}", message.dedup_key)))?;
            return Ok(Insert::Existing(existing));
        }
        t.message_keys.insert(key, message.id);
        t.messages.insert(message.id, message.clone());
        Ok(Insert::Inserted(message.clone()))
    }

    async fn find_message(&self, session_id: Uuid, dedup_key: &str) -> StoreResult<Option<Message>> {
        self.check()?;
        let t = self.tables.read();
        Ok(t
            .message_keys
            .get(&(session_id, dedup_key.to_string()))
            .and_then(|id| t.messages.get(id))
            .cloned())
    }

    async fn get_message(&self, id: Uuid) -> StoreResult<Option<Message>> {
        self.check()?;
        Ok(self.tables.read().messages.get(&id).cloned())
    }

    async fn count_messages(&self, session_id: Uuid) -> StoreResult<i64> {
        self.check()?;
        Ok(self
            .tables
            .read()
            .messages
            .values()
            .filter(|m| m.session_id == session_id)
            .count() as i64)
    }

    async fn update_message_markers(&self, message: &Message) -> StoreResult<()> {
        self.check()?;
        let mut t = self.tables.write();
        let slot = t
            .messages
            .get_mut(&message.id)
            .ok_or_else(|| StoreError::Conflict(format!("message {} does not exist", message.id)))?;
        slot.edited_at = message.edited_at;
        slot.deleted_at = message.deleted_at;
        Ok(())
    }

    // ========================================================================
    // ANALYSES
    // ========================================================================

    async fn insert_analysis(&self, result: &AnalysisResult) -> StoreResult<()> {
        self.check()?;
        let mut t = self.tables.write();
        if !t.analyses.iter().any(|a| a.id == result.id) {
            t.analyses.push(result.clone());
        }
        Ok(())
    }

    async fn analyses(&self, session_id: Uuid) -> StoreResult<Vec<AnalysisResult>> {
        self.check()?;
        Ok(self
            .tables
            .read()
            .analyses
            .iter()
            .filter(|a| a.session_id == session_id)
            .cloned()
            .collect())
    }

    // ========================================================================
    // ALERTS
    // ========================================================================

    async fn insert_alert(&self, alert: &Alert) -> StoreResult<Insert<Alert>> {
        self.check()?;
        let mut t = self.tables.write();

        if let Some(existing) = t
            .alerts
            .values()
            .find(|a| a.session_id == alert.session_id && a.alert_type == alert.alert_type && a.is_active())
        {
            return Ok(Insert::Existing(existing.clone()));
        }
        t.alerts.insert(alert.id, alert.clone());
        Ok(Insert::Inserted(alert.clone()))
    }

    async fn update_alert(&self, alert: &Alert) -> StoreResult<()> {
        self.check()?;
        let mut t = self.tables.write();
        match t.alerts.get_mut(&alert.id) {
            Some(slot) => {
                *slot = alert.clone();
                Ok(())
            }
            None => Err(StoreError::Conflict(format!("alert {} does not exist", alert.id))),
        }
    }

    async fn get_alert(&self, id: Uuid) -> StoreResult<Option<Alert>> {
        self.check()?;
        Ok(self.tables.read().alerts.get(&id).cloned())
    }

    async fn alerts_for_session(&self, session_id: Uuid) -> StoreResult<Vec<Alert>> {
        self.check()?;
        let mut list: Vec<Alert> = self
            .tables
            .read()
            .alerts
            .values()
            .filter(|a| a.session_id == session_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(list)
    }

    // ========================================================================
    // EVIDENCE
    // ========================================================================

    async fn insert_evidence(&self, evidence: &Evidence) -> StoreResult<()> {
        self.check()?;
        let mut t = self.tables.write();
        if t.evidence.contains_key(&evidence.id) {
            return Err(StoreError::Conflict(format!("evidence {} already exists", evidence.id)));
        }
        t.evidence.insert(evidence.id, evidence.clone());
        Ok(())
    }

    async fn update_evidence(&self, evidence: &Evidence) -> StoreResult<()> {
        self.check()?;
        let mut t = self.tables.write();
        let slot = t
            .evidence
            .get_mut(&evidence.id)
            .ok_or_else(|| StoreError::Conflict(format!("evidence {} does not exist", evidence.id)))?;
        if evidence.custody.len() < slot.custody.len() {
            return Err(StoreError::Conflict(format!("custody chain of {} cannot shrink", evidence.id)));
        }
        *slot = evidence.clone();
        Ok(())
    }

    async fn get_evidence(&self, id: Uuid) -> StoreResult<Option<Evidence>> {
        self.check()?;
        Ok(self.tables.read().evidence.get(&id).cloned())
    }

    async fn evidence_for_alert(&self, alert_id: Uuid) -> StoreResult<Vec<Evidence>> {
        self.check()?;
        let mut list: Vec<Evidence> = self
            .tables
            .read()
            .evidence
            .values()
            .filter(|e| e.alert_id == alert_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.collected_at.cmp(&b.collected_at));
        Ok(list)
    }

    async fn expired_evidence(&self, now: DateTime<Utc>) -> StoreResult<Vec<Evidence>> {
        self.check()?;
        Ok(self
            .tables
            .read()
            .evidence
            .values()
            .filter(|e| !e.legal_hold && e.retention_until < now)
            .cloned()
            .collect())
    }

    async fn delete_evidence(&self, id: Uuid) -> StoreResult<()> {
        self.check()?;
        let mut t = self.tables.write();
        match t.evidence.get(&id) {
            Some(e) if e.legal_hold => Err(StoreError::Conflict(format!("evidence {} is under legal hold", id))),
            Some(_) => {
                t.evidence.remove(&id);
                Ok(())
            }
            None => Ok(()),
        }
    }

    // ========================================================================
    // AUDIT
    // ========================================================================

    async fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()> {
        self.check()?;
        if self.audit_unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("audit table unavailable".into()));
        }
        self.tables
            .write()
            .audit
            .entry(entry.partition.clone())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn query_audit(&self, filter: &AuditFilter) -> StoreResult<Vec<AuditEntry>> {
        self.check()?;
        let t = self.tables.read();
        Ok(t.audit
            .values()
            .rev()
            .flat_map(|partition| partition.iter().rev())
            .filter(|e| filter.matches(e))
            .take(filter.effective_limit())
            .cloned()
            .collect())
    }

    async fn drop_audit_partitions_before(&self, partition: &str) -> StoreResult<u64> {
        self.check()?;
        let mut t = self.tables.write();
        let keep = t.audit.split_off(partition);
        let dropped: u64 = t.audit.values().map(|entries| entries.len() as u64).sum();
        t.audit = keep;
        Ok(dropped)
    }
}
