//! Monitor - the pipeline façade
//!
//! Owns the routing table of per-session workers and exposes every
//! ingestion, review and evidence operation behind one authorization check.
//!
//! ## Structure
//! - `router.rs` - session id → worker channel, spawn and eviction
//! - `worker.rs` - the single writer for one session's state
//!
//! Session starts are handled here directly: the session row is the
//! idempotency key and no worker exists before it.

mod router;
mod worker;


use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::{MonitorError, MonitorResult};
use crate::logic::alert::{Alert, AlertManager, AlertOp};
use crate::logic::audit::{AuditAction, AuditEntry, AuditRecorder, AuditSink, ResourceType, StoreAuditSink};
use crate::logic::authz::{authorize, Action, CallerContext};
use crate::logic::config::PipelineConfig;
use crate::logic::evidence::{BlobStore, Evidence, EvidenceBundle, EvidenceVault};
use crate::logic::ingest::{self, IngestEvent, IngestOutcome, SessionStart};
use crate::logic::notify::Notifier;
use crate::logic::retry::{retry_with_backoff, RetryPolicy};
use crate::logic::scoring::{OracleClient, RiskScoringEngine, ScoringOracle};
use crate::logic::session::{ChildDirectory, Participant, RiskLevel, Session};
use crate::logic::store::{AuditFilter, Insert, Store};

use router::Router;
use worker::Command;

/// External collaborators of the pipeline
pub struct MonitorDeps {
    pub store: Arc<dyn Store>,
    pub oracle: Arc<dyn ScoringOracle>,
    pub notifier: Arc<dyn Notifier>,
    pub blobs: Arc<dyn BlobStore>,
    /// Defaults to the store's audit table
    pub audit_sink: Option<Arc<dyn AuditSink>>,
    /// Without a directory the birth-date bound is not checked
    pub children: Option<Arc<dyn ChildDirectory>>,
}

/// Everything a worker needs, shared read-only across workers
pub(crate) struct Shared {
    pub config: PipelineConfig,
    pub store: Arc<dyn Store>,
    pub notifier: Arc<dyn Notifier>,
    pub children: Option<Arc<dyn ChildDirectory>>,
    pub oracle: OracleClient,
    pub engine: RiskScoringEngine,
    pub alerts: AlertManager,
    pub vault: EvidenceVault,
    pub audit: Arc<AuditRecorder>,
    pub storage_retry: RetryPolicy,
}

/// Session as returned to readers
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session: Session,
    pub participants: Vec<Participant>,
}

pub struct Monitor {
    shared: Arc<Shared>,
    router: Arc<Router>,
}

impl Monitor {
    pub fn new(config: PipelineConfig, deps: MonitorDeps) -> Self {
        let sink = deps
            .audit_sink
            .unwrap_or_else(|| Arc::new(StoreAuditSink::new(deps.store.clone())));
        let audit = Arc::new(AuditRecorder::new(sink, deps.notifier.clone()));
        let vault = EvidenceVault::new(
            deps.store.clone(),
            deps.blobs,
            audit.clone(),
            deps.notifier.clone(),
            config.hash_algorithm,
        );

        let shared = Arc::new(Shared {
            oracle: OracleClient::new(deps.oracle, config.oracle_retry.clone()),
            engine: RiskScoringEngine::new(config.scoring.clone()),
            alerts: AlertManager::new(config.bands.clone()),
            store: deps.store,
            notifier: deps.notifier,
            children: deps.children,
            vault,
            audit,
            storage_retry: RetryPolicy::for_storage(),
            config,
        });

        Self {
            router: Arc::new(Router::new(shared.clone())),
            shared,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.shared.config
    }

    pub fn audit(&self) -> &AuditRecorder {
        &self.shared.audit
    }

    pub fn vault(&self) -> &EvidenceVault {
        &self.shared.vault
    }

    /// Number of live session workers
    pub fn active_workers(&self) -> usize {
        self.router.len()
    }

    // ========================================================================
    // INGESTION
    // ========================================================================

    /// Process one event. Never fails: every event ends in an outcome.
    pub async fn ingest(&self, caller: &CallerContext, event: IngestEvent) -> IngestOutcome {
        let kind = event.kind();
        let outcome = match self.ingest_inner(caller, event).await {
            Ok(outcome) => outcome,
            Err(e) => IngestOutcome::from(e),
        };

        if let IngestOutcome::Rejected { reason, retryable } = &outcome {
            log::warn!("Rejected {} from {} (retryable: {}): {}", kind, caller.actor, retryable, reason);
        }
        outcome
    }

    /// Events of one batch are applied in order
    pub async fn ingest_batch(&self, caller: &CallerContext, events: Vec<IngestEvent>) -> Vec<IngestOutcome> {
        let mut outcomes = Vec::with_capacity(events.len());
        for event in events {
            outcomes.push(self.ingest(caller, event).await);
        }
        outcomes
    }

    async fn ingest_inner(&self, caller: &CallerContext, event: IngestEvent) -> MonitorResult<IngestOutcome> {
        authorize(caller, Action::Ingest, None)?;
        ingest::validate(&event, Utc::now()).map_err(MonitorError::Validation)?;

        let session_id = match &event {
            IngestEvent::SessionStart(start) => return self.start_session(caller, start).await,
            other => other.session_id().ok_or_else(|| MonitorError::Validation("missing session id".into()))?,
        };

        self.call(session_id, |reply| Command::Ingest {
            event,
            actor: caller.actor.clone(),
            reply,
        })
        .await
    }

    async fn start_session(&self, caller: &CallerContext, start: &SessionStart) -> MonitorResult<IngestOutcome> {
        let started_at = start.started_at.unwrap_or_else(Utc::now);

        if let Some(children) = &self.shared.children {
            if let Some(birth) = children.birth_date(start.child_id).await {
                if started_at.date_naive() < birth {
                    return Err(MonitorError::BirthBound {
                        start: started_at,
                        birth,
                    });
                }
            }
        }

        let session = Session::start(
            start.child_id,
            start.guardian_id,
            start.platform_connection_id,
            start.session_type,
            started_at,
        );
        let store = &self.shared.store;
        let inserted = retry_with_backoff(&self.shared.storage_retry, "insert session", || {
            store.insert_session(&session)
        })
        .await?;

        match inserted {
            Insert::Inserted(session) => {
                log::info!(
                    "Session {} started for child {} ({})",
                    session.id,
                    session.child_id,
                    session.session_type
                );
                self.shared
                    .audit
                    .record(
                        AuditEntry::new(&caller.actor, AuditAction::SessionStarted, ResourceType::Session, session.id)
                            .after(&session),
                    )
                    .await;
                Ok(IngestOutcome::Accepted { resource_id: session.id })
            }
            Insert::Existing(session) => Ok(IngestOutcome::Duplicate { resource_id: session.id }),
        }
    }

    // ========================================================================
    // READS
    // ========================================================================

    pub async fn session(&self, caller: &CallerContext, session_id: Uuid) -> MonitorResult<SessionView> {
        let session = self.load_session(session_id).await?;
        authorize(caller, Action::Read, Some(session.child_id))?;

        let participants = self.shared.store.participants(session_id).await?;
        Ok(SessionView { session, participants })
    }

    pub async fn session_alerts(&self, caller: &CallerContext, session_id: Uuid) -> MonitorResult<Vec<Alert>> {
        let session = self.load_session(session_id).await?;
        authorize(caller, Action::Read, Some(session.child_id))?;
        Ok(self.shared.store.alerts_for_session(session_id).await?)
    }

    pub async fn alert(&self, caller: &CallerContext, alert_id: Uuid) -> MonitorResult<Alert> {
        let alert = self.load_alert(alert_id).await?;
        authorize(caller, Action::Read, Some(alert.child_id))?;
        Ok(alert)
    }

    /// Audit trail, newest first
    pub async fn audit_log(&self, caller: &CallerContext, filter: AuditFilter) -> MonitorResult<Vec<AuditEntry>> {
        authorize(caller, Action::ReadAudit, None)?;
        Ok(self.shared.store.query_audit(&filter).await?)
    }

    // ========================================================================
    // REVIEW
    // ========================================================================

    /// Manual lifecycle transition; runs on the owning session's worker
    pub async fn alert_action(&self, caller: &CallerContext, alert_id: Uuid, op: AlertOp) -> MonitorResult<Alert> {
        let alert = self.load_alert(alert_id).await?;
        authorize(caller, Action::Triage, Some(alert.child_id))?;

        self.call(alert.session_id, |reply| Command::AlertAction {
            alert_id,
            op,
            actor: caller.actor.clone(),
            reply,
        })
        .await
    }

    /// Reviewer override of a participant's risk level; may lower it
    pub async fn reset_participant_risk(
        &self,
        caller: &CallerContext,
        session_id: Uuid,
        participant_id: Uuid,
        level: RiskLevel,
        reason: String,
    ) -> MonitorResult<Participant> {
        let session = self.load_session(session_id).await?;
        authorize(caller, Action::Review, Some(session.child_id))?;

        self.call(session_id, |reply| Command::ResetRisk {
            participant_id,
            level,
            reason,
            actor: caller.actor.clone(),
            reply,
        })
        .await
    }

    // ========================================================================
    // EVIDENCE
    // ========================================================================

    pub async fn export_evidence(&self, caller: &CallerContext, alert_id: Uuid) -> MonitorResult<EvidenceBundle> {
        let alert = self.load_alert(alert_id).await?;
        authorize(caller, Action::ExportEvidence, Some(alert.child_id))?;

        self.call(alert.session_id, |reply| Command::ExportEvidence {
            alert_id,
            actor: caller.actor.clone(),
            reply,
        })
        .await
    }

    pub async fn verify_evidence(&self, caller: &CallerContext, evidence_id: Uuid) -> MonitorResult<bool> {
        let evidence = self.load_evidence(evidence_id).await?;
        let alert = self.load_alert(evidence.alert_id).await?;
        authorize(caller, Action::Review, Some(alert.child_id))?;

        self.call(evidence.session_id, |reply| Command::VerifyEvidence {
            evidence_id,
            actor: caller.actor.clone(),
            reply,
        })
        .await
    }

    pub async fn read_evidence(
        &self,
        caller: &CallerContext,
        evidence_id: Uuid,
        purpose: String,
    ) -> MonitorResult<(Evidence, Vec<u8>)> {
        let evidence = self.load_evidence(evidence_id).await?;
        let alert = self.load_alert(evidence.alert_id).await?;
        authorize(caller, Action::ExportEvidence, Some(alert.child_id))?;

        self.call(evidence.session_id, |reply| Command::ReadEvidence {
            evidence_id,
            purpose,
            actor: caller.actor.clone(),
            reply,
        })
        .await
    }

    pub async fn set_legal_hold(
        &self,
        caller: &CallerContext,
        evidence_id: Uuid,
        hold: bool,
        reason: Option<String>,
    ) -> MonitorResult<Evidence> {
        authorize(caller, Action::LegalHold, None)?;
        let evidence = self.load_evidence(evidence_id).await?;

        self.call(evidence.session_id, |reply| Command::LegalHold {
            evidence_id,
            hold,
            reason,
            actor: caller.actor.clone(),
            reply,
        })
        .await
    }

    // ========================================================================
    // PLUMBING
    // ========================================================================

    /// Wait until every command queued for the session so far has finished,
    /// including its scoring work
    pub async fn flush(&self, session_id: Uuid) -> MonitorResult<()> {
        self.call(session_id, |reply| Command::Flush { reply }).await
    }

    pub(crate) async fn expire_session(&self, session_id: Uuid, cutoff: DateTime<Utc>, actor: &str) -> MonitorResult<bool> {
        self.call(session_id, |reply| Command::Expire {
            cutoff,
            actor: actor.to_string(),
            reply,
        })
        .await
    }

    pub(crate) fn shared(&self) -> &Shared {
        &self.shared
    }

    /// Send a command to the session's worker and wait for its reply
    async fn call<T>(
        &self,
        session_id: Uuid,
        build: impl FnOnce(oneshot::Sender<MonitorResult<T>>) -> Command,
    ) -> MonitorResult<T> {
        let (tx, rx) = oneshot::channel();
        self.router.send(session_id, build(tx));
        rx.await.map_err(|_| MonitorError::WorkerUnavailable(session_id))?
    }

    async fn load_session(&self, session_id: Uuid) -> MonitorResult<Session> {
        self.shared
            .store
            .get_session(session_id)
            .await?
            .ok_or(MonitorError::UnknownSession(session_id))
    }

    async fn load_alert(&self, alert_id: Uuid) -> MonitorResult<Alert> {
        self.shared
            .store
            .get_alert(alert_id)
            .await?
            .ok_or_else(|| MonitorError::NotFound(format!("alert {}", alert_id)))
    }

    async fn load_evidence(&self, evidence_id: Uuid) -> MonitorResult<Evidence> {
        self.shared
            .store
            .get_evidence(evidence_id)
            .await?
            .ok_or_else(|| MonitorError::NotFound(format!("evidence {}", evidence_id)))
    }
}
