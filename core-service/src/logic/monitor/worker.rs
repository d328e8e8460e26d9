//! Session worker
//!
//! The only writer of one session's state. Commands run strictly one after
//! another, and scoring work triggered by an event finishes before the next
//! command is taken, so per-session ordering is the channel order.
//!
//! The aggregate is loaded from the store on the first command and dropped
//! whenever a write fails, so the next command starts from persisted truth.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::router::Router;
use super::Shared;
use crate::error::{MonitorError, MonitorResult, StoreError, StoreResult, VaultError};
use crate::logic::alert::{
    alert_type_for, Alert, AlertDecision, AlertOp, AlertOutcome, AlertSignal, Severity, Trigger, SYSTEM_ACTOR,
};
use crate::logic::audit::{AuditAction, AuditEntry, ResourceType};
use crate::logic::evidence::{CaptureRequest, CollectionMethod, Evidence, EvidenceBundle, EvidencePackage, EvidenceType};
use crate::logic::ingest::{IngestEvent, IngestOutcome, MessageAmended, MessageReceived, ParticipantSeen, SessionEnd};
use crate::logic::notify::{dispatch_alert, OpsCondition};
use crate::logic::retry::retry_with_backoff;
use crate::logic::scoring::{AnalysisResult, AnalysisTarget, ScoreBreakdown};
use crate::logic::store::Insert;
use crate::logic::session::{AmendmentKind, Message, Participant, RiskLevel, SessionState, SessionStatus};

type Reply<T> = oneshot::Sender<MonitorResult<T>>;

pub(crate) enum Command {
    Ingest {
        event: IngestEvent,
        actor: String,
        reply: Reply<IngestOutcome>,
    },
    AlertAction {
        alert_id: Uuid,
        op: AlertOp,
        actor: String,
        reply: Reply<Alert>,
    },
    ResetRisk {
        participant_id: Uuid,
        level: RiskLevel,
        reason: String,
        actor: String,
        reply: Reply<Participant>,
    },
    ExportEvidence {
        alert_id: Uuid,
        actor: String,
        reply: Reply<EvidenceBundle>,
    },
    VerifyEvidence {
        evidence_id: Uuid,
        actor: String,
        reply: Reply<bool>,
    },
    ReadEvidence {
        evidence_id: Uuid,
        purpose: String,
        actor: String,
        reply: Reply<(Evidence, Vec<u8>)>,
    },
    LegalHold {
        evidence_id: Uuid,
        hold: bool,
        reason: Option<String>,
        actor: String,
        reply: Reply<Evidence>,
    },
    /// Close the session as terminated if it went quiet before `cutoff`
    Expire {
        cutoff: DateTime<Utc>,
        actor: String,
        reply: Reply<bool>,
    },
    /// Barrier: replies once everything queued before it has run
    Flush { reply: Reply<()> },
}

impl Command {
    /// Answer without running
    fn fail(self, error: impl Fn() -> MonitorError) {
        match self {
            Command::Ingest { reply, .. } => drop(reply.send(Err(error()))),
            Command::AlertAction { reply, .. } => drop(reply.send(Err(error()))),
            Command::ResetRisk { reply, .. } => drop(reply.send(Err(error()))),
            Command::ExportEvidence { reply, .. } => drop(reply.send(Err(error()))),
            Command::VerifyEvidence { reply, .. } => drop(reply.send(Err(error()))),
            Command::ReadEvidence { reply, .. } => drop(reply.send(Err(error()))),
            Command::LegalHold { reply, .. } => drop(reply.send(Err(error()))),
            Command::Expire { reply, .. } => drop(reply.send(Err(error()))),
            Command::Flush { reply } => drop(reply.send(Err(error()))),
        }
    }
}

/// Work an ingested event leaves for after its reply
enum FollowUp {
    None,
    Score(Message),
    Recompute,
    AnalyzeSession,
}

/// What caused a recomputation
#[derive(Default)]
struct Cause {
    message_id: Option<Uuid>,
    analyses: Vec<AnalysisResult>,
}

// ============================================================================
// LOOP
// ============================================================================

pub(crate) async fn run(session_id: Uuid, generation: u64, mut rx: UnboundedReceiver<Command>, router: Arc<Router>) {
    let shared = router.shared().clone();
    let idle = shared.config.worker_idle;
    let mut worker: Option<SessionWorker> = None;

    loop {
        let command = match tokio::time::timeout(idle, rx.recv()).await {
            Ok(Some(command)) => command,
            Ok(None) => break,
            Err(_) => {
                if router.retire(session_id, generation, &mut rx) {
                    log::debug!("Worker for session {} retired after {:?} idle", session_id, idle);
                    break;
                }
                continue;
            }
        };

        if worker.is_none() {
            match SessionWorker::hydrate(shared.clone(), session_id).await {
                Ok(loaded) => worker = Some(loaded),
                Err(MonitorError::UnknownSession(_)) => {
                    router.detach(session_id, generation, &mut rx);
                    command.fail(|| MonitorError::UnknownSession(session_id));
                    while let Some(queued) = rx.recv().await {
                        queued.fail(|| MonitorError::UnknownSession(session_id));
                    }
                    return;
                }
                Err(e) => {
                    log::error!("Failed to load session {}: {}", session_id, e);
                    let reason = e.to_string();
                    command.fail(|| MonitorError::Storage(StoreError::Unavailable(reason.clone())));
                    continue;
                }
            }
        }

        if let Some(current) = worker.as_mut() {
            if !current.handle(command).await {
                log::warn!("Session {} state dropped after a storage failure; reloading on next command", session_id);
                worker = None;
            }
        }
    }
}

/// Send the reply; false when the failure means state may have diverged
/// from the store
fn settle<T>(reply: Reply<T>, result: MonitorResult<T>) -> bool {
    let healthy = !matches!(
        result,
        Err(MonitorError::Storage(_)) | Err(MonitorError::Vault(VaultError::Storage(_)))
    );
    let _ = reply.send(result);
    healthy
}

// ============================================================================
// WORKER
// ============================================================================

struct SessionWorker {
    shared: Arc<Shared>,
    state: SessionState,
}

impl SessionWorker {
    async fn hydrate(shared: Arc<Shared>, session_id: Uuid) -> MonitorResult<Self> {
        let store = &shared.store;
        let policy = &shared.storage_retry;

        let session = retry_with_backoff(policy, "load session", || store.get_session(session_id))
            .await?
            .ok_or(MonitorError::UnknownSession(session_id))?;
        let participants = retry_with_backoff(policy, "load participants", || store.participants(session_id)).await?;
        let analyses = retry_with_backoff(policy, "load analyses", || store.analyses(session_id)).await?;
        let alerts = retry_with_backoff(policy, "load alerts", || store.alerts_for_session(session_id)).await?;
        let message_count = retry_with_backoff(policy, "count messages", || store.count_messages(session_id)).await?;

        let mut state = SessionState::hydrate(session, participants, &analyses, &alerts);
        state.session.message_count = message_count;
        state.session.participant_count = state.participants().len() as i64;

        log::debug!(
            "Loaded session {} ({} messages, {} analyses, {} alerts)",
            session_id,
            message_count,
            analyses.len(),
            alerts.len()
        );
        Ok(Self { shared, state })
    }

    async fn handle(&mut self, command: Command) -> bool {
        let now = Utc::now();

        match command {
            Command::Ingest { event, actor, reply } => self.ingest(event, &actor, reply, now).await,
            Command::AlertAction {
                alert_id,
                op,
                actor,
                reply,
            } => {
                let result = self.alert_action(alert_id, op, &actor, now).await;
                settle(reply, result)
            }
            Command::ResetRisk {
                participant_id,
                level,
                reason,
                actor,
                reply,
            } => {
                let result = self.reset_risk(participant_id, level, &reason, &actor, now).await;
                settle(reply, result)
            }
            Command::ExportEvidence { alert_id, actor, reply } => {
                let result = self.owned_alert(alert_id).await;
                let result = match result {
                    Ok(_) => self.shared.vault.export(alert_id, &actor, now).await.map_err(Into::into),
                    Err(e) => Err(e),
                };
                settle(reply, result)
            }
            Command::VerifyEvidence {
                evidence_id,
                actor,
                reply,
            } => {
                let result = self
                    .shared
                    .vault
                    .verify_integrity(evidence_id, &actor, now)
                    .await
                    .map_err(Into::into);
                settle(reply, result)
            }
            Command::ReadEvidence {
                evidence_id,
                purpose,
                actor,
                reply,
            } => {
                let result = self
                    .shared
                    .vault
                    .read(evidence_id, &actor, &purpose, now)
                    .await
                    .map_err(Into::into);
                settle(reply, result)
            }
            Command::LegalHold {
                evidence_id,
                hold,
                reason,
                actor,
                reply,
            } => {
                let result = self
                    .shared
                    .vault
                    .set_legal_hold(evidence_id, hold, reason, &actor, now)
                    .await
                    .map_err(Into::into);
                settle(reply, result)
            }
            Command::Expire { cutoff, actor, reply } => {
                let result = self.expire(cutoff, &actor, now).await;
                settle(reply, result)
            }
            Command::Flush { reply } => settle(reply, Ok(())),
        }
    }

    /// Retry a store write with the storage policy
    async fn persist<T, F, Fut>(&self, what: &str, op: F) -> MonitorResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        Ok(retry_with_backoff(&self.shared.storage_retry, what, op).await?)
    }

    async fn save_session(&self) -> MonitorResult<()> {
        let store = &self.shared.store;
        let session = &self.state.session;
        self.persist("update session", || store.update_session(session)).await
    }

    async fn audit(&self, entry: AuditEntry) {
        self.shared.audit.record(entry).await;
    }

    fn session_id(&self) -> Uuid {
        self.state.id()
    }

    fn closed(&self) -> MonitorError {
        MonitorError::Validation(format!("session {} is {}", self.session_id(), self.state.session.status))
    }

    fn ensure_open(&self) -> MonitorResult<()> {
        if self.state.session.is_open() {
            Ok(())
        } else {
            Err(self.closed())
        }
    }

    // ========================================================================
    // INGESTION
    // ========================================================================

    async fn ingest(&mut self, event: IngestEvent, actor: &str, reply: Reply<IngestOutcome>, now: DateTime<Utc>) -> bool {
        let result = match event {
            IngestEvent::MessageReceived(message) => self.accept_message(message, actor, now).await,
            IngestEvent::ParticipantSeen(seen) => self.accept_participant(seen, actor, now).await,
            IngestEvent::MessageAmended(amended) => self.amend_message(amended, actor, now).await,
            IngestEvent::SessionEnd(end) => self.end_session(end, actor, now).await,
            IngestEvent::SessionStart(_) => Err(MonitorError::Validation(
                "session start is not routed to a session".into(),
            )),
        };
        let (result, follow_up) = match result {
            Ok((outcome, follow_up)) => (Ok(outcome), follow_up),
            Err(e) => (Err(e), FollowUp::None),
        };

        // the caller is released before scoring
        if !settle(reply, result) {
            return false;
        }

        let done = match follow_up {
            FollowUp::None => Ok(()),
            FollowUp::Score(message) => self.score_message(message, now).await,
            FollowUp::Recompute => self.recompute(Cause::default(), now).await,
            FollowUp::AnalyzeSession => self.analyze_session(now).await,
        };
        match done {
            Ok(()) => true,
            Err(e) => {
                log::error!("Follow-up work for session {} failed: {}", self.session_id(), e);
                !matches!(e, MonitorError::Storage(_))
            }
        }
    }

    async fn accept_message(
        &mut self,
        received: MessageReceived,
        actor: &str,
        now: DateTime<Utc>,
    ) -> MonitorResult<(IngestOutcome, FollowUp)> {
        let store = &self.shared.store;
        let session_id = self.session_id();
        let dedup_key = Message::dedup_key(
            received.platform_message_id.as_deref(),
            &received.sender_id,
            &received.content_hash,
            received.timestamp,
            self.shared.config.dedup_bucket_secs,
        );

        if !self.state.session.is_open() {
            let existing = self.persist("find message", || store.find_message(session_id, &dedup_key)).await?;
            return match existing {
                Some(message) => Ok((IngestOutcome::Duplicate { resource_id: message.id }, FollowUp::None)),
                None => Err(self.closed()),
            };
        }

        let message = Message {
            id: Uuid::new_v4(),
            session_id,
            platform_message_id: received.platform_message_id,
            sender_id: received.sender_id,
            recipient_id: received.recipient_id,
            content_type: received.content_type,
            content_hash: received.content_hash,
            timestamp: received.timestamp,
            received_at: now,
            dedup_key,
            edited_at: None,
            deleted_at: None,
        };

        let message = match self.persist("insert message", || store.insert_message(&message)).await? {
            Insert::Inserted(message) => message,
            Insert::Existing(existing) => {
                log::debug!("Duplicate message {} in session {}", existing.dedup_key, session_id);
                let resource_id = existing.id;
                if self.state.is_scored(resource_id) {
                    return Ok((IngestOutcome::Duplicate { resource_id }, FollowUp::None));
                }
                // stored by an earlier attempt that failed before scoring
                log::warn!("Message {} in session {} was never scored; scoring on redelivery", resource_id, session_id);
                return Ok((IngestOutcome::Duplicate { resource_id }, FollowUp::Score(existing)));
            }
        };

        self.state.record_message(&message);
        self.save_session().await?;
        self.audit(
            AuditEntry::new(actor, AuditAction::MessageAccepted, ResourceType::Message, message.id)
                .at(now)
                .after(&message),
        )
        .await;

        Ok((IngestOutcome::Accepted { resource_id: message.id }, FollowUp::Score(message)))
    }

    async fn accept_participant(
        &mut self,
        seen: ParticipantSeen,
        actor: &str,
        now: DateTime<Utc>,
    ) -> MonitorResult<(IngestOutcome, FollowUp)> {
        self.ensure_open()?;

        let change = self.state.apply_participant(&seen, seen.seen_at.unwrap_or(now));
        let store = &self.shared.store;
        self.persist("upsert participant", || store.upsert_participant(&change.participant))
            .await?;
        self.save_session().await?;

        let participant = &change.participant;
        let mut entry = AuditEntry::new(actor, AuditAction::ParticipantUpserted, ResourceType::Participant, participant.id)
            .at(now)
            .after(participant);
        if let Some(before) = &change.before {
            entry = entry.before(before);
        }
        self.audit(entry).await;

        let follow_up = if change.risk_raised {
            log::info!(
                "Participant {} in session {} raised to {} risk",
                participant.platform_user_id,
                self.session_id(),
                participant.risk_level
            );
            self.audit(
                AuditEntry::new(actor, AuditAction::ParticipantRiskRaised, ResourceType::Participant, participant.id)
                    .at(now)
                    .before(&change.before.as_ref().map(|p| p.risk_level).unwrap_or_default())
                    .after(&participant.risk_level),
            )
            .await;
            FollowUp::Recompute
        } else {
            FollowUp::None
        };

        Ok((IngestOutcome::Accepted { resource_id: participant.id }, follow_up))
    }

    async fn amend_message(
        &mut self,
        amended: MessageAmended,
        actor: &str,
        now: DateTime<Utc>,
    ) -> MonitorResult<(IngestOutcome, FollowUp)> {
        let store = &self.shared.store;
        let session_id = self.session_id();
        let key = format!("pm:{}", amended.platform_message_id);

        let mut message = self
            .persist("find message", || store.find_message(session_id, &key))
            .await?
            .ok_or_else(|| MonitorError::NotFound(format!("message {}", amended.platform_message_id)))?;

        let marker = match amended.kind {
            AmendmentKind::Edited => &mut message.edited_at,
            AmendmentKind::Deleted => &mut message.deleted_at,
        };
        if marker.is_some() {
            return Ok((IngestOutcome::Duplicate { resource_id: message.id }, FollowUp::None));
        }
        *marker = Some(amended.at);

        self.persist("update message", || store.update_message_markers(&message)).await?;
        self.audit(
            AuditEntry::new(actor, AuditAction::MessageAmended, ResourceType::Message, message.id)
                .at(now)
                .detail(amended.kind.to_string()),
        )
        .await;

        Ok((IngestOutcome::Accepted { resource_id: message.id }, FollowUp::None))
    }

    async fn end_session(
        &mut self,
        end: SessionEnd,
        actor: &str,
        now: DateTime<Utc>,
    ) -> MonitorResult<(IngestOutcome, FollowUp)> {
        let session_id = self.session_id();
        if !self.state.session.is_open() {
            return Ok((IngestOutcome::Duplicate { resource_id: session_id }, FollowUp::None));
        }

        let before = self.state.session.status;
        self.state
            .session
            .close(SessionStatus::Completed, end.ended_at.unwrap_or(now));
        self.save_session().await?;

        log::info!(
            "Session {} ended after {}s (peak risk {:.2})",
            session_id,
            self.state.session.duration_seconds.unwrap_or(0),
            self.state.session.peak_risk_score
        );
        self.audit(
            AuditEntry::new(actor, AuditAction::SessionEnded, ResourceType::Session, session_id)
                .at(now)
                .before(&before)
                .after(&self.state.session),
        )
        .await;

        Ok((IngestOutcome::Accepted { resource_id: session_id }, FollowUp::AnalyzeSession))
    }

    async fn expire(&mut self, cutoff: DateTime<Utc>, actor: &str, now: DateTime<Utc>) -> MonitorResult<bool> {
        if !self.state.session.is_open() || self.state.session.last_activity >= cutoff {
            return Ok(false);
        }

        let last_activity = self.state.session.last_activity;
        self.state.session.close(SessionStatus::Terminated, last_activity);
        self.save_session().await?;

        log::info!("Session {} expired (idle since {})", self.session_id(), last_activity);
        self.audit(
            AuditEntry::new(actor, AuditAction::SessionExpired, ResourceType::Session, self.session_id())
                .at(now)
                .after(&self.state.session),
        )
        .await;
        Ok(true)
    }

    // ========================================================================
    // SCORING
    // ========================================================================

    async fn score_message(&mut self, message: Message, now: DateTime<Utc>) -> MonitorResult<()> {
        let verdicts = self.shared.oracle.analyze_message(&self.state.session, &message).await;
        self.state.mark_scored(message.id);
        let verdicts = match verdicts {
            Ok(verdicts) => verdicts,
            Err(e) => return self.scoring_gap(format!("message {}: {}", message.id, e), now).await,
        };
        if verdicts.is_empty() {
            return Ok(());
        }

        let session_id = self.session_id();
        let mut analyses = Vec::with_capacity(verdicts.len());

        for verdict in verdicts {
            let result = AnalysisResult::from_verdict(session_id, AnalysisTarget::Message(message.id), verdict, now);
            self.store_analysis(&result, now).await?;

            if let Some(level) = result.indicators.sender_risk() {
                self.raise_sender(&message.sender_id, level, now).await?;
            }
            analyses.push(result);
        }

        let cause = Cause {
            message_id: Some(message.id),
            analyses,
        };
        self.recompute(cause, now).await
    }

    /// Session-level analysis on end; stored but kept out of the average
    async fn analyze_session(&mut self, now: DateTime<Utc>) -> MonitorResult<()> {
        let participants = self.state.participants();
        let verdicts = match self
            .shared
            .oracle
            .analyze_session(&self.state.session, &participants)
            .await
        {
            Ok(verdicts) => verdicts,
            Err(e) => return self.scoring_gap(format!("session analysis: {}", e), now).await,
        };

        let session_id = self.session_id();
        for verdict in verdicts {
            let result = AnalysisResult::from_verdict(session_id, AnalysisTarget::Session(session_id), verdict, now);
            self.store_analysis(&result, now).await?;
        }
        Ok(())
    }

    async fn store_analysis(&mut self, result: &AnalysisResult, now: DateTime<Utc>) -> MonitorResult<()> {
        let store = &self.shared.store;
        self.persist("insert analysis", || store.insert_analysis(result)).await?;
        self.state.record_analysis(result);

        self.audit(
            AuditEntry::new(SYSTEM_ACTOR, AuditAction::AnalysisStored, ResourceType::Analysis, result.id)
                .at(now)
                .after(result),
        )
        .await;
        Ok(())
    }

    async fn raise_sender(&mut self, sender_id: &str, level: RiskLevel, now: DateTime<Utc>) -> MonitorResult<()> {
        let Some(change) = self.state.raise_participant_risk(sender_id, level, now) else {
            return Ok(());
        };

        let store = &self.shared.store;
        self.persist("upsert participant", || store.upsert_participant(&change.participant))
            .await?;
        if change.created() {
            self.save_session().await?;
        }

        self.audit(
            AuditEntry::new(
                SYSTEM_ACTOR,
                AuditAction::ParticipantRiskRaised,
                ResourceType::Participant,
                change.participant.id,
            )
            .at(now)
            .before(&change.before.as_ref().map(|p| p.risk_level).unwrap_or_default())
            .after(&change.participant.risk_level),
        )
        .await;
        Ok(())
    }

    /// The oracle could not be reached: keep the stale score and say so
    async fn scoring_gap(&mut self, reason: String, now: DateTime<Utc>) -> MonitorResult<()> {
        let session_id = self.session_id();
        log::error!(target: "ops", "Scoring gap in session {}: {}", session_id, reason);

        self.state.record_gap(reason.clone(), now);
        self.save_session().await?;

        self.audit(
            AuditEntry::new(SYSTEM_ACTOR, AuditAction::ScoringGap, ResourceType::Session, session_id)
                .at(now)
                .failed(reason.clone()),
        )
        .await;
        self.shared
            .notifier
            .operational(&OpsCondition::ScoringGap { session_id, reason })
            .await;
        Ok(())
    }

    async fn recompute(&mut self, cause: Cause, now: DateTime<Utc>) -> MonitorResult<()> {
        let config = &self.shared.config;
        let breakdown = self
            .shared
            .engine
            .score(self.state.message_scores(), &self.state.participant_levels());
        let transition = self
            .state
            .apply_score(&breakdown, config.flagged_score, config.emergency_score);
        self.save_session().await?;

        let session_id = self.session_id();
        log::debug!(
            "Session {} score {:.2} -> {:.2} (peak {:.2})",
            session_id,
            transition.previous_score,
            transition.score,
            self.state.session.peak_risk_score
        );
        self.audit(
            AuditEntry::new(SYSTEM_ACTOR, AuditAction::ScoreRecomputed, ResourceType::Session, session_id)
                .at(now)
                .before(&transition.previous_score)
                .after(&breakdown),
        )
        .await;

        if transition.status_changed {
            log::warn!("Session {} is now {}", session_id, self.state.session.status);
            self.audit(
                AuditEntry::new(SYSTEM_ACTOR, AuditAction::SessionStatusChanged, ResourceType::Session, session_id)
                    .at(now)
                    .after(&self.state.session.status),
            )
            .await;
        }

        let signal = signal_for(cause, breakdown, transition.previous_peak);
        self.evaluate_alerts(signal, now).await
    }

    // ========================================================================
    // ALERTS
    // ========================================================================

    async fn evaluate_alerts(&mut self, signal: AlertSignal, now: DateTime<Utc>) -> MonitorResult<()> {
        let store = &self.shared.store;
        let session_id = self.session_id();
        let alerts = self.persist("load alerts", || store.alerts_for_session(session_id)).await?;
        let active = alerts
            .iter()
            .find(|a| a.alert_type == signal.alert_type && a.is_active());

        let decision = self
            .shared
            .alerts
            .evaluate(&signal, active, self.state.has_alerted(signal.alert_type));

        match decision {
            AlertDecision::Nothing => Ok(()),
            AlertDecision::Update { severity, .. } => match active.cloned() {
                Some(alert) => self.absorb(alert, &signal, severity, now).await,
                None => Ok(()),
            },
            AlertDecision::Open { severity } => {
                let alert = self.shared.alerts.open(&self.state.session, &signal, severity, now);
                match self.persist("insert alert", || store.insert_alert(&alert)).await? {
                    Insert::Inserted(alert) => {
                        self.state.mark_alerted(alert.alert_type);
                        self.announce(&alert, AuditAction::AlertOpened, SYSTEM_ACTOR, now).await;
                        Ok(())
                    }
                    Insert::Existing(current) => self.absorb(current, &signal, severity, now).await,
                }
            }
        }
    }

    async fn absorb(&mut self, mut alert: Alert, signal: &AlertSignal, severity: Severity, now: DateTime<Utc>) -> MonitorResult<()> {
        let before = alert.clone();
        let raised = self.shared.alerts.absorb(&mut alert, signal, severity, now);

        let store = &self.shared.store;
        self.persist("update alert", || store.update_alert(&alert)).await?;
        self.audit(
            AuditEntry::new(SYSTEM_ACTOR, AuditAction::AlertUpdated, ResourceType::Alert, alert.id)
                .at(now)
                .before(&before)
                .after(&alert),
        )
        .await;

        if raised {
            log::warn!("Alert {} raised from {} to {}", alert.id, before.severity, alert.severity);
            dispatch_alert(self.shared.notifier.as_ref(), &alert).await;
        }
        Ok(())
    }

    /// Audit a newly visible alert, seal its evidence, and notify
    async fn announce(&self, alert: &Alert, action: AuditAction, actor: &str, now: DateTime<Utc>) {
        log::warn!(
            "{} {} alert {} for session {} (score {:.2})",
            alert.severity,
            alert.alert_type,
            alert.id,
            alert.session_id,
            alert.risk_score
        );
        self.audit(
            AuditEntry::new(actor, action, ResourceType::Alert, alert.id)
                .at(now)
                .after(alert),
        )
        .await;

        self.seal(alert, action.to_string(), actor, now).await;
        dispatch_alert(self.shared.notifier.as_ref(), alert).await;
    }

    /// Capture the alert's context into the vault. A failed capture is an
    /// operational problem, not a reason to undo the transition.
    async fn seal(&self, alert: &Alert, reason: String, actor: &str, now: DateTime<Utc>) {
        let package = match self.package(alert, reason, now).await {
            Ok(package) => package,
            Err(e) => {
                log::error!(target: "ops", "Cannot assemble evidence for alert {}: {}", alert.id, e);
                return;
            }
        };

        let method = if actor == SYSTEM_ACTOR {
            CollectionMethod::Automated
        } else {
            CollectionMethod::Manual
        };
        let request = CaptureRequest {
            alert_id: alert.id,
            session_id: alert.session_id,
            evidence_type: EvidenceType::ConversationExport,
            method,
            actor: actor.to_string(),
            at: now,
        };

        match self.shared.vault.capture_package(request, &package).await {
            Ok(evidence) => log::info!("Sealed evidence {} for alert {}", evidence.id, alert.id),
            Err(e) => log::error!(target: "ops", "Evidence capture for alert {} failed: {}", alert.id, e),
        }
    }

    async fn package(&self, alert: &Alert, reason: String, now: DateTime<Utc>) -> MonitorResult<EvidencePackage> {
        let store = &self.shared.store;
        let session_id = self.session_id();

        let trigger_message = match alert.trigger.message_id() {
            Some(id) => self.persist("load message", || store.get_message(id)).await?,
            None => None,
        };
        let analysis_ids = alert.trigger.analysis_ids();
        let message_id = alert.trigger.message_id();
        let analyses = self
            .persist("load analyses", || store.analyses(session_id))
            .await?
            .into_iter()
            .filter(|a| analysis_ids.contains(&a.id) || (message_id.is_some() && a.message_id() == message_id))
            .collect();

        Ok(EvidencePackage::V1 {
            reason,
            captured_at: now,
            alert: alert.clone(),
            session: self.state.session.clone(),
            trigger_message,
            analyses,
            participants: self.state.participants(),
        })
    }

    /// Alert lookup restricted to this session
    async fn owned_alert(&self, alert_id: Uuid) -> MonitorResult<Alert> {
        let store = &self.shared.store;
        self.persist("load alert", || store.get_alert(alert_id))
            .await?
            .filter(|a| a.session_id == self.session_id())
            .ok_or_else(|| MonitorError::NotFound(format!("alert {}", alert_id)))
    }

    async fn alert_action(&mut self, alert_id: Uuid, op: AlertOp, actor: &str, now: DateTime<Utc>) -> MonitorResult<Alert> {
        let mut alert = self.owned_alert(alert_id).await?;
        let before = alert.clone();
        let action = AuditAction::from(&op);

        let outcome = match self.shared.alerts.apply(&mut alert, &op, actor, now) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::info!("Rejected {} on alert {} by {}: {}", op.name(), alert_id, actor, e);
                self.audit(
                    AuditEntry::new(actor, action, ResourceType::Alert, alert_id)
                        .at(now)
                        .before(&before)
                        .failed(e.to_string()),
                )
                .await;
                return Err(e);
            }
        };

        let store = &self.shared.store;
        match outcome {
            AlertOutcome::Changed => {
                self.persist("update alert", || store.update_alert(&alert)).await?;
                log::info!("Alert {} {} -> {} by {}", alert_id, before.status, alert.status, actor);
                self.audit(
                    AuditEntry::new(actor, action, ResourceType::Alert, alert_id)
                        .at(now)
                        .before(&before)
                        .after(&alert),
                )
                .await;

                if matches!(op, AlertOp::Escalate { .. }) {
                    self.seal(&alert, action.to_string(), actor, now).await;
                    dispatch_alert(self.shared.notifier.as_ref(), &alert).await;
                }
                Ok(alert)
            }
            AlertOutcome::Reopened(reopened) => {
                let reopened = match self.persist("insert alert", || store.insert_alert(&reopened)).await? {
                    Insert::Inserted(reopened) => reopened,
                    Insert::Existing(current) => {
                        let e = MonitorError::StateConflict {
                            alert_id: current.id,
                            from: current.status,
                            action: op.name(),
                        };
                        self.audit(
                            AuditEntry::new(actor, action, ResourceType::Alert, alert_id)
                                .at(now)
                                .failed(e.to_string()),
                        )
                        .await;
                        return Err(e);
                    }
                };
                self.persist("update alert", || store.update_alert(&alert)).await?;
                self.state.mark_alerted(reopened.alert_type);

                self.announce(&reopened, action, actor, now).await;
                Ok(reopened)
            }
        }
    }

    async fn reset_risk(
        &mut self,
        participant_id: Uuid,
        level: RiskLevel,
        reason: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> MonitorResult<Participant> {
        let (before, after) = self
            .state
            .reset_participant_risk(participant_id, level)
            .ok_or_else(|| MonitorError::NotFound(format!("participant {}", participant_id)))?;

        let store = &self.shared.store;
        self.persist("upsert participant", || store.upsert_participant(&after)).await?;
        self.audit(
            AuditEntry::new(actor, AuditAction::ParticipantRiskReset, ResourceType::Participant, participant_id)
                .at(now)
                .before(&before.risk_level)
                .after(&after.risk_level)
                .detail(reason),
        )
        .await;

        if before.risk_level != after.risk_level {
            self.recompute(Cause::default(), now).await?;
        }
        Ok(after)
    }
}

/// Build the alert signal for a recomputation. The riskiest new analysis
/// names the alert type; participant-only changes fall back to the default.
fn signal_for(cause: Cause, breakdown: ScoreBreakdown, previous_peak: f64) -> AlertSignal {
    let top = cause
        .analyses
        .iter()
        .max_by(|a, b| a.risk_score.total_cmp(&b.risk_score));

    let alert_type = top
        .and_then(|a| a.indicators.suggested_alert_type())
        .unwrap_or_else(|| alert_type_for(top.map(|a| a.analysis_type)));
    let confidence = top.map(|a| a.confidence).unwrap_or(1.0);
    let patterns: BTreeSet<String> = cause
        .analyses
        .iter()
        .flat_map(|a| a.indicators.patterns().iter().cloned())
        .collect();

    AlertSignal {
        alert_type,
        score: breakdown.score,
        previous_peak,
        confidence,
        trigger: Trigger::V1 {
            message_id: cause.message_id,
            analysis_ids: cause.analyses.iter().map(|a| a.id).collect(),
            analysis_type: top.map(|a| a.analysis_type),
            patterns: patterns.into_iter().collect(),
            breakdown,
        },
    }
}
