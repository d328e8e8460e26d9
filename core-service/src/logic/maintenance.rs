//! Scheduled maintenance
//!
//! Idle session expiry, evidence retention and audit compaction. Meant to
//! be driven by an external scheduler holding the `scheduler` role.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::MonitorResult;
use crate::logic::audit::{partition_of, AuditAction, AuditEntry, ResourceType};
use crate::logic::authz::{authorize, Action, CallerContext};
use crate::logic::evidence::PurgeReport;
use crate::logic::monitor::Monitor;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExpiryReport {
    pub expired: usize,
    /// Candidates that saw activity before their worker got to them
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetentionReport {
    pub evidence: PurgeReport,
    /// Oldest audit partition kept
    pub audit_cutoff: String,
    pub audit_entries_dropped: u64,
}

impl Monitor {
    /// Close sessions with no activity for `session_idle_secs` as
    /// `terminated`, ending them at their last activity
    pub async fn expire_idle_sessions(&self, caller: &CallerContext, now: DateTime<Utc>) -> MonitorResult<ExpiryReport> {
        authorize(caller, Action::Maintain, None)?;

        let shared = self.shared();
        let cutoff = now - Duration::seconds(shared.config.session_idle_secs);
        let candidates = shared.store.idle_sessions(cutoff).await?;

        let mut report = ExpiryReport::default();
        for session in candidates {
            // the owning worker re-checks against its own state
            match self.expire_session(session.id, cutoff, &caller.actor).await {
                Ok(true) => report.expired += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    log::warn!("Failed to expire session {}: {}", session.id, e);
                    report.failed += 1;
                }
            }
        }

        if report.expired > 0 {
            log::info!("Expired {} idle session(s)", report.expired);
        }
        Ok(report)
    }

    /// Purge evidence past retention and drop audit partitions older than
    /// `audit_retention_days`. Held evidence is never touched.
    pub async fn run_retention(&self, caller: &CallerContext, now: DateTime<Utc>) -> MonitorResult<RetentionReport> {
        authorize(caller, Action::Maintain, None)?;

        let shared = self.shared();
        let evidence = shared.vault.purge_expired(&caller.actor, now).await?;

        let audit_cutoff = partition_of(&(now - Duration::days(shared.config.audit_retention_days)));
        let audit_entries_dropped = shared.store.drop_audit_partitions_before(&audit_cutoff).await?;
        if audit_entries_dropped > 0 {
            log::info!(
                "Dropped {} audit entries from partitions before {}",
                audit_entries_dropped,
                audit_cutoff
            );
        }

        shared
            .audit
            .record(
                AuditEntry::new(&caller.actor, AuditAction::AuditCompacted, ResourceType::Audit, &audit_cutoff)
                    .at(now)
                    .detail(format!(
                        "{} audit entries dropped, {} evidence purged, {} purge failures",
                        audit_entries_dropped, evidence.purged, evidence.failed
                    )),
            )
            .await;

        Ok(RetentionReport {
            evidence,
            audit_cutoff,
            audit_entries_dropped,
        })
    }
}
