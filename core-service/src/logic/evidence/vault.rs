//! Evidence Vault
//!
//! Seals material at capture time, keeps a hash-linked custody chain and
//! fails closed on any integrity mismatch.

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use uuid::Uuid;

use super::blob::BlobStore;
use super::hashing::{custody_hash, verify_chain, HashAlgorithm};
use super::types::{
    BundleItem, CollectionMethod, CustodyAction, CustodyEntry, Evidence, EvidenceBundle, EvidencePackage,
    EvidenceType, MaterialEncoding, PurgeReport,
};
use crate::error::VaultError;
use crate::logic::audit::{AuditAction, AuditEntry, AuditRecorder, ResourceType};
use crate::logic::notify::{Notifier, OpsCondition};
use crate::logic::store::Store;

pub type VaultResult<T> = Result<T, VaultError>;

/// What a capture seals, besides the bytes
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub alert_id: Uuid,
    pub session_id: Uuid,
    pub evidence_type: EvidenceType,
    pub method: CollectionMethod,
    pub actor: String,
    pub at: DateTime<Utc>,
}

pub struct EvidenceVault {
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStore>,
    audit: Arc<AuditRecorder>,
    notifier: Arc<dyn Notifier>,
    algorithm: HashAlgorithm,
}

impl EvidenceVault {
    pub fn new(
        store: Arc<dyn Store>,
        blobs: Arc<dyn BlobStore>,
        audit: Arc<AuditRecorder>,
        notifier: Arc<dyn Notifier>,
        algorithm: HashAlgorithm,
    ) -> Self {
        Self {
            store,
            blobs,
            audit,
            notifier,
            algorithm,
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    // ========================================================================
    // CAPTURE
    // ========================================================================

    /// Hash the exact bytes, store them, and open the custody chain
    pub async fn capture(&self, request: CaptureRequest, material: &[u8]) -> VaultResult<Evidence> {
        let id = Uuid::new_v4();
        let content_hash = self.algorithm.digest(material);
        let material_ref = id.to_string();

        self.blobs.put(&material_ref, material).await?;

        let mut evidence = Evidence {
            id,
            alert_id: request.alert_id,
            session_id: request.session_id,
            evidence_type: request.evidence_type,
            collection_method: request.method,
            collected_by: request.actor.clone(),
            collected_at: request.at,
            hash_algorithm: self.algorithm,
            content_hash,
            material_ref,
            size_bytes: material.len() as i64,
            custody: vec![],
            integrity_verified: true,
            integrity_checked_at: Some(request.at),
            legal_hold: false,
            legal_hold_reason: None,
            retention_until: request.evidence_type.retention_until(request.at),
        };
        append_custody(&mut evidence, &request.actor, CustodyAction::Collected, None, request.at);

        if let Err(e) = self.store.insert_evidence(&evidence).await {
            // best effort: the blob without a record is unreachable anyway
            let _ = self.blobs.delete(&evidence.material_ref).await;
            self.audit
                .record(
                    AuditEntry::new(&request.actor, AuditAction::EvidenceCaptured, ResourceType::Evidence, id)
                        .at(request.at)
                        .failed(e.to_string()),
                )
                .await;
            return Err(e.into());
        }

        log::info!(
            "Captured evidence {} for alert {} ({} bytes, {})",
            evidence.id,
            evidence.alert_id,
            evidence.size_bytes,
            self.algorithm
        );
        self.audit
            .record(
                AuditEntry::new(&request.actor, AuditAction::EvidenceCaptured, ResourceType::Evidence, id)
                    .at(request.at)
                    .after(&evidence),
            )
            .await;

        Ok(evidence)
    }

    /// Serialize a package and capture it
    pub async fn capture_package(&self, request: CaptureRequest, package: &EvidencePackage) -> VaultResult<Evidence> {
        let bytes = serde_json::to_vec(package)?;
        self.capture(request, &bytes).await
    }

    // ========================================================================
    // VERIFY
    // ========================================================================

    /// Recompute the material hash and walk the custody chain.
    ///
    /// True only when both match. A mismatch or missing material marks the
    /// evidence suspect and raises an operational alert.
    pub async fn verify_integrity(&self, evidence_id: Uuid, actor: &str, now: DateTime<Utc>) -> VaultResult<bool> {
        let mut evidence = self.load(evidence_id).await?;
        let before = evidence.clone();

        let bytes = self.blobs.get(&evidence.material_ref).await?;
        let failure = integrity_failure(&evidence, bytes.as_deref());

        let ok = failure.is_none();
        evidence.integrity_verified = ok;
        evidence.integrity_checked_at = Some(now);
        let action = if ok {
            CustodyAction::Verified
        } else {
            CustodyAction::VerificationFailed
        };
        append_custody(&mut evidence, actor, action, failure.clone(), now);
        self.store.update_evidence(&evidence).await?;

        let mut entry = AuditEntry::new(actor, AuditAction::EvidenceVerified, ResourceType::Evidence, evidence_id)
            .at(now)
            .before(&before.integrity_verified)
            .after(&ok);

        if let Some(reason) = failure {
            self.raise_integrity_failure(&evidence, &reason).await;
            entry = entry.detail(reason);
        }
        self.audit.record(entry).await;

        Ok(ok)
    }

    // ========================================================================
    // ACCESS
    // ========================================================================

    /// Return the material; every read is a custody event
    pub async fn read(
        &self,
        evidence_id: Uuid,
        actor: &str,
        purpose: &str,
        now: DateTime<Utc>,
    ) -> VaultResult<(Evidence, Vec<u8>)> {
        let mut evidence = self.load(evidence_id).await?;
        let bytes = self
            .blobs
            .get(&evidence.material_ref)
            .await?
            .ok_or_else(|| VaultError::Blob(format!("material for {} is missing", evidence_id)))?;

        append_custody(&mut evidence, actor, CustodyAction::Accessed, Some(purpose.to_string()), now);
        self.store.update_evidence(&evidence).await?;
        self.audit
            .record(
                AuditEntry::new(actor, AuditAction::EvidenceAccessed, ResourceType::Evidence, evidence_id)
                    .at(now)
                    .detail(purpose),
            )
            .await;

        Ok((evidence, bytes))
    }

    /// Bundle every item of an alert with its full custody chain
    pub async fn export(&self, alert_id: Uuid, actor: &str, now: DateTime<Utc>) -> VaultResult<EvidenceBundle> {
        let items = self.store.evidence_for_alert(alert_id).await?;
        let mut bundle = EvidenceBundle {
            alert_id,
            exported_at: now,
            exported_by: actor.to_string(),
            items: Vec::with_capacity(items.len()),
        };

        for mut evidence in items {
            // re-hash exactly what goes into the bundle
            let bytes = self.blobs.get(&evidence.material_ref).await?;
            let failure = integrity_failure(&evidence, bytes.as_deref());
            let bytes = bytes.unwrap_or_default();

            if let Some(reason) = &failure {
                let before = evidence.integrity_verified;
                evidence.integrity_verified = false;
                evidence.integrity_checked_at = Some(now);
                append_custody(&mut evidence, actor, CustodyAction::VerificationFailed, Some(reason.clone()), now);
                self.raise_integrity_failure(&evidence, reason).await;
                self.audit
                    .record(
                        AuditEntry::new(actor, AuditAction::EvidenceVerified, ResourceType::Evidence, evidence.id)
                            .at(now)
                            .before(&before)
                            .after(&false)
                            .detail(reason.as_str()),
                    )
                    .await;
            }

            append_custody(&mut evidence, actor, CustodyAction::Exported, None, now);
            self.store.update_evidence(&evidence).await?;

            bundle.items.push(BundleItem {
                evidence_id: evidence.id,
                evidence_type: evidence.evidence_type,
                algorithm: evidence.hash_algorithm,
                content_hash: evidence.content_hash.clone(),
                collected_at: evidence.collected_at,
                integrity_verified: evidence.integrity_verified,
                legal_hold: evidence.legal_hold,
                custody: evidence.custody.clone(),
                material_encoding: MaterialEncoding::Hex,
                material: MaterialEncoding::Hex.encode(&bytes),
            });
        }

        self.audit
            .record(
                AuditEntry::new(actor, AuditAction::EvidenceExported, ResourceType::Alert, alert_id)
                    .at(now)
                    .detail(format!("{} item(s)", bundle.items.len())),
            )
            .await;

        Ok(bundle)
    }

    // ========================================================================
    // LEGAL HOLD & RETENTION
    // ========================================================================

    pub async fn set_legal_hold(
        &self,
        evidence_id: Uuid,
        hold: bool,
        reason: Option<String>,
        actor: &str,
        now: DateTime<Utc>,
    ) -> VaultResult<Evidence> {
        let mut evidence = self.load(evidence_id).await?;
        if evidence.legal_hold == hold {
            return Ok(evidence);
        }
        let before = evidence.legal_hold;

        evidence.legal_hold = hold;
        evidence.legal_hold_reason = if hold { reason.clone() } else { None };
        let action = if hold {
            CustodyAction::LegalHoldApplied
        } else {
            CustodyAction::LegalHoldReleased
        };
        append_custody(&mut evidence, actor, action, reason, now);
        self.store.update_evidence(&evidence).await?;

        self.audit
            .record(
                AuditEntry::new(actor, AuditAction::EvidenceLegalHold, ResourceType::Evidence, evidence_id)
                    .at(now)
                    .before(&before)
                    .after(&hold),
            )
            .await;

        Ok(evidence)
    }

    /// Delete evidence past retention. Legal hold is never purged.
    pub async fn purge_expired(&self, actor: &str, now: DateTime<Utc>) -> VaultResult<PurgeReport> {
        let mut report = PurgeReport::default();

        for evidence in self.store.expired_evidence(now).await? {
            if !evidence.is_expired(now) {
                continue;
            }

            let result = match self.store.delete_evidence(evidence.id).await {
                Ok(()) => self.blobs.delete(&evidence.material_ref).await,
                Err(e) => Err(e.into()),
            };

            let entry = AuditEntry::new(actor, AuditAction::EvidencePurged, ResourceType::Evidence, evidence.id)
                .at(now)
                .before(&evidence);
            match result {
                Ok(()) => {
                    report.purged += 1;
                    self.audit.record(entry).await;
                }
                Err(e) => {
                    log::warn!("Failed to purge evidence {}: {}", evidence.id, e);
                    report.failed += 1;
                    self.audit.record(entry.failed(e.to_string())).await;
                }
            }
        }

        if report.purged > 0 {
            log::info!("Purged {} expired evidence item(s)", report.purged);
        }
        Ok(report)
    }

    async fn raise_integrity_failure(&self, evidence: &Evidence, reason: &str) {
        log::error!(target: "ops", "Evidence {} failed integrity check: {}", evidence.id, reason);
        self.notifier
            .operational(&OpsCondition::IntegrityFailure {
                evidence_id: evidence.id,
                alert_id: evidence.alert_id,
                reason: reason.to_string(),
            })
            .await;
    }

    async fn load(&self, evidence_id: Uuid) -> VaultResult<Evidence> {
        self.store
            .get_evidence(evidence_id)
            .await?
            .ok_or(VaultError::NotFound(evidence_id))
    }
}

/// Why the material or the chain no longer proves itself; `None` when both check out
fn integrity_failure(evidence: &Evidence, material: Option<&[u8]>) -> Option<String> {
    let bytes = match material {
        Some(bytes) => bytes,
        None => return Some("material missing from blob store".to_string()),
    };
    let fresh = evidence.hash_algorithm.digest(bytes);
    if fresh != evidence.content_hash {
        Some(format!("content hash mismatch (stored {}, fresh {})", evidence.content_hash, fresh))
    } else if let Err(seq) = verify_chain(&evidence.content_hash, &evidence.custody) {
        Some(format!("custody chain broken at entry {}", seq))
    } else {
        None
    }
}

/// Append one link to the custody chain
fn append_custody(evidence: &mut Evidence, actor: &str, action: CustodyAction, note: Option<String>, at: DateTime<Utc>) {
    // storage keeps microseconds; hash what will be read back
    let at = at.trunc_subsecs(6);
    let sequence = evidence.custody.len() as u32;
    let previous_hash = evidence
        .custody
        .last()
        .map(|e| e.entry_hash.clone())
        .unwrap_or_else(|| evidence.content_hash.clone());
    let entry_hash = custody_hash(&previous_hash, sequence, actor, action, &at, note.as_deref());

    evidence.custody.push(CustodyEntry {
        sequence,
        actor: actor.to_string(),
        action,
        at,
        note,
        previous_hash,
        entry_hash,
    });
}
