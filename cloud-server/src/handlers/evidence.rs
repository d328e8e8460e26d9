//! Evidence Vault handlers

use axum::{extract::{State, Path, Query}, Json};
use guardian_core::logic::evidence::{Evidence, MaterialEncoding};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{AppState, AppResult};
use crate::middleware::auth::Caller;

#[derive(Debug, Deserialize, Validate)]
pub struct ReadEvidenceQuery {
    /// Recorded in the custody chain
    #[validate(length(min = 1, max = 500))]
    pub purpose: String,
}

#[derive(Debug, Serialize)]
pub struct EvidenceMaterial {
    pub evidence: Evidence,
    pub material_encoding: MaterialEncoding,
    /// Sealed bytes, encoded as `material_encoding` says
    pub material: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub evidence_id: Uuid,
    pub verified: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LegalHoldRequest {
    pub hold: bool,
    #[validate(length(max = 2000))]
    pub reason: Option<String>,
}

/// Read sealed material; every read is a custody event
pub async fn read(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<Uuid>,
    Query(query): Query<ReadEvidenceQuery>,
) -> AppResult<Json<EvidenceMaterial>> {
    query.validate()?;

    let (evidence, bytes) = state.monitor.read_evidence(&caller, id, query.purpose).await?;
    Ok(Json(EvidenceMaterial {
        evidence,
        material_encoding: MaterialEncoding::Hex,
        material: MaterialEncoding::Hex.encode(&bytes),
    }))
}

/// Re-hash the material and walk the custody chain
pub async fn verify(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<Uuid>,
) -> AppResult<Json<VerifyResponse>> {
    let verified = state.monitor.verify_evidence(&caller, id).await?;
    if !verified {
        tracing::warn!("Evidence {} failed integrity verification", id);
    }

    Ok(Json(VerifyResponse { evidence_id: id, verified }))
}

/// Place or release a legal hold
pub async fn legal_hold(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<Uuid>,
    Json(req): Json<LegalHoldRequest>,
) -> AppResult<Json<Evidence>> {
    req.validate()?;

    let evidence = state.monitor.set_legal_hold(&caller, id, req.hold, req.reason).await?;
    tracing::info!("Legal hold on evidence {} set to {} by {}", id, req.hold, caller.actor);

    Ok(Json(evidence))
}
