//! Session handlers

use axum::{extract::{State, Path}, Json};
use guardian_core::logic::alert::Alert;
use guardian_core::logic::monitor::SessionView;
use guardian_core::logic::session::{Participant, RiskLevel};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{AppState, AppResult};
use crate::middleware::auth::Caller;

#[derive(Debug, Deserialize, Validate)]
pub struct ResetRiskRequest {
    pub risk_level: RiskLevel,
    #[validate(length(min = 1, max = 2000))]
    pub reason: String,
}

/// Get session with its participants
pub async fn get(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SessionView>> {
    let view = state.monitor.session(&caller, id).await?;
    Ok(Json(view))
}

/// List alerts raised for a session
pub async fn alerts(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Alert>>> {
    let alerts = state.monitor.session_alerts(&caller, id).await?;
    Ok(Json(alerts))
}

/// Reviewer override of a participant's risk level
pub async fn reset_participant_risk(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((id, participant_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<ResetRiskRequest>,
) -> AppResult<Json<Participant>> {
    req.validate()?;

    let participant = state
        .monitor
        .reset_participant_risk(&caller, id, participant_id, req.risk_level, req.reason)
        .await?;

    tracing::info!(
        "Participant {} of session {} reset to {} by {}",
        participant_id, id, participant.risk_level, caller.actor
    );
    Ok(Json(participant))
}
