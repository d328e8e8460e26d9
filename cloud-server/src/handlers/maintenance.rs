//! Scheduled maintenance handlers, driven by an external scheduler

use axum::{extract::State, Json};
use chrono::Utc;
use guardian_core::logic::maintenance::{ExpiryReport, RetentionReport};

use crate::{AppState, AppResult};
use crate::middleware::auth::Caller;

/// Terminate sessions that have gone quiet
pub async fn expire_idle(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> AppResult<Json<ExpiryReport>> {
    let report = state.monitor.expire_idle_sessions(&caller, Utc::now()).await?;
    Ok(Json(report))
}

/// Purge evidence past retention and compact the audit trail
pub async fn retention(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> AppResult<Json<RetentionReport>> {
    let report = state.monitor.run_retention(&caller, Utc::now()).await?;
    tracing::info!(
        "Retention run: {} evidence purged, {} audit entries dropped",
        report.evidence.purged, report.audit_entries_dropped
    );
    Ok(Json(report))
}
