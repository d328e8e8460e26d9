//! Audit trail handlers

use axum::{extract::{State, Query}, Json};
use chrono::{DateTime, Utc};
use guardian_core::logic::audit::AuditEntry;
use guardian_core::logic::store::AuditFilter;
use serde::Deserialize;
use validator::Validate;

use crate::{AppState, AppResult};
use crate::middleware::auth::Caller;

#[derive(Debug, Default, Deserialize, Validate)]
pub struct AuditQuery {
    pub resource_id: Option<String>,
    pub actor: Option<String>,
    pub since: Option<DateTime<Utc>>,
    #[validate(range(min = 1, max = 1000))]
    pub limit: Option<usize>,
}

impl From<AuditQuery> for AuditFilter {
    fn from(q: AuditQuery) -> Self {
        AuditFilter {
            resource_id: q.resource_id,
            actor: q.actor,
            since: q.since,
            limit: q.limit.unwrap_or(0),
        }
    }
}

/// Query the audit trail, newest first
pub async fn list(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Query(query): Query<AuditQuery>,
) -> AppResult<Json<Vec<AuditEntry>>> {
    query.validate()?;

    let entries = state.monitor.audit_log(&caller, query.into()).await?;
    Ok(Json(entries))
}
