//! Ingestion Gateway handlers

use axum::{extract::State, Json};
use guardian_core::logic::authz::{authorize, Action};
use guardian_core::logic::ingest::{IngestEvent, IngestOutcome};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{AppState, AppResult};
use crate::middleware::auth::Caller;

#[derive(Debug, Deserialize, Validate)]
pub struct IngestRequest {
    #[validate(length(min = 1, max = 500))]
    pub events: Vec<IngestEvent>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub accepted: usize,
    pub duplicates: usize,
    pub rejected: usize,
    /// One per submitted event, in order
    pub outcomes: Vec<IngestOutcome>,
}

impl From<Vec<IngestOutcome>> for IngestResponse {
    fn from(outcomes: Vec<IngestOutcome>) -> Self {
        let accepted = outcomes.iter().filter(|o| o.is_accepted()).count();
        let duplicates = outcomes.iter().filter(|o| o.is_duplicate()).count();
        Self {
            accepted,
            duplicates,
            rejected: outcomes.len() - accepted - duplicates,
            outcomes,
        }
    }
}

/// Submit a batch of events; each one gets its own outcome
pub async fn submit(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(req): Json<IngestRequest>,
) -> AppResult<Json<IngestResponse>> {
    // the whole batch is refused for callers that may not ingest
    authorize(&caller, Action::Ingest, None)?;
    req.validate()?;

    let outcomes = state.monitor.ingest_batch(&caller, req.events).await;
    let response = IngestResponse::from(outcomes);

    tracing::debug!(
        "Ingest from {}: {} accepted, {} duplicate, {} rejected",
        caller.actor,
        response.accepted,
        response.duplicates,
        response.rejected
    );

    Ok(Json(response))
}
