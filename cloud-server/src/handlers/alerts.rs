//! Alert handlers

use axum::{extract::{State, Path}, Json};
use guardian_core::logic::alert::{Alert, AlertOp, Severity};
use guardian_core::logic::evidence::EvidenceBundle;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{AppState, AppResult, AppError};
use crate::middleware::auth::Caller;

/// Optional body for lifecycle actions; which fields matter depends on the action
#[derive(Debug, Default, Deserialize, Validate)]
pub struct AlertActionRequest {
    #[validate(length(max = 4000))]
    pub notes: Option<String>,
    #[validate(length(max = 4000))]
    pub reason: Option<String>,
    #[serde(default)]
    pub false_positive: bool,
    #[validate(length(min = 1, max = 255))]
    pub target: Option<String>,
    #[validate(length(max = 255))]
    pub reference: Option<String>,
    pub severity: Option<Severity>,
}

impl AlertActionRequest {
    /// Map a path action and body onto a lifecycle operation
    pub fn into_op(self, action: &str) -> Result<AlertOp, AppError> {
        let op = match action {
            "acknowledge" => AlertOp::Acknowledge { notes: self.notes },
            "investigate" => AlertOp::Investigate { notes: self.notes },
            "resolve" => AlertOp::Resolve {
                false_positive: self.false_positive,
                reason: self.reason,
            },
            "dismiss" => AlertOp::Dismiss { reason: self.reason },
            "escalate" => AlertOp::Escalate {
                target: self
                    .target
                    .ok_or_else(|| AppError::ValidationError("escalate requires a target".to_string()))?,
                reference: self.reference,
            },
            "reassess" => AlertOp::Reassess {
                severity: self
                    .severity
                    .ok_or_else(|| AppError::ValidationError("reassess requires a severity".to_string()))?,
                reason: self.reason,
            },
            "reopen" => AlertOp::Reopen {
                reason: self
                    .reason
                    .ok_or_else(|| AppError::ValidationError("reopen requires a reason".to_string()))?,
            },
            other => return Err(AppError::NotFound(format!("Unknown alert action '{}'", other))),
        };
        Ok(op)
    }
}

/// Get single alert
pub async fn get(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Alert>> {
    let alert = state.monitor.alert(&caller, id).await?;
    Ok(Json(alert))
}

/// Apply a lifecycle action; reopen answers with the new alert
pub async fn act(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((id, action)): Path<(Uuid, String)>,
    body: Option<Json<AlertActionRequest>>,
) -> AppResult<Json<Alert>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    req.validate()?;
    let op = req.into_op(&action)?;

    let alert = state.monitor.alert_action(&caller, id, op).await?;
    tracing::info!("Alert {} {} by {} -> {}", id, action, caller.actor, alert.status);

    Ok(Json(alert))
}

/// Export every evidence item sealed for an alert
pub async fn export(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<Uuid>,
) -> AppResult<Json<EvidenceBundle>> {
    let bundle = state.monitor.export_evidence(&caller, id).await?;
    Ok(Json(bundle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalate_requires_target() {
        let err = AlertActionRequest::default().into_op("escalate");
        assert!(matches!(err, Err(AppError::ValidationError(_))));

        let req = AlertActionRequest {
            target: Some("law_enforcement".into()),
            ..Default::default()
        };
        assert!(matches!(req.into_op("escalate"), Ok(AlertOp::Escalate { .. })));
    }

    #[test]
    fn test_unknown_action_is_not_found() {
        let err = AlertActionRequest::default().into_op("delete");
        assert!(matches!(err, Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_resolve_carries_false_positive() {
        let req = AlertActionRequest {
            false_positive: true,
            reason: Some("sibling banter".into()),
            ..Default::default()
        };
        match req.into_op("resolve") {
            Ok(AlertOp::Resolve { false_positive, reason }) => {
                assert!(false_positive);
                assert_eq!(reason.as_deref(), Some("sibling banter"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
