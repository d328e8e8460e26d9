//! Error taxonomy for the monitoring pipeline.
//!
//! Duplicate deliveries are not errors; they surface as
//! [`crate::logic::ingest::IngestOutcome::Duplicate`].

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::logic::alert::AlertStatus;

pub type MonitorResult<T> = Result<T, MonitorError>;
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage conflict: {0}")]
    Conflict(String),

    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, Error)]
pub enum OracleError {
    #[error("scoring oracle timed out after {0:?}")]
    Timeout(Duration),

    #[error("scoring oracle unavailable: {0}")]
    Unavailable(String),

    #[error("scoring oracle returned an invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("evidence {0} not found")]
    NotFound(Uuid),

    #[error("blob store error: {0}")]
    Blob(String),

    #[error("evidence serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("evidence {0} is under legal hold")]
    LegalHold(Uuid),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unknown session {0}")]
    UnknownSession(Uuid),

    #[error("session start {start} precedes the child's birth date {birth}")]
    BirthBound { start: DateTime<Utc>, birth: NaiveDate },

    #[error("alert {alert_id} is {from}; cannot {action}")]
    StateConflict {
        alert_id: Uuid,
        from: AlertStatus,
        action: &'static str,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("access denied: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("session worker for {0} is unavailable")]
    WorkerUnavailable(Uuid),
}

/// Errors that a bounded retry loop is allowed to retry
pub trait Transient {
    fn is_transient(&self) -> bool;
    fn timed_out(after: Duration) -> Self;
}

impl Transient for OracleError {
    fn is_transient(&self) -> bool {
        !matches!(self, OracleError::InvalidResponse(_))
    }

    fn timed_out(after: Duration) -> Self {
        OracleError::Timeout(after)
    }
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }

    fn timed_out(after: Duration) -> Self {
        StoreError::Unavailable(format!("timed out after {:?}", after))
    }
}

impl MonitorError {
    /// Whether the caller may safely retry the same request later
    pub fn is_retryable(&self) -> bool {
        match self {
            MonitorError::Storage(e) => e.is_transient(),
            MonitorError::Vault(VaultError::Storage(e)) => e.is_transient(),
            MonitorError::WorkerUnavailable(_) => true,
            _ => false,
        }
    }
}
