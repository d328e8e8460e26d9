//! Scoring Oracle
//!
//! The AI analysis dependency is opaque: it may be slow and it may fail.
//! [`OracleClient`] wraps any [`ScoringOracle`] with per-attempt deadlines
//! and bounded exponential backoff.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::types::OracleVerdict;
use crate::error::OracleError;
use crate::logic::retry::{retry_with_backoff, RetryPolicy};
use crate::logic::session::{Message, Participant, Session};

#[async_trait]
pub trait ScoringOracle: Send + Sync {
    /// Analyze one message in the context of its session
    async fn analyze_message(&self, session: &Session, message: &Message) -> Result<Vec<OracleVerdict>, OracleError>;

    /// Analyze a whole session (requested when the session ends)
    async fn analyze_session(
        &self,
        session: &Session,
        participants: &[Participant],
    ) -> Result<Vec<OracleVerdict>, OracleError>;
}

/// Retry wrapper around the raw oracle
#[derive(Clone)]
pub struct OracleClient {
    inner: Arc<dyn ScoringOracle>,
    policy: RetryPolicy,
}

impl OracleClient {
    pub fn new(inner: Arc<dyn ScoringOracle>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub async fn analyze_message(&self, session: &Session, message: &Message) -> Result<Vec<OracleVerdict>, OracleError> {
        let verdicts = retry_with_backoff(&self.policy, "message analysis", || {
            self.inner.analyze_message(session, message)
        })
        .await?;
        validate_all(verdicts)
    }

    pub async fn analyze_session(
        &self,
        session: &Session,
        participants: &[Participant],
    ) -> Result<Vec<OracleVerdict>, OracleError> {
        let verdicts = retry_with_backoff(&self.policy, "session analysis", || {
            self.inner.analyze_session(session, participants)
        })
        .await?;
        validate_all(verdicts)
    }
}

fn validate_all(verdicts: Vec<OracleVerdict>) -> Result<Vec<OracleVerdict>, OracleError> {
    for verdict in &verdicts {
        verdict.validate()?;
    }
    Ok(verdicts)
}

// ============================================================================
// STATIC ORACLE
// ============================================================================

/// Oracle answering from a fixed table keyed by content hash.
///
/// Used when no analysis service is configured and in tests.
#[derive(Default)]
pub struct StaticOracle {
    by_content: RwLock<HashMap<String, Vec<OracleVerdict>>>,
    session_verdicts: RwLock<Vec<OracleVerdict>>,
}

impl StaticOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, content_hash: &str, verdicts: Vec<OracleVerdict>) {
        self.by_content.write().insert(content_hash.to_string(), verdicts);
    }

    pub fn set_session_verdicts(&self, verdicts: Vec<OracleVerdict>) {
        *self.session_verdicts.write() = verdicts;
    }
}

#[async_trait]
impl ScoringOracle for StaticOracle {
    async fn analyze_message(&self, _session: &Session, message: &Message) -> Result<Vec<OracleVerdict>, OracleError> {
        Ok(self
            .by_content
            .read()
            .get(&message.content_hash)
            .cloned()
            .unwrap_or_default())
    }

    async fn analyze_session(
        &self,
        _session: &Session,
        _participants: &[Participant],
    ) -> Result<Vec<OracleVerdict>, OracleError> {
        Ok(self.session_verdicts.read().clone())
    }
}
