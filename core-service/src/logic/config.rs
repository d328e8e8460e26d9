//! Pipeline configuration.
//!
//! Every policy constant of the pipeline lives here, with defaults taken
//! from [`crate::constants`]. The scoring weights and severity band edges
//! are configuration, not law.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{self, env_or};
use crate::logic::alert::SeverityBands;
use crate::logic::evidence::HashAlgorithm;
use crate::logic::retry::RetryPolicy;
use crate::logic::scoring::ScoringRules;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub scoring: ScoringRules,
    pub bands: SeverityBands,
    pub oracle_retry: RetryPolicy,
    /// Bucket width for deduplicating messages without a platform id
    pub dedup_bucket_secs: i64,
    /// Session score at which an open session becomes `flagged`
    pub flagged_score: f64,
    /// Session score at which an open session becomes `emergency`
    pub emergency_score: f64,
    pub session_idle_secs: i64,
    pub worker_idle: Duration,
    pub hash_algorithm: HashAlgorithm,
    pub audit_retention_days: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringRules::default(),
            bands: SeverityBands::default(),
            oracle_retry: RetryPolicy::default(),
            dedup_bucket_secs: constants::DEFAULT_DEDUP_BUCKET_SECS,
            flagged_score: constants::DEFAULT_FLAGGED_SCORE,
            emergency_score: constants::DEFAULT_EMERGENCY_SCORE,
            session_idle_secs: constants::DEFAULT_SESSION_IDLE_SECS,
            worker_idle: Duration::from_secs(constants::DEFAULT_WORKER_IDLE_SECS),
            hash_algorithm: HashAlgorithm::Sha256,
            audit_retention_days: constants::DEFAULT_AUDIT_RETENTION_DAYS,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from `GUARDIAN_*` environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let scoring = ScoringRules::with_weights(
            env_or("GUARDIAN_MESSAGE_WEIGHT", defaults.scoring.message_weight),
            env_or("GUARDIAN_PARTICIPANT_WEIGHT", defaults.scoring.participant_weight),
        )
        .unwrap_or_else(|reason| {
            log::warn!("Ignoring configured scoring weights: {}", reason);
            ScoringRules::default()
        });

        let bands = SeverityBands {
            emergency: env_or("GUARDIAN_BAND_EMERGENCY", defaults.bands.emergency),
            critical: env_or("GUARDIAN_BAND_CRITICAL", defaults.bands.critical),
            high: env_or("GUARDIAN_BAND_HIGH", defaults.bands.high),
            medium: env_or("GUARDIAN_BAND_MEDIUM", defaults.bands.medium),
        };
        let bands = if bands.is_ordered() {
            bands
        } else {
            log::warn!("Ignoring configured severity bands: edges must be ascending within [0, 10]");
            SeverityBands::default()
        };

        let oracle_retry = RetryPolicy {
            max_attempts: env_or("GUARDIAN_ORACLE_ATTEMPTS", defaults.oracle_retry.max_attempts).max(1),
            attempt_timeout: Duration::from_millis(env_or(
                "GUARDIAN_ORACLE_DEADLINE_MS",
                defaults.oracle_retry.attempt_timeout.as_millis() as u64,
            )),
            initial_backoff: Duration::from_millis(env_or(
                "GUARDIAN_ORACLE_BACKOFF_MS",
                defaults.oracle_retry.initial_backoff.as_millis() as u64,
            )),
            ..defaults.oracle_retry.clone()
        };

        let hash_algorithm = std::env::var("GUARDIAN_HASH_ALGORITHM")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.hash_algorithm);

        Self {
            scoring,
            bands,
            oracle_retry,
            dedup_bucket_secs: env_or("GUARDIAN_DEDUP_BUCKET_SECS", defaults.dedup_bucket_secs).max(1),
            flagged_score: env_or("GUARDIAN_FLAGGED_SCORE", defaults.flagged_score),
            emergency_score: env_or("GUARDIAN_EMERGENCY_SCORE", defaults.emergency_score),
            session_idle_secs: env_or("GUARDIAN_SESSION_IDLE_SECS", defaults.session_idle_secs),
            worker_idle: Duration::from_secs(env_or(
                "GUARDIAN_WORKER_IDLE_SECS",
                defaults.worker_idle.as_secs(),
            )),
            hash_algorithm,
            audit_retention_days: env_or("GUARDIAN_AUDIT_RETENTION_DAYS", defaults.audit_retention_days),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_policy() {
        let config = PipelineConfig::default();
        assert_eq!(config.scoring.message_weight, 0.7);
        assert_eq!(config.scoring.participant_weight, 0.3);
        assert_eq!(config.bands.critical, 8.5);
        assert_eq!(config.hash_algorithm, HashAlgorithm::Sha256);
        assert!(config.bands.is_ordered());
    }
}
