//! Configuration module

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL; the in-memory store is used without one
    pub database_url: Option<String>,

    /// Server port
    pub port: u16,

    /// HS256 secret for caller tokens
    pub jwt_secret: String,

    /// Base URL of the external analysis service
    pub oracle_url: Option<String>,

    /// Per-request deadline for outbound HTTP calls
    pub http_timeout: Duration,

    /// Notification webhook; notifications are only logged without one
    pub notify_webhook_url: Option<String>,

    /// Where evidence material is written
    pub evidence_dir: PathBuf,

    /// Extra JSONL copy of the audit trail
    pub audit_log_dir: Option<PathBuf>,

    /// Environment (development, production)
    pub environment: String,

    /// `json` for structured logs, anything else for text
    pub log_format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),

            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),

            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| "guardian-dev-secret-change-in-production".to_string()),

            oracle_url: env::var("ORACLE_URL").ok().filter(|s| !s.is_empty()),

            http_timeout: Duration::from_millis(
                env::var("HTTP_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5_000),
            ),

            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL").ok().filter(|s| !s.is_empty()),

            evidence_dir: env::var("EVIDENCE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| guardian_core::constants::data_dir().join("evidence")),

            audit_log_dir: env::var("AUDIT_LOG_DIR").ok().map(PathBuf::from),

            environment: env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),

            log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string()),
        }
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Configuration for in-process tests
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            database_url: None,
            port: 0,
            jwt_secret: "test-secret".to_string(),
            oracle_url: None,
            http_timeout: Duration::from_secs(1),
            notify_webhook_url: None,
            evidence_dir: PathBuf::from("."),
            audit_log_dir: None,
            environment: "test".to_string(),
            log_format: "text".to_string(),
        }
    }
}
