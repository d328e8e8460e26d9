//! Central Configuration Constants
//!
//! Single source of truth for all policy defaults. Every value here can be
//! overridden through a `GUARDIAN_*` environment variable, see
//! [`crate::logic::config::PipelineConfig::from_env`].

/// Weight of the mean per-message risk in the session score
pub const DEFAULT_MESSAGE_WEIGHT: f64 = 0.7;

/// Weight of the highest participant risk in the session score
pub const DEFAULT_PARTICIPANT_WEIGHT: f64 = 0.3;

/// Session risk score bounds
pub const MIN_RISK_SCORE: f64 = 0.0;
pub const MAX_RISK_SCORE: f64 = 10.0;

/// Severity band lower edges (inclusive)
pub const DEFAULT_EMERGENCY_BAND: f64 = 9.5;
pub const DEFAULT_CRITICAL_BAND: f64 = 8.5;
pub const DEFAULT_HIGH_BAND: f64 = 6.0;
pub const DEFAULT_MEDIUM_BAND: f64 = 3.0;

/// Session status thresholds
pub const DEFAULT_FLAGGED_SCORE: f64 = 5.0;
pub const DEFAULT_EMERGENCY_SCORE: f64 = 8.0;

/// Oracle retry policy
pub const DEFAULT_ORACLE_ATTEMPTS: u32 = 3;
pub const DEFAULT_ORACLE_DEADLINE_MS: u64 = 5_000;
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 200;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 2_000;

/// Messages without a platform id collapse into buckets of this width
pub const DEFAULT_DEDUP_BUCKET_SECS: i64 = 5;

/// Open sessions with no activity for this long are terminated by the scheduler
pub const DEFAULT_SESSION_IDLE_SECS: i64 = 30 * 60;

/// Session workers with an empty queue for this long are evicted
pub const DEFAULT_WORKER_IDLE_SECS: u64 = 5 * 60;

/// Accepted clock skew for event timestamps in the future
pub const MAX_CLOCK_SKEW_SECS: i64 = 5 * 60;

/// Audit partitions older than this are compacted
pub const DEFAULT_AUDIT_RETENTION_DAYS: i64 = 400;

/// Recent audit entries kept in memory
pub const AUDIT_RING_SIZE: usize = 1_000;

/// App name
pub const APP_NAME: &str = "SafeGuardian";

// ============================================
// Helper functions to read from env with fallback
// ============================================

/// Read a parsable value from the environment, falling back to `default`
pub fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Default directory for file-backed sinks
pub fn data_dir() -> std::path::PathBuf {
    std::env::var("GUARDIAN_DATA_DIR")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::data_local_dir()
                .unwrap_or_else(|| std::path::PathBuf::from("."))
                .join(APP_NAME)
        })
}
