//! Database module - PostgreSQL connection and migrations
//!
//! Records are stored whole in a `data JSONB` column; only the columns the
//! natural keys and the queries need are broken out.

use sqlx::{postgres::PgPoolOptions, PgPool};

/// Create database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Multiple statements need the simple query protocol
    sqlx::raw_sql(SCHEMA_SQL)
        .execute(pool)
        .await?;

    tracing::info!("Database schema applied successfully");
    Ok(())
}

/// Database schema SQL
const SCHEMA_SQL: &str = r#"
-- Monitored sessions
CREATE TABLE IF NOT EXISTS sessions (
    id UUID PRIMARY KEY,
    child_id UUID NOT NULL,
    platform_connection_id UUID NOT NULL,
    is_open BOOLEAN NOT NULL,
    last_activity TIMESTAMPTZ NOT NULL,
    data JSONB NOT NULL
);

-- Participants, one row per (session, platform user)
CREATE TABLE IF NOT EXISTS participants (
    id UUID PRIMARY KEY,
    session_id UUID NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    platform_user_id VARCHAR(255) NOT NULL,
    first_interaction TIMESTAMPTZ NOT NULL,
    data JSONB NOT NULL,
    UNIQUE (session_id, platform_user_id)
);

-- Message metadata; content is never stored, only its hash
CREATE TABLE IF NOT EXISTS messages (
    id UUID PRIMARY KEY,
    session_id UUID NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    dedup_key VARCHAR(512) NOT NULL,
    data JSONB NOT NULL,
    UNIQUE (session_id, dedup_key)
);

-- Oracle verdicts
CREATE TABLE IF NOT EXISTS analysis_results (
    id UUID PRIMARY KEY,
    session_id UUID NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    processed_at TIMESTAMPTZ NOT NULL,
    data JSONB NOT NULL
);

-- Alerts
CREATE TABLE IF NOT EXISTS alerts (
    id UUID PRIMARY KEY,
    session_id UUID NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    alert_type VARCHAR(64) NOT NULL,
    is_active BOOLEAN NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    data JSONB NOT NULL
);

-- Evidence records; material lives in the blob store
CREATE TABLE IF NOT EXISTS evidence (
    id UUID PRIMARY KEY,
    alert_id UUID NOT NULL REFERENCES alerts(id),
    collected_at TIMESTAMPTZ NOT NULL,
    legal_hold BOOLEAN NOT NULL DEFAULT false,
    retention_until TIMESTAMPTZ NOT NULL,
    custody_len INT NOT NULL,
    data JSONB NOT NULL
);

-- Append-only audit trail, compacted by month
CREATE TABLE IF NOT EXISTS audit_log (
    id UUID PRIMARY KEY,
    partition CHAR(7) NOT NULL,
    at TIMESTAMPTZ NOT NULL,
    actor VARCHAR(255) NOT NULL,
    resource_id VARCHAR(255) NOT NULL,
    data JSONB NOT NULL
);

-- Natural keys
CREATE UNIQUE INDEX IF NOT EXISTS uq_sessions_open_connection
    ON sessions(platform_connection_id) WHERE is_open;
CREATE UNIQUE INDEX IF NOT EXISTS uq_alerts_active_type
    ON alerts(session_id, alert_type) WHERE is_active;

-- Indexes
CREATE INDEX IF NOT EXISTS idx_sessions_idle ON sessions(last_activity) WHERE is_open;
CREATE INDEX IF NOT EXISTS idx_participants_session ON participants(session_id);
CREATE INDEX IF NOT EXISTS idx_analysis_session ON analysis_results(session_id, processed_at);
CREATE INDEX IF NOT EXISTS idx_alerts_session ON alerts(session_id, created_at);
CREATE INDEX IF NOT EXISTS idx_evidence_alert ON evidence(alert_id);
CREATE INDEX IF NOT EXISTS idx_evidence_retention ON evidence(retention_until) WHERE NOT legal_hold;
CREATE INDEX IF NOT EXISTS idx_audit_partition ON audit_log(partition);
CREATE INDEX IF NOT EXISTS idx_audit_resource ON audit_log(resource_id, at);
CREATE INDEX IF NOT EXISTS idx_audit_actor ON audit_log(actor, at);
"#;
