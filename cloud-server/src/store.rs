//! PostgreSQL implementation of the pipeline store
//!
//! Idempotent inserts use `ON CONFLICT DO NOTHING RETURNING`; when nothing
//! comes back the existing row is selected and handed back unchanged.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use guardian_core::error::{StoreError, StoreResult};
use guardian_core::logic::alert::Alert;
use guardian_core::logic::audit::AuditEntry;
use guardian_core::logic::evidence::Evidence;
use guardian_core::logic::scoring::AnalysisResult;
use guardian_core::logic::session::{Message, Participant, Session};
use guardian_core::logic::store::{AuditFilter, Insert, Store};
use serde::de::DeserializeOwned;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_err(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            StoreError::Conflict(db.message().to_string())
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => StoreError::Corrupt(err.to_string()),
        _ => StoreError::Unavailable(err.to_string()),
    }
}

fn unwrap_rows<T>(rows: Vec<(Json<T>,)>) -> Vec<T> {
    rows.into_iter().map(|(Json(v),)| v).collect()
}

fn missing(what: &str, id: Uuid) -> StoreError {
    StoreError::Conflict(format!("{} {} does not exist", what, id))
}

/// Rows that must exist after an update
fn expect_one(what: &str, id: Uuid, affected: u64) -> StoreResult<()> {
    if affected == 0 {
        Err(missing(what, id))
    } else {
        Ok(())
    }
}

impl PgStore {
    async fn fetch_one_data<T: DeserializeOwned + Send + Unpin + 'static>(
        &self,
        sql: &str,
        id: Uuid,
    ) -> StoreResult<Option<T>> {
        let row: Option<(Json<T>,)> = sqlx::query_as(sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(row.map(|(Json(v),)| v))
    }

    async fn fetch_all_data<T: DeserializeOwned + Send + Unpin + 'static>(
        &self,
        sql: &str,
        id: Uuid,
    ) -> StoreResult<Vec<T>> {
        let rows: Vec<(Json<T>,)> = sqlx::query_as(sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(unwrap_rows(rows))
    }
}

#[async_trait]
impl Store for PgStore {
    // ========================================================================
    // SESSIONS
    // ========================================================================

    async fn insert_session(&self, session: &Session) -> StoreResult<Insert<Session>> {
        let inserted: Option<(Json<Session>,)> = sqlx::query_as(
            r#"
            INSERT INTO sessions (id, child_id, platform_connection_id, is_open, last_activity, data)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (platform_connection_id) WHERE is_open DO NOTHING
            RETURNING data
            "#,
        )
        .bind(session.id)
        .bind(session.child_id)
        .bind(session.platform_connection_id)
        .bind(session.is_open())
        .bind(session.last_activity)
        .bind(Json(session))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;

        if let Some((Json(row),)) = inserted {
            return Ok(Insert::Inserted(row));
        }

        let existing: Option<Session> = self
            .fetch_one_data(
                "SELECT data FROM sessions WHERE platform_connection_id = $1 AND is_open",
                session.platform_connection_id,
            )
            .await?;
        existing.map(Insert::Existing).ok_or_else(|| {
            // closed between the insert and the select
            StoreError::Unavailable(format!(
                "open session for connection {} changed concurrently",
                session.platform_connection_id
            ))
        })
    }

    async fn get_session(&self, id: Uuid) -> StoreResult<Option<Session>> {
        self.fetch_one_data("SELECT data FROM sessions WHERE id = $1", id).await
    }

    async fn update_session(&self, session: &Session) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE sessions SET is_open = $2, last_activity = $3, data = $4 WHERE id = $1",
        )
        .bind(session.id)
        .bind(session.is_open())
        .bind(session.last_activity)
        .bind(Json(session))
        .execute(&self.pool)
        .await
        .map_err(map_err)?;

        expect_one("session", session.id, result.rows_affected())
    }

    async fn idle_sessions(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Session>> {
        let rows: Vec<(Json<Session>,)> =
            sqlx::query_as("SELECT data FROM sessions WHERE is_open AND last_activity < $1")
                .bind(cutoff)
                .fetch_all(&self.pool)
                .await
                .map_err(map_err)?;
        Ok(unwrap_rows(rows))
    }

    // ========================================================================
    // PARTICIPANTS
    // ========================================================================

    async fn upsert_participant(&self, participant: &Participant) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO participants (id, session_id, platform_user_id, first_interaction, data)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (session_id, platform_user_id) DO UPDATE SET data = EXCLUDED.data
            "#,
        )
        .bind(participant.id)
        .bind(participant.session_id)
        .bind(&participant.platform_user_id)
        .bind(participant.first_interaction)
        .bind(Json(participant))
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(())
    }

    async fn participants(&self, session_id: Uuid) -> StoreResult<Vec<Participant>> {
        self.fetch_all_data(
            "SELECT data FROM participants WHERE session_id = $1 ORDER BY first_interaction",
            session_id,
        )
        .await
    }

    // ========================================================================
    // MESSAGES
    // ========================================================================

    async fn insert_message(&self, message: &Message) -> StoreResult<Insert<Message>> {
        let inserted: Option<(Json<Message>,)> = sqlx::query_as(
            r#"
            INSERT INTO messages (id, session_id, dedup_key, data)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (session_id, dedup_key) DO NOTHING
            RETURNING data
            "#,
        )
        .bind(message.id)
        .bind(message.session_id)
        .bind(&message.dedup_key)
        .bind(Json(message))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;

        match inserted {
            Some((Json(row),)) => Ok(Insert::Inserted(row)),
            None => self
                .find_message(message.session_id, &message.dedup_key)
                .await?
                .map(Insert::Existing)
                .ok_or_else(|| StoreError::Corrupt(format!("dedup key {} conflicted but is missing", message.dedup_key))),
        }
    }

    async fn find_message(&self, session_id: Uuid, dedup_key: &str) -> StoreResult<Option<Message>> {
        let row: Option<(Json<Message>,)> =
            sqlx::query_as("SELECT data FROM messages WHERE session_id = $1 AND dedup_key = $2")
                .bind(session_id)
                .bind(dedup_key)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_err)?;
        Ok(row.map(|(Json(m),)| m))
    }

    async fn get_message(&self, id: Uuid) -> StoreResult<Option<Message>> {
        self.fetch_one_data("SELECT data FROM messages WHERE id = $1", id).await
    }

    async fn count_messages(&self, session_id: Uuid) -> StoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages WHERE session_id = $1")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(count)
    }

    async fn update_message_markers(&self, message: &Message) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET data = jsonb_set(jsonb_set(data, '{edited_at}', $2), '{deleted_at}', $3)
            WHERE id = $1
            "#,
        )
        .bind(message.id)
        .bind(Json(message.edited_at))
        .bind(Json(message.deleted_at))
        .execute(&self.pool)
        .await
        .map_err(map_err)?;

        expect_one("message", message.id, result.rows_affected())
    }

    // ========================================================================
    // ANALYSES
    // ========================================================================

    async fn insert_analysis(&self, result: &AnalysisResult) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO analysis_results (id, session_id, processed_at, data)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(result.id)
        .bind(result.session_id)
        .bind(result.processed_at)
        .bind(Json(result))
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(())
    }

    async fn analyses(&self, session_id: Uuid) -> StoreResult<Vec<AnalysisResult>> {
        self.fetch_all_data(
            "SELECT data FROM analysis_results WHERE session_id = $1 ORDER BY processed_at",
            session_id,
        )
        .await
    }

    // ========================================================================
    // ALERTS
    // ========================================================================

    async fn insert_alert(&self, alert: &Alert) -> StoreResult<Insert<Alert>> {
        let inserted: Option<(Json<Alert>,)> = sqlx::query_as(
            r#"
            INSERT INTO alerts (id, session_id, alert_type, is_active, created_at, data)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (session_id, alert_type) WHERE is_active DO NOTHING
            RETURNING data
            "#,
        )
        .bind(alert.id)
        .bind(alert.session_id)
        .bind(alert.alert_type.to_string())
        .bind(alert.is_active())
        .bind(alert.created_at)
        .bind(Json(alert))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;

        if let Some((Json(row),)) = inserted {
            return Ok(Insert::Inserted(row));
        }

        let existing: Option<(Json<Alert>,)> = sqlx::query_as(
            "SELECT data FROM alerts WHERE session_id = $1 AND alert_type = $2 AND is_active",
        )
        .bind(alert.session_id)
        .bind(alert.alert_type.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;

        existing
            .map(|(Json(a),)| Insert::Existing(a))
            .ok_or_else(|| StoreError::Unavailable(format!("active {} alert changed concurrently", alert.alert_type)))
    }

    async fn update_alert(&self, alert: &Alert) -> StoreResult<()> {
        let result = sqlx::query("UPDATE alerts SET is_active = $2, data = $3 WHERE id = $1")
            .bind(alert.id)
            .bind(alert.is_active())
            .bind(Json(alert))
            .execute(&self.pool)
            .await
            .map_err(map_err)?;

        expect_one("alert", alert.id, result.rows_affected())
    }

    async fn get_alert(&self, id: Uuid) -> StoreResult<Option<Alert>> {
        self.fetch_one_data("SELECT data FROM alerts WHERE id = $1", id).await
    }

    async fn alerts_for_session(&self, session_id: Uuid) -> StoreResult<Vec<Alert>> {
        self.fetch_all_data(
            "SELECT data FROM alerts WHERE session_id = $1 ORDER BY created_at",
            session_id,
        )
        .await
    }

    // ========================================================================
    // EVIDENCE
    // ========================================================================

    async fn insert_evidence(&self, evidence: &Evidence) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO evidence (id, alert_id, collected_at, legal_hold, retention_until, custody_len, data)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(evidence.id)
        .bind(evidence.alert_id)
        .bind(evidence.collected_at)
        .bind(evidence.legal_hold)
        .bind(evidence.retention_until)
        .bind(evidence.custody.len() as i32)
        .bind(Json(evidence))
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(())
    }

    async fn update_evidence(&self, evidence: &Evidence) -> StoreResult<()> {
        // custody chain is append-only
        let result = sqlx::query(
            r#"
            UPDATE evidence
            SET legal_hold = $2, retention_until = $3, custody_len = $4, data = $5
            WHERE id = $1 AND custody_len <= $4
            "#,
        )
        .bind(evidence.id)
        .bind(evidence.legal_hold)
        .bind(evidence.retention_until)
        .bind(evidence.custody.len() as i32)
        .bind(Json(evidence))
        .execute(&self.pool)
        .await
        .map_err(map_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "evidence {} does not exist or its custody chain would shrink",
                evidence.id
            )));
        }
        Ok(())
    }

    async fn get_evidence(&self, id: Uuid) -> StoreResult<Option<Evidence>> {
        self.fetch_one_data("SELECT data FROM evidence WHERE id = $1", id).await
    }

    async fn evidence_for_alert(&self, alert_id: Uuid) -> StoreResult<Vec<Evidence>> {
        self.fetch_all_data(
            "SELECT data FROM evidence WHERE alert_id = $1 ORDER BY collected_at",
            alert_id,
        )
        .await
    }

    async fn expired_evidence(&self, now: DateTime<Utc>) -> StoreResult<Vec<Evidence>> {
        let rows: Vec<(Json<Evidence>,)> =
            sqlx::query_as("SELECT data FROM evidence WHERE NOT legal_hold AND retention_until < $1")
                .bind(now)
                .fetch_all(&self.pool)
                .await
                .map_err(map_err)?;
        Ok(unwrap_rows(rows))
    }

    async fn delete_evidence(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM evidence WHERE id = $1 AND NOT legal_hold")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "evidence {} does not exist or is under legal hold",
                id
            )));
        }
        Ok(())
    }

    // ========================================================================
    // AUDIT
    // ========================================================================

    async fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (id, partition, at, actor, resource_id, data)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(entry.id)
        .bind(&entry.partition)
        .bind(entry.at)
        .bind(&entry.actor)
        .bind(&entry.resource_id)
        .bind(Json(entry))
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(())
    }

    async fn query_audit(&self, filter: &AuditFilter) -> StoreResult<Vec<AuditEntry>> {
        let rows: Vec<(Json<AuditEntry>,)> = sqlx::query_as(
            r#"
            SELECT data FROM audit_log
            WHERE ($1::VARCHAR IS NULL OR resource_id = $1)
              AND ($2::VARCHAR IS NULL OR actor = $2)
              AND ($3::TIMESTAMPTZ IS NULL OR at >= $3)
            ORDER BY at DESC
            LIMIT $4
            "#,
        )
        .bind(filter.resource_id.as_deref())
        .bind(filter.actor.as_deref())
        .bind(filter.since)
        .bind(filter.effective_limit() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(unwrap_rows(rows))
    }

    async fn drop_audit_partitions_before(&self, partition: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM audit_log WHERE partition < $1")
            .bind(partition)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(result.rows_affected())
    }
}
