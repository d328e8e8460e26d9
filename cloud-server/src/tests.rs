//! Router tests against the in-memory pipeline

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use guardian_core::logic::evidence::MemoryBlobStore;
use guardian_core::logic::notify::RecordingNotifier;
use guardian_core::logic::scoring::{AnalysisType, Indicators, OracleVerdict, StaticOracle};
use guardian_core::logic::store::MemoryStore;
use guardian_core::{Monitor, MonitorDeps, PipelineConfig};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tokio_test::assert_ok;
use tower::ServiceExt;
use uuid::Uuid;

use crate::config::Config;
use crate::middleware::auth::Claims;
use crate::{create_router, AppState};

struct TestApp {
    router: Router,
    monitor: Arc<Monitor>,
    oracle: Arc<StaticOracle>,
    secret: String,
}

fn app() -> TestApp {
    let oracle = Arc::new(StaticOracle::new());
    let monitor = Arc::new(Monitor::new(
        PipelineConfig::default(),
        MonitorDeps {
            store: Arc::new(MemoryStore::new()),
            oracle: oracle.clone(),
            notifier: Arc::new(RecordingNotifier::new()),
            blobs: Arc::new(MemoryBlobStore::new()),
            audit_sink: None,
            children: None,
        },
    ));
    let config = Config::for_tests();

    TestApp {
        secret: config.jwt_secret.clone(),
        router: create_router(AppState {
            monitor: monitor.clone(),
            config,
        }),
        monitor,
        oracle,
    }
}

impl TestApp {
    fn token(&self, sub: &str, role: &str, children: Vec<Uuid>) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            role: role.to_string(),
            children,
            exp: (Utc::now().timestamp() + 3600) as usize,
        };
        assert_ok!(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes())
        ))
    }

    async fn send(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        };

        let response = assert_ok!(self.router.clone().oneshot(assert_ok!(request)).await);
        let status = response.status();
        let bytes = assert_ok!(to_bytes(response.into_body(), usize::MAX).await);
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            assert_ok!(serde_json::from_slice(&bytes))
        };
        (status, json)
    }

    /// Start a session for `child_id` and return its id
    async fn start_session(&self, child_id: Uuid) -> Uuid {
        let collector = self.token("collector-1", "collector", vec![]);
        let (status, body) = self
            .send(
                "POST",
                "/api/v1/ingest/events",
                Some(&collector),
                Some(json!({
                    "events": [{
                        "type": "session_start",
                        "child_id": child_id,
                        "platform_connection_id": Uuid::new_v4(),
                        "session_type": "messaging",
                        "started_at": Utc::now() - chrono::Duration::minutes(5),
                    }]
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["accepted"], 1);
        assert_ok!(body["outcomes"][0]["resource_id"].as_str().unwrap_or_default().parse())
    }

    async fn ingest_message(&self, session_id: Uuid, platform_id: &str, content_hash: &str) -> Value {
        let collector = self.token("collector-1", "collector", vec![]);
        let (status, body) = self
            .send(
                "POST",
                "/api/v1/ingest/events",
                Some(&collector),
                Some(json!({
                    "events": [{
                        "type": "message_received",
                        "session_id": session_id,
                        "platform_message_id": platform_id,
                        "sender_id": "stranger",
                        "content_type": "text",
                        "content_hash": content_hash,
                        "timestamp": Utc::now(),
                    }]
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body
    }

    /// Ingest and wait for scoring to settle
    async fn send_message(&self, session_id: Uuid, platform_id: &str, content_hash: &str) -> Value {
        let body = self.ingest_message(session_id, platform_id, content_hash).await;
        assert_ok!(self.monitor.flush(session_id).await);
        body
    }
}

fn verdict(risk_score: f64) -> OracleVerdict {
    OracleVerdict {
        analysis_type: AnalysisType::RiskAssessment,
        confidence: 0.9,
        risk_score,
        indicators: Indicators::default(),
        model_version: None,
    }
}

// ============================================================================
// AUTH
// ============================================================================

#[tokio::test]
async fn test_health_is_public() {
    let app = app();
    let (status, body) = app.send("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let app = app();
    let (status, body) = app
        .send("POST", "/api/v1/ingest/events", None, Some(json!({ "events": [] })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], 401);
}

#[tokio::test]
async fn test_token_with_unknown_role_is_rejected() {
    let app = app();
    let token = app.token("someone", "superuser", vec![]);
    let (status, _) = app.send("GET", "/api/v1/audit", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_signed_with_other_secret_is_rejected() {
    let app = app();
    let claims = Claims {
        sub: "forger".into(),
        role: "system_admin".into(),
        children: vec![],
        exp: (Utc::now().timestamp() + 3600) as usize,
    };
    let forged = assert_ok!(encode(&Header::default(), &claims, &EncodingKey::from_secret(b"wrong")));
    let (status, _) = app.send("GET", "/api/v1/audit", Some(&forged), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ============================================================================
// INGESTION
// ============================================================================

#[tokio::test]
async fn test_collector_ingest_reports_per_event_outcomes() {
    let app = app();
    let session_id = app.start_session(Uuid::new_v4()).await;

    let body = app.send_message(session_id, "m1", "hash-1").await;
    assert_eq!(body["accepted"], 1);

    let again = app.send_message(session_id, "m1", "hash-1").await;
    assert_eq!(again["accepted"], 0);
    assert_eq!(again["duplicates"], 1);
    assert_eq!(again["outcomes"][0]["outcome"], "duplicate");
}

#[tokio::test]
async fn test_message_for_unknown_session_is_rejected_in_band() {
    let app = app();
    let body = app.ingest_message(Uuid::new_v4(), "m1", "hash-1").await;
    assert_eq!(body["rejected"], 1);
    assert_eq!(body["outcomes"][0]["outcome"], "rejected");
    assert_eq!(body["outcomes"][0]["retryable"], false);
}

#[tokio::test]
async fn test_guardian_may_not_ingest() {
    let app = app();
    let guardian = app.token("g1", "guardian", vec![]);
    let (status, _) = app
        .send(
            "POST",
            "/api/v1/ingest/events",
            Some(&guardian),
            Some(json!({ "events": [{ "type": "session_end", "session_id": Uuid::new_v4() }] })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_empty_batch_fails_validation() {
    let app = app();
    let collector = app.token("collector-1", "collector", vec![]);
    let (status, _) = app
        .send("POST", "/api/v1/ingest/events", Some(&collector), Some(json!({ "events": [] })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// SESSIONS & ALERTS
// ============================================================================

#[tokio::test]
async fn test_session_reads_are_scoped_to_children() {
    let app = app();
    let child = Uuid::new_v4();
    let session_id = app.start_session(child).await;
    let uri = format!("/api/v1/sessions/{}", session_id);

    let own = app.token("g1", "guardian", vec![child]);
    let (status, body) = app.send("GET", &uri, Some(&own), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["status"], "active");

    let other = app.token("g2", "guardian", vec![Uuid::new_v4()]);
    let (status, _) = app.send("GET", &uri, Some(&other), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let app = app();
    let reviewer = app.token("r1", "reviewer", vec![]);
    let uri = format!("/api/v1/sessions/{}", Uuid::new_v4());
    let (status, _) = app.send("GET", &uri, Some(&reviewer), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_alert_lifecycle_over_http() {
    let app = app();
    app.oracle.set("hot", vec![verdict(9.0)]);
    let child = Uuid::new_v4();
    let session_id = app.start_session(child).await;
    app.send_message(session_id, "m1", "hot").await;

    let guardian = app.token("g1", "guardian", vec![child]);
    let (status, alerts) = app
        .send("GET", &format!("/api/v1/sessions/{}/alerts", session_id), Some(&guardian), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let alert_id = alerts[0]["id"].as_str().unwrap_or_default().to_string();
    assert_eq!(alerts[0]["status"], "new");

    // resolve straight from new is not a legal transition
    let (status, body) = app
        .send("POST", &format!("/api/v1/alerts/{}/actions/resolve", alert_id), Some(&guardian), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], 409);

    let (status, body) = app
        .send(
            "POST",
            &format!("/api/v1/alerts/{}/actions/acknowledge", alert_id),
            Some(&guardian),
            Some(json!({ "notes": "looking now" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "acknowledged");
    assert_eq!(body["acknowledged_by"], "g1");

    let (status, _) = app
        .send("POST", &format!("/api/v1/alerts/{}/actions/escalate", alert_id), Some(&guardian), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_export_and_verify_sealed_evidence() {
    let app = app();
    app.oracle.set("hot", vec![verdict(9.0)]);
    let session_id = app.start_session(Uuid::new_v4()).await;
    app.send_message(session_id, "m1", "hot").await;

    let reviewer = app.token("r1", "reviewer", vec![]);
    let (_, alerts) = app
        .send("GET", &format!("/api/v1/sessions/{}/alerts", session_id), Some(&reviewer), None)
        .await;
    let alert_id = alerts[0]["id"].as_str().unwrap_or_default().to_string();

    let (status, bundle) = app
        .send("GET", &format!("/api/v1/alerts/{}/export", alert_id), Some(&reviewer), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let evidence_id = bundle["items"][0]["evidence_id"].as_str().unwrap_or_default().to_string();
    assert!(!evidence_id.is_empty());

    let (status, body) = app
        .send("POST", &format!("/api/v1/evidence/{}/verify", evidence_id), Some(&reviewer), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verified"], true);

    let (status, body) = app
        .send(
            "POST",
            &format!("/api/v1/evidence/{}/legal-hold", evidence_id),
            Some(&reviewer),
            Some(json!({ "hold": true, "reason": "case 42" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["legal_hold"], true);
}

// ============================================================================
// AUDIT & MAINTENANCE
// ============================================================================

#[tokio::test]
async fn test_audit_is_reviewer_only() {
    let app = app();
    let child = Uuid::new_v4();
    let session_id = app.start_session(child).await;

    let guardian = app.token("g1", "guardian", vec![child]);
    let (status, _) = app.send("GET", "/api/v1/audit", Some(&guardian), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let reviewer = app.token("r1", "reviewer", vec![]);
    let (status, entries) = app
        .send("GET", &format!("/api/v1/audit?resource_id={}&limit=10", session_id), Some(&reviewer), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(entries[0]["action"], "session_started");
    assert_eq!(entries[0]["actor"], "collector-1");
}

#[tokio::test]
async fn test_maintenance_requires_scheduler() {
    let app = app();
    let reviewer = app.token("r1", "reviewer", vec![]);
    let (status, _) = app
        .send("POST", "/api/v1/maintenance/expire-idle", Some(&reviewer), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let scheduler = app.token("cron", "scheduler", vec![]);
    let (status, report) = app
        .send("POST", "/api/v1/maintenance/expire-idle", Some(&scheduler), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["expired"], 0);

    let (status, report) = app
        .send("POST", "/api/v1/maintenance/retention", Some(&scheduler), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["evidence"]["purged"], 0);
}
