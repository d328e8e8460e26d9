use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::*;
use crate::error::OracleError;
use crate::logic::alert::AlertType;
use crate::logic::retry::RetryPolicy;
use crate::logic::session::{ContentType, Message, Participant, RiskLevel, Session, SessionType};

fn verdict(risk: f64) -> OracleVerdict {
    OracleVerdict {
        analysis_type: AnalysisType::GroomingDetection,
        confidence: 0.9,
        risk_score: risk,
        indicators: Indicators::default(),
        model_version: None,
    }
}

fn fixtures() -> (Session, Message) {
    let now = Utc::now();
    let session = Session::start(Uuid::new_v4(), None, Uuid::new_v4(), SessionType::Messaging, now);
    let message = Message {
        id: Uuid::new_v4(),
        session_id: session.id,
        platform_message_id: Some("m1".into()),
        sender_id: "stranger".into(),
        recipient_id: None,
        content_type: ContentType::Text,
        content_hash: "abc".into(),
        timestamp: now,
        received_at: now,
        dedup_key: "pm:m1".into(),
        edited_at: None,
        deleted_at: None,
    };
    (session, message)
}

// ============================================================================
// ENGINE
// ============================================================================

#[test]
fn test_weighted_score_example() {
    let engine = RiskScoringEngine::default();
    let b = engine.score(&[2.0, 4.0, 9.0], &[RiskLevel::High]);

    assert_eq!(b.avg_message_risk, 5.0);
    assert_eq!(b.participant_risk, 3.0);
    assert_eq!(b.score, 4.4);
    assert_eq!(b.messages_scored, 3);
}

#[test]
fn test_no_analyses_scores_participants_only() {
    let engine = RiskScoringEngine::default();
    let b = engine.score(&[], &[RiskLevel::Low, RiskLevel::Critical, RiskLevel::Unknown]);

    assert_eq!(b.avg_message_risk, 0.0);
    assert_eq!(b.participant_risk, 5.0);
    assert_eq!(b.score, 1.5);
}

#[test]
fn test_empty_session_scores_zero() {
    let b = RiskScoringEngine::default().score(&[], &[]);
    assert_eq!(b.score, 0.0);
}

#[test]
fn test_score_is_clamped() {
    let rules = ScoringRules {
        contributions: RiskContributions {
            critical: 50.0,
            ..RiskContributions::default()
        },
        ..ScoringRules::default()
    };
    let b = RiskScoringEngine::new(rules).score(&[10.0], &[RiskLevel::Critical]);
    assert_eq!(b.score, 10.0);

    assert_eq!(engine::bound(-3.0), 0.0);
    assert_eq!(engine::bound(f64::NAN), 0.0);
    assert_eq!(engine::bound(4.4449), 4.44);
}

#[test]
fn test_invalid_weights_rejected() {
    assert!(ScoringRules::with_weights(0.5, 0.5).is_ok());
    assert!(ScoringRules::with_weights(0.8, 0.3).is_err());
    assert!(ScoringRules::with_weights(-0.2, 1.2).is_err());
}

#[test]
fn test_custom_weights_change_score() {
    let rules = ScoringRules::with_weights(0.5, 0.5).unwrap();
    let b = RiskScoringEngine::new(rules).score(&[6.0], &[RiskLevel::High]);
    assert_eq!(b.score, 4.5);
}

// ============================================================================
// TYPES
// ============================================================================

#[test]
fn test_verdict_validation() {
    assert!(verdict(9.0).validate().is_ok());
    assert!(verdict(10.5).validate().is_err());

    let mut v = verdict(3.0);
    v.confidence = 1.2;
    assert!(matches!(v.validate(), Err(OracleError::InvalidResponse(_))));
}

#[test]
fn test_indicators_are_versioned() {
    let json = serde_json::json!({
        "version": "1",
        "patterns": ["secrecy_request"],
        "sender_risk": "high",
        "suggested_alert_type": "meeting_request"
    });
    let indicators: Indicators = serde_json::from_value(json).unwrap();

    assert_eq!(indicators.sender_risk(), Some(RiskLevel::High));
    assert_eq!(indicators.suggested_alert_type(), Some(AlertType::MeetingRequest));
    assert_eq!(indicators.patterns(), ["secrecy_request".to_string()]);

    let unknown = serde_json::json!({ "version": "9" });
    assert!(serde_json::from_value::<Indicators>(unknown).is_err());
}

#[test]
fn test_analysis_target_is_exclusive() {
    let id = Uuid::new_v4();
    let result = AnalysisResult::from_verdict(id, AnalysisTarget::Session(id), verdict(2.0), Utc::now());
    assert_eq!(result.message_id(), None);

    let json = serde_json::to_value(AnalysisTarget::Message(id)).unwrap();
    assert_eq!(json["kind"], "message");
}

// ============================================================================
// ORACLE CLIENT
// ============================================================================

struct FlakyOracle {
    failures: u32,
    calls: AtomicU32,
}

#[async_trait]
impl ScoringOracle for FlakyOracle {
    async fn analyze_message(&self, _s: &Session, _m: &Message) -> Result<Vec<OracleVerdict>, OracleError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            Err(OracleError::Unavailable("503".into()))
        } else {
            Ok(vec![verdict(7.0)])
        }
    }

    async fn analyze_session(&self, _s: &Session, _p: &[Participant]) -> Result<Vec<OracleVerdict>, OracleError> {
        Ok(vec![verdict(11.0)])
    }
}

#[tokio::test(start_paused = true)]
async fn test_client_recovers_from_transient_failures() {
    let oracle = Arc::new(FlakyOracle {
        failures: 2,
        calls: AtomicU32::new(0),
    });
    let client = OracleClient::new(oracle.clone(), RetryPolicy::default());
    let (session, message) = fixtures();

    let verdicts = client.analyze_message(&session, &message).await.unwrap();
    assert_eq!(verdicts.len(), 1);
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_client_gives_up_after_bounded_attempts() {
    let oracle = Arc::new(FlakyOracle {
        failures: 100,
        calls: AtomicU32::new(0),
    });
    let client = OracleClient::new(oracle.clone(), RetryPolicy::default());
    let (session, message) = fixtures();

    assert!(client.analyze_message(&session, &message).await.is_err());
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_client_rejects_out_of_range_verdicts() {
    let oracle = Arc::new(FlakyOracle {
        failures: 0,
        calls: AtomicU32::new(0),
    });
    let client = OracleClient::new(oracle, RetryPolicy::default());
    let (session, _) = fixtures();

    let result = client.analyze_session(&session, &[]).await;
    assert!(matches!(result, Err(OracleError::InvalidResponse(_))));
}

#[tokio::test]
async fn test_static_oracle_answers_by_content_hash() {
    let oracle = StaticOracle::new();
    oracle.set("abc", vec![verdict(4.0)]);
    let (session, mut message) = fixtures();

    assert_eq!(oracle.analyze_message(&session, &message).await.unwrap().len(), 1);
    message.content_hash = "other".into();
    assert!(oracle.analyze_message(&session, &message).await.unwrap().is_empty());
}
