use chrono::{Duration, Utc};
use uuid::Uuid;

use super::*;
use crate::error::MonitorError;
use crate::logic::notify::{NotificationChannel, NotificationPriority};
use crate::logic::scoring::{AnalysisType, ScoreBreakdown};
use crate::logic::session::{Session, SessionType};

fn session() -> Session {
    Session::start(Uuid::new_v4(), Some(Uuid::new_v4()), Uuid::new_v4(), SessionType::GroupChat, Utc::now())
}

fn signal(score: f64, previous_peak: f64) -> AlertSignal {
    AlertSignal {
        alert_type: AlertType::GroomingDetected,
        score,
        previous_peak,
        confidence: 0.8,
        trigger: Trigger::V1 {
            message_id: Some(Uuid::new_v4()),
            analysis_ids: vec![],
            analysis_type: Some(AnalysisType::GroomingDetection),
            patterns: vec![],
            breakdown: ScoreBreakdown::default(),
        },
    }
}

fn new_alert(manager: &AlertManager) -> Alert {
    manager.open(&session(), &signal(6.5, 0.0), Severity::High, Utc::now())
}

fn alert_in(status: AlertStatus) -> Alert {
    let mut alert = new_alert(&AlertManager::default());
    alert.status = status;
    alert
}

// ============================================================================
// BANDS & DISPATCH
// ============================================================================

#[test]
fn test_default_bands() {
    let bands = SeverityBands::default();
    assert_eq!(bands.band(2.99), None);
    assert_eq!(bands.band(3.0), Some(Severity::Medium));
    assert_eq!(bands.band(6.0), Some(Severity::High));
    assert_eq!(bands.band(8.5), Some(Severity::Critical));
    assert_eq!(bands.band(9.5), Some(Severity::Emergency));
    assert_eq!(bands.band(10.0), Some(Severity::Emergency));
}

#[test]
fn test_band_ordering_check() {
    assert!(SeverityBands::default().is_ordered());
    let inverted = SeverityBands {
        high: 9.0,
        ..SeverityBands::default()
    };
    assert!(!inverted.is_ordered());
}

#[test]
fn test_dispatch_table() {
    assert_eq!(channels_for(Severity::Medium), vec![NotificationChannel::Dashboard]);
    assert!(channels_for(Severity::Critical).contains(&NotificationChannel::Sms));
    assert!(channels_for(Severity::Emergency).contains(&NotificationChannel::EmergencyCall));
    assert!(!channels_for(Severity::Critical).contains(&NotificationChannel::EmergencyCall));
    assert_eq!(priority_for(Severity::Emergency), NotificationPriority::Immediate);
    assert_eq!(priority_for(Severity::Low), NotificationPriority::Normal);
}

#[test]
fn test_alert_type_fallback() {
    assert_eq!(alert_type_for(Some(AnalysisType::GroomingDetection)), AlertType::GroomingDetected);
    assert_eq!(alert_type_for(Some(AnalysisType::ToxicityDetection)), AlertType::Cyberbullying);
    assert_eq!(alert_type_for(None), AlertType::SuspiciousBehavior);
}

// ============================================================================
// OPEN / UPDATE
// ============================================================================

#[test]
fn test_low_scores_never_open() {
    let manager = AlertManager::default();
    assert_eq!(manager.evaluate(&signal(2.5, 0.0), None, false), AlertDecision::Nothing);
}

#[test]
fn test_first_crossing_opens() {
    let manager = AlertManager::default();
    assert_eq!(
        manager.evaluate(&signal(6.2, 4.0), None, false),
        AlertDecision::Open { severity: Severity::High }
    );
}

#[test]
fn test_active_alert_absorbs_signal() {
    let manager = AlertManager::default();
    let active = new_alert(&manager);

    let decision = manager.evaluate(&signal(8.7, 6.5), Some(&active), true);
    assert_eq!(
        decision,
        AlertDecision::Update {
            alert_id: active.id,
            severity: Severity::Critical
        }
    );
}

#[test]
fn test_same_band_after_resolution_does_not_reopen() {
    let manager = AlertManager::default();
    // previous peak already in the high band, type alerted before
    assert_eq!(manager.evaluate(&signal(6.8, 7.0), None, true), AlertDecision::Nothing);
    // crossing into a higher band opens again
    assert_eq!(
        manager.evaluate(&signal(8.6, 7.0), None, true),
        AlertDecision::Open { severity: Severity::Critical }
    );
}

#[test]
fn test_escalated_alert_does_not_absorb_new_crossing() {
    let manager = AlertManager::default();
    let escalated = alert_in(AlertStatus::Escalated);
    assert!(!escalated.is_active());
    assert!(!escalated.status.is_terminal());

    // the worker only hands over active alerts, so the escalated one is
    // left alone and a second open alert of the same type appears
    let active = Some(&escalated).filter(|a| a.is_active());
    assert_eq!(
        manager.evaluate(&signal(8.7, 6.5), active, true),
        AlertDecision::Open { severity: Severity::Critical }
    );
    // without a crossing nothing new opens
    assert_eq!(manager.evaluate(&signal(6.9, 6.5), active, true), AlertDecision::Nothing);
}

#[test]
fn test_absorb_only_raises_severity() {
    let manager = AlertManager::default();
    let mut alert = new_alert(&manager);

    assert!(manager.absorb(&mut alert, &signal(9.0, 6.5), Severity::Critical, Utc::now()));
    assert_eq!(alert.severity, Severity::Critical);
    assert_eq!(alert.risk_score, 9.0);

    assert!(!manager.absorb(&mut alert, &signal(4.0, 9.0), Severity::Medium, Utc::now()));
    assert_eq!(alert.severity, Severity::Critical);
    assert_eq!(alert.risk_score, 4.0);
    assert_eq!(alert.status, AlertStatus::New);
}

// ============================================================================
// STATE MACHINE
// ============================================================================

#[test]
fn test_happy_path_lifecycle() {
    let manager = AlertManager::default();
    let mut alert = new_alert(&manager);
    let now = Utc::now();

    manager
        .apply(&mut alert, &AlertOp::Acknowledge { notes: None }, "guardian-1", now)
        .unwrap();
    assert_eq!(alert.status, AlertStatus::Acknowledged);
    assert_eq!(alert.acknowledged_by.as_deref(), Some("guardian-1"));

    manager
        .apply(&mut alert, &AlertOp::Investigate { notes: None }, "guardian-1", now)
        .unwrap();
    manager
        .apply(
            &mut alert,
            &AlertOp::Resolve {
                false_positive: true,
                reason: Some("cousin".into()),
            },
            "guardian-1",
            now,
        )
        .unwrap();

    assert_eq!(alert.status, AlertStatus::FalsePositive);
    assert!(alert.false_positive);
    assert_eq!(alert.history.len(), 3);
    assert_eq!(alert.history[2].from, AlertStatus::Investigating);
}

#[test]
fn test_resolve_from_new_is_a_conflict() {
    let manager = AlertManager::default();
    let mut alert = new_alert(&manager);
    let before = alert.clone();

    let err = manager
        .apply(
            &mut alert,
            &AlertOp::Resolve {
                false_positive: false,
                reason: None,
            },
            "guardian-1",
            Utc::now(),
        )
        .unwrap_err();

    assert!(matches!(
        err,
        MonitorError::StateConflict {
            from: AlertStatus::New,
            action: "resolve",
            ..
        }
    ));
    assert_eq!(alert, before);
}

#[test]
fn test_only_graph_edges_are_legal() {
    use AlertStatus::*;
    let manager = AlertManager::default();
    let all = [New, Acknowledged, Investigating, Resolved, Escalated, FalsePositive, Dismissed];

    let ops: Vec<(AlertOp, Vec<AlertStatus>)> = vec![
        (AlertOp::Acknowledge { notes: None }, vec![New]),
        (AlertOp::Investigate { notes: None }, vec![Acknowledged]),
        (
            AlertOp::Resolve {
                false_positive: false,
                reason: None,
            },
            vec![Acknowledged, Investigating],
        ),
        (AlertOp::Dismiss { reason: None }, vec![Acknowledged, Investigating]),
        (
            AlertOp::Escalate {
                target: "police".into(),
                reference: None,
            },
            vec![New, Acknowledged, Investigating],
        ),
        (
            AlertOp::Reassess {
                severity: Severity::Low,
                reason: None,
            },
            vec![Acknowledged, Investigating],
        ),
        (AlertOp::Reopen { reason: "new info".into() }, vec![Escalated]),
    ];

    for (op, legal) in ops {
        for status in all {
            let mut alert = alert_in(status);
            let result = manager.apply(&mut alert, &op, "reviewer", Utc::now());
            assert_eq!(result.is_ok(), legal.contains(&status), "{} from {}", op.name(), status);
            if result.is_err() {
                assert_eq!(alert.status, status);
            }
        }
    }
}

#[test]
fn test_escalate_records_reference() {
    let manager = AlertManager::default();
    let mut alert = new_alert(&manager);
    manager
        .apply(
            &mut alert,
            &AlertOp::Escalate {
                target: "law_enforcement".into(),
                reference: Some("CASE-1".into()),
            },
            "reviewer",
            Utc::now(),
        )
        .unwrap();

    assert_eq!(alert.status, AlertStatus::Escalated);
    assert_eq!(alert.escalation_reference.as_deref(), Some("CASE-1"));
    assert!(!alert.status.is_active());
    assert!(!alert.status.is_terminal());
}

#[test]
fn test_reopen_creates_new_alert() {
    let manager = AlertManager::default();
    let mut escalated = alert_in(AlertStatus::Escalated);
    let snapshot = escalated.clone();

    let outcome = manager
        .apply(&mut escalated, &AlertOp::Reopen { reason: "new messages".into() }, "reviewer", Utc::now())
        .unwrap();

    let AlertOutcome::Reopened(reopened) = outcome else {
        panic!("expected a new alert");
    };
    assert_ne!(reopened.id, escalated.id);
    assert_eq!(reopened.reopened_from, Some(escalated.id));
    assert_eq!(reopened.status, AlertStatus::New);
    assert_eq!(reopened.alert_type, snapshot.alert_type);
    assert_eq!(escalated, snapshot);
}

#[test]
fn test_reassess_may_lower_severity_after_acknowledgement() {
    let manager = AlertManager::default();
    let mut alert = alert_in(AlertStatus::Acknowledged);
    alert.severity = Severity::Critical;

    manager
        .apply(
            &mut alert,
            &AlertOp::Reassess {
                severity: Severity::Medium,
                reason: Some("context reviewed".into()),
            },
            "guardian-1",
            Utc::now(),
        )
        .unwrap();
    assert_eq!(alert.severity, Severity::Medium);
    assert_eq!(alert.status, AlertStatus::Acknowledged);
}

// ============================================================================
// DERIVED VIEWS
// ============================================================================

#[test]
fn test_urgency_decays_with_age() {
    let mut alert = alert_in(AlertStatus::New);
    alert.severity = Severity::Emergency;
    assert_eq!(alert.urgency(alert.created_at), Urgency::Immediate);
    assert_eq!(alert.urgency(alert.created_at + Duration::hours(2)), Urgency::Critical);

    alert.severity = Severity::High;
    assert_eq!(alert.urgency(alert.created_at + Duration::hours(25)), Urgency::Medium);
}

#[test]
fn test_recommended_actions_for_critical_alerts() {
    let mut alert = alert_in(AlertStatus::New);
    alert.alert_type = AlertType::MeetingRequest;
    alert.severity = Severity::Critical;

    let actions = alert.recommended_actions();
    assert_eq!(actions[0], "Immediate attention required");
    assert_eq!(actions.last(), Some(&"Consider escalating to authorities"));
}
