use chrono::{Duration, TimeZone, Utc};
use uuid::Uuid;

use super::*;
use crate::logic::ingest::ParticipantSeen;
use crate::logic::scoring::ScoreBreakdown;

fn session() -> Session {
    Session::start(
        Uuid::new_v4(),
        None,
        Uuid::new_v4(),
        SessionType::Messaging,
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
    )
}

fn seen(user: &str) -> ParticipantSeen {
    ParticipantSeen {
        platform_user_id: user.to_string(),
        ..Default::default()
    }
}

fn breakdown(score: f64) -> ScoreBreakdown {
    ScoreBreakdown {
        score,
        ..Default::default()
    }
}

#[test]
fn test_risk_level_order() {
    assert!(RiskLevel::Unknown < RiskLevel::Low);
    assert!(RiskLevel::Low < RiskLevel::Medium);
    assert!(RiskLevel::High < RiskLevel::Critical);
    assert_eq!(RiskLevel::High.to_string(), "high");
    assert_eq!("critical".parse::<RiskLevel>().unwrap(), RiskLevel::Critical);
}

#[test]
fn test_close_never_precedes_start() {
    let mut s = session();
    let before_start = s.start_time - Duration::minutes(5);
    s.close(SessionStatus::Completed, before_start);

    assert_eq!(s.end_time, Some(s.start_time));
    assert_eq!(s.duration_seconds, Some(0));
    assert!(!s.is_open());
}

#[test]
fn test_participant_seen_creates_then_updates() {
    let mut state = SessionState::new(session());
    let t0 = state.session.start_time;

    let first = state.apply_participant(&seen("stranger"), t0);
    assert!(first.created());
    assert_eq!(first.participant.message_count, 1);
    assert_eq!(state.session.participant_count, 1);

    let second = state.apply_participant(&seen("stranger"), t0 + Duration::seconds(30));
    assert!(!second.created());
    assert_eq!(second.participant.message_count, 2);
    assert_eq!(second.participant.last_interaction, t0 + Duration::seconds(30));
    assert_eq!(second.participant.first_interaction, t0);
    assert_eq!(state.session.participant_count, 1);
}

#[test]
fn test_participant_risk_never_decreases_from_sightings() {
    let mut state = SessionState::new(session());
    let t0 = state.session.start_time;

    let mut high = seen("p1");
    high.risk_level = Some(RiskLevel::High);
    assert!(state.apply_participant(&high, t0).risk_raised);

    let mut low = seen("p1");
    low.risk_level = Some(RiskLevel::Low);
    let change = state.apply_participant(&low, t0);
    assert!(!change.risk_raised);
    assert_eq!(change.participant.risk_level, RiskLevel::High);
}

#[test]
fn test_reviewer_reset_can_lower_risk() {
    let mut state = SessionState::new(session());
    let mut critical = seen("p1");
    critical.risk_level = Some(RiskLevel::Critical);
    let id = state.apply_participant(&critical, state.session.start_time).participant.id;

    let (before, after) = state.reset_participant_risk(id, RiskLevel::Low).unwrap();
    assert_eq!(before.risk_level, RiskLevel::Critical);
    assert_eq!(after.risk_level, RiskLevel::Low);
    assert!(state.reset_participant_risk(Uuid::new_v4(), RiskLevel::Low).is_none());
}

#[test]
fn test_peak_is_kept_when_score_drops() {
    let mut state = SessionState::new(session());

    let up = state.apply_score(&breakdown(7.0), 5.0, 8.0);
    assert_eq!(up.previous_peak, 0.0);
    assert!(up.status_changed);
    assert_eq!(state.session.status, SessionStatus::Flagged);

    let down = state.apply_score(&breakdown(2.0), 5.0, 8.0);
    assert_eq!(down.previous_score, 7.0);
    assert_eq!(state.session.risk_score, 2.0);
    assert_eq!(state.session.peak_risk_score, 7.0);
    // status never downgrades automatically
    assert_eq!(state.session.status, SessionStatus::Flagged);
}

#[test]
fn test_emergency_status_threshold() {
    let mut state = SessionState::new(session());
    state.apply_score(&breakdown(8.0), 5.0, 8.0);
    assert_eq!(state.session.status, SessionStatus::Emergency);
}

#[test]
fn test_dedup_key_prefers_platform_id() {
    let ts = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 1).unwrap();
    assert_eq!(Message::dedup_key(Some("m1"), "a", "h", ts, 5), "pm:m1");

    let k1 = Message::dedup_key(None, "a", "h", ts, 5);
    let k2 = Message::dedup_key(None, "a", "h", ts + Duration::seconds(3), 5);
    let k3 = Message::dedup_key(None, "a", "h", ts + Duration::seconds(10), 5);
    let k4 = Message::dedup_key(None, "b", "h", ts, 5);
    assert_eq!(k1, k2);
    assert_ne!(k1, k3);
    assert_ne!(k1, k4);
}

#[test]
fn test_scoring_gap_is_counted() {
    let mut state = SessionState::new(session());
    let at = state.session.start_time;
    state.record_gap("oracle timed out".into(), at);
    state.record_gap("oracle timed out".into(), at);

    assert_eq!(state.session.scoring_gaps, 2);
    assert_eq!(state.session.last_scoring_gap.as_ref().unwrap().reason, "oracle timed out");
}

#[test]
fn test_sender_risk_registers_unknown_sender() {
    let mut state = SessionState::new(session());
    let at = state.session.start_time;

    let change = state.raise_participant_risk("ghost", RiskLevel::High, at).unwrap();
    assert!(change.created());
    assert_eq!(change.participant.message_count, 0);
    assert_eq!(state.session.participant_count, 1);

    // same or lower level is not a change
    assert!(state.raise_participant_risk("ghost", RiskLevel::Medium, at).is_none());
    assert!(state.raise_participant_risk("ghost", RiskLevel::Critical, at).is_some());
}
