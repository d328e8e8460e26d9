//! Per-session aggregate owned by exactly one worker.
//!
//! Everything here is synchronous; the worker performs persistence and
//! oracle calls around these mutations.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::types::{Message, Participant, ParticipantRole, RiskLevel, ScoringGap, Session};
use crate::logic::alert::{Alert, AlertType};
use crate::logic::ingest::ParticipantSeen;
use crate::logic::scoring::{AnalysisResult, AnalysisTarget, ScoreBreakdown};

#[derive(Debug, Clone)]
pub struct ParticipantChange {
    pub participant: Participant,
    pub before: Option<Participant>,
    pub risk_raised: bool,
}

impl ParticipantChange {
    pub fn created(&self) -> bool {
        self.before.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreTransition {
    pub previous_score: f64,
    pub previous_peak: f64,
    pub score: f64,
    pub status_changed: bool,
}

#[derive(Debug, Clone)]
pub struct SessionState {
    pub session: Session,
    participants: HashMap<String, Participant>,
    message_scores: Vec<f64>,
    /// Messages whose oracle call reached an outcome: analyses, none, or a gap
    scored: HashSet<Uuid>,
    alerted_types: HashSet<AlertType>,
}

impl SessionState {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            participants: HashMap::new(),
            message_scores: Vec::new(),
            scored: HashSet::new(),
            alerted_types: HashSet::new(),
        }
    }

    /// Rebuild the aggregate from persisted records
    pub fn hydrate(
        session: Session,
        participants: Vec<Participant>,
        analyses: &[AnalysisResult],
        alerts: &[Alert],
    ) -> Self {
        let mut state = Self::new(session);
        for p in participants {
            state.participants.insert(p.platform_user_id.clone(), p);
        }
        for result in analyses {
            state.record_analysis(result);
        }
        state.alerted_types = alerts.iter().map(|a| a.alert_type).collect();
        state
    }

    pub fn id(&self) -> Uuid {
        self.session.id
    }

    pub fn participant(&self, platform_user_id: &str) -> Option<&Participant> {
        self.participants.get(platform_user_id)
    }

    pub fn participants(&self) -> Vec<Participant> {
        let mut list: Vec<Participant> = self.participants.values().cloned().collect();
        list.sort_by(|a, b| a.first_interaction.cmp(&b.first_interaction));
        list
    }

    pub fn participant_levels(&self) -> Vec<RiskLevel> {
        self.participants.values().map(|p| p.risk_level).collect()
    }

    pub fn message_scores(&self) -> &[f64] {
        &self.message_scores
    }

    // ========================================================================
    // MUTATIONS
    // ========================================================================

    /// Create or update a participant from a sighting
    pub fn apply_participant(&mut self, seen: &ParticipantSeen, at: DateTime<Utc>) -> ParticipantChange {
        let session_id = self.session.id;
        let role = seen.role.unwrap_or(ParticipantRole::Participant);

        let before = self.participants.get(&seen.platform_user_id).cloned();
        let entry = self
            .participants
            .entry(seen.platform_user_id.clone())
            .or_insert_with(|| Participant::new(session_id, seen.platform_user_id.clone(), role, at));

        if at > entry.last_interaction {
            entry.last_interaction = at;
        }
        entry.message_count += 1;

        if let Some(role) = seen.role {
            entry.role = role;
        }
        if seen.display_name.is_some() {
            entry.display_name = seen.display_name.clone();
        }
        if seen.username.is_some() {
            entry.username = seen.username.clone();
        }
        if seen.age_estimate.is_some() {
            entry.age_estimate = seen.age_estimate;
        }
        let risk_raised = seen.risk_level.map(|level| entry.raise_risk(level)).unwrap_or(false);

        let participant = entry.clone();
        self.session.participant_count = self.participants.len() as i64;
        self.session.touch(at);

        ParticipantChange {
            participant,
            before,
            risk_raised,
        }
    }

    /// Count a newly accepted message
    pub fn record_message(&mut self, message: &Message) {
        self.session.message_count += 1;
        self.session.touch(message.timestamp.max(message.received_at));
    }

    /// Fold an analysis into the running message average
    pub fn record_analysis(&mut self, result: &AnalysisResult) {
        if let AnalysisTarget::Message(message_id) = result.target {
            self.message_scores.push(result.risk_score);
            self.scored.insert(message_id);
        }
    }

    pub fn mark_scored(&mut self, message_id: Uuid) {
        self.scored.insert(message_id);
    }

    /// False for an accepted message whose scoring never ran, e.g. after a
    /// failed write between insert and follow-up
    pub fn is_scored(&self, message_id: Uuid) -> bool {
        self.scored.contains(&message_id)
    }

    /// Raise a participant's level from a `sender_risk` indicator. An unseen
    /// sender is registered without counting a sighting.
    pub fn raise_participant_risk(
        &mut self,
        platform_user_id: &str,
        level: RiskLevel,
        at: DateTime<Utc>,
    ) -> Option<ParticipantChange> {
        let session_id = self.session.id;
        let before = self.participants.get(platform_user_id).cloned();
        let participant = self
            .participants
            .entry(platform_user_id.to_string())
            .or_insert_with(|| Participant::new(session_id, platform_user_id.to_string(), ParticipantRole::Participant, at));

        if !participant.raise_risk(level) {
            return None;
        }
        let participant = participant.clone();
        self.session.participant_count = self.participants.len() as i64;

        Some(ParticipantChange {
            participant,
            before,
            risk_raised: true,
        })
    }

    /// Explicit reviewer reset; may lower the level
    pub fn reset_participant_risk(&mut self, participant_id: Uuid, level: RiskLevel) -> Option<(Participant, Participant)> {
        let participant = self.participants.values_mut().find(|p| p.id == participant_id)?;
        let before = participant.clone();
        participant.risk_level = level;
        Some((before, participant.clone()))
    }

    /// Store a fresh score. The peak only ever rises.
    pub fn apply_score(&mut self, breakdown: &ScoreBreakdown, flagged: f64, emergency: f64) -> ScoreTransition {
        let previous_score = self.session.risk_score;
        let previous_peak = self.session.peak_risk_score;

        self.session.risk_score = breakdown.score;
        if breakdown.score > self.session.peak_risk_score {
            self.session.peak_risk_score = breakdown.score;
        }
        let status_changed = self.session.escalate_status(flagged, emergency);

        ScoreTransition {
            previous_score,
            previous_peak,
            score: breakdown.score,
            status_changed,
        }
    }

    pub fn record_gap(&mut self, reason: String, at: DateTime<Utc>) {
        self.session.scoring_gaps += 1;
        self.session.last_scoring_gap = Some(ScoringGap { at, reason });
    }

    pub fn mark_alerted(&mut self, alert_type: AlertType) {
        self.alerted_types.insert(alert_type);
    }

    pub fn has_alerted(&self, alert_type: AlertType) -> bool {
        self.alerted_types.contains(&alert_type)
    }
}
