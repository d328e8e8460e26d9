//! Alert Manager
//!
//! Decides from a score transition whether to open, update, or leave
//! alerts alone, and runs the manual lifecycle:
//!
//! ```text
//! new ─► acknowledged ─► investigating ─► resolved | false_positive | dismissed
//!  │           │               │
//!  └───────────┴───────────────┴────► escalated ──(reopen)──► new alert
//! ```
//!
//! Escalated is out of automated hands: it never absorbs a signal. A later
//! upward crossing of the same type opens a fresh alert beside it, so a
//! session can hold an escalated alert and an active one of one type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;
use uuid::Uuid;

use super::rules::SeverityBands;
use super::types::{Alert, AlertStatus, AlertType, Severity, Trigger};
use crate::error::{MonitorError, MonitorResult};
use crate::logic::session::Session;

/// Actor recorded for automated transitions
pub const SYSTEM_ACTOR: &str = "system";

// ============================================================================
// AUTOMATED DECISIONS
// ============================================================================

/// One recomputation as the alert manager sees it
#[derive(Debug, Clone)]
pub struct AlertSignal {
    pub alert_type: AlertType,
    pub score: f64,
    /// Peak before this recomputation
    pub previous_peak: f64,
    pub confidence: f64,
    pub trigger: Trigger,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlertDecision {
    Open { severity: Severity },
    Update { alert_id: Uuid, severity: Severity },
    Nothing,
}

/// Manual lifecycle operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, IntoStaticStr)]
#[serde(tag = "action", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlertOp {
    Acknowledge { notes: Option<String> },
    Investigate { notes: Option<String> },
    Resolve { false_positive: bool, reason: Option<String> },
    Dismiss { reason: Option<String> },
    Escalate { target: String, reference: Option<String> },
    Reassess { severity: Severity, reason: Option<String> },
    Reopen { reason: String },
}

impl AlertOp {
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

#[derive(Debug, Clone)]
pub enum AlertOutcome {
    /// The alert was changed in place
    Changed,
    /// A new alert was opened from an escalated one
    Reopened(Alert),
}

#[derive(Debug, Clone, Default)]
pub struct AlertManager {
    bands: SeverityBands,
}

impl AlertManager {
    pub fn new(bands: SeverityBands) -> Self {
        Self { bands }
    }

    pub fn bands(&self) -> &SeverityBands {
        &self.bands
    }

    /// Open when the score sits in a band and either crossed upward into a
    /// higher band than the previous peak or this type never alerted here.
    /// An active alert of the same type absorbs the signal instead.
    pub fn evaluate(&self, signal: &AlertSignal, active: Option<&Alert>, ever_alerted: bool) -> AlertDecision {
        let Some(severity) = self.bands.band(signal.score) else {
            return AlertDecision::Nothing;
        };

        if let Some(alert) = active {
            return AlertDecision::Update {
                alert_id: alert.id,
                severity,
            };
        }

        let crossed = Some(severity) > self.bands.band(signal.previous_peak);
        if crossed || !ever_alerted {
            AlertDecision::Open { severity }
        } else {
            AlertDecision::Nothing
        }
    }

    pub fn open(&self, session: &Session, signal: &AlertSignal, severity: Severity, now: DateTime<Utc>) -> Alert {
        Alert {
            id: Uuid::new_v4(),
            session_id: session.id,
            child_id: session.child_id,
            guardian_id: session.guardian_id,
            alert_type: signal.alert_type,
            severity,
            status: AlertStatus::New,
            title: title_for(signal.alert_type, severity),
            description: format!(
                "Session risk reached {:.2} during a {} session",
                signal.score,
                session.session_type.to_string().replace('_', " ")
            ),
            risk_score: signal.score,
            confidence_score: signal.confidence,
            trigger: signal.trigger.clone(),
            false_positive: false,
            false_positive_reason: None,
            resolution_notes: None,
            acknowledged_at: None,
            acknowledged_by: None,
            investigating_at: None,
            investigating_by: None,
            resolved_at: None,
            resolved_by: None,
            escalated_at: None,
            escalated_by: None,
            escalation_target: None,
            escalation_reference: None,
            reopened_from: None,
            history: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    /// Fold a new signal into an active alert. Severity only rises here.
    /// Returns true when the severity went up.
    pub fn absorb(&self, alert: &mut Alert, signal: &AlertSignal, severity: Severity, now: DateTime<Utc>) -> bool {
        alert.risk_score = signal.score;
        alert.confidence_score = signal.confidence;
        alert.trigger = signal.trigger.clone();

        let raised = severity > alert.severity;
        if raised {
            alert.severity = severity;
            alert.title = title_for(alert.alert_type, severity);
        }
        let status = alert.status;
        alert.push_action(
            "updated",
            SYSTEM_ACTOR,
            status,
            Some(format!("score {:.2}", signal.score)),
            now,
        );
        raised
    }

    // ========================================================================
    // MANUAL LIFECYCLE
    // ========================================================================

    /// Apply a manual operation. Illegal transitions leave the alert as it was.
    pub fn apply(&self, alert: &mut Alert, op: &AlertOp, actor: &str, now: DateTime<Utc>) -> MonitorResult<AlertOutcome> {
        use AlertStatus::*;

        let from = alert.status;
        let alert_id = alert.id;
        let conflict = || MonitorError::StateConflict {
            alert_id,
            from,
            action: op.name(),
        };

        let notes = match op {
            AlertOp::Acknowledge { notes } => {
                if from != New {
                    return Err(conflict());
                }
                alert.status = Acknowledged;
                alert.acknowledged_at = Some(now);
                alert.acknowledged_by = Some(actor.to_string());
                notes.clone()
            }
            AlertOp::Investigate { notes } => {
                if from != Acknowledged {
                    return Err(conflict());
                }
                alert.status = Investigating;
                alert.investigating_at = Some(now);
                alert.investigating_by = Some(actor.to_string());
                notes.clone()
            }
            AlertOp::Resolve { false_positive, reason } => {
                if !matches!(from, Acknowledged | Investigating) {
                    return Err(conflict());
                }
                if *false_positive {
                    alert.status = FalsePositive;
                    alert.false_positive = true;
                    alert.false_positive_reason = reason.clone();
                } else {
                    alert.status = Resolved;
                }
                alert.resolution_notes = reason.clone();
                alert.resolved_at = Some(now);
                alert.resolved_by = Some(actor.to_string());
                reason.clone()
            }
            AlertOp::Dismiss { reason } => {
                if !matches!(from, Acknowledged | Investigating) {
                    return Err(conflict());
                }
                alert.status = Dismissed;
                alert.resolution_notes = reason.clone();
                alert.resolved_at = Some(now);
                alert.resolved_by = Some(actor.to_string());
                reason.clone()
            }
            AlertOp::Escalate { target, reference } => {
                if !from.is_active() {
                    return Err(conflict());
                }
                alert.status = Escalated;
                alert.escalated_at = Some(now);
                alert.escalated_by = Some(actor.to_string());
                alert.escalation_target = Some(target.clone());
                alert.escalation_reference = reference.clone();
                Some(match reference {
                    Some(r) => format!("escalated to {} ({})", target, r),
                    None => format!("escalated to {}", target),
                })
            }
            AlertOp::Reassess { severity, reason } => {
                if !matches!(from, Acknowledged | Investigating) {
                    return Err(conflict());
                }
                let note = format!("severity {} -> {}", alert.severity, severity);
                alert.severity = *severity;
                alert.title = title_for(alert.alert_type, *severity);
                Some(match reason {
                    Some(r) => format!("{}: {}", note, r),
                    None => note,
                })
            }
            AlertOp::Reopen { reason } => {
                if from != Escalated {
                    return Err(conflict());
                }
                let reopened = self.reopen(alert, actor, reason, now);
                return Ok(AlertOutcome::Reopened(reopened));
            }
        };

        alert.push_action(op.name(), actor, from, notes, now);
        Ok(AlertOutcome::Changed)
    }

    /// New alert carrying the escalated one's context; the original is untouched
    fn reopen(&self, escalated: &Alert, actor: &str, reason: &str, now: DateTime<Utc>) -> Alert {
        let mut alert = Alert {
            id: Uuid::new_v4(),
            status: AlertStatus::New,
            false_positive: false,
            false_positive_reason: None,
            resolution_notes: None,
            acknowledged_at: None,
            acknowledged_by: None,
            investigating_at: None,
            investigating_by: None,
            resolved_at: None,
            resolved_by: None,
            escalated_at: None,
            escalated_by: None,
            escalation_target: None,
            escalation_reference: None,
            reopened_from: Some(escalated.id),
            history: vec![],
            created_at: now,
            updated_at: now,
            ..escalated.clone()
        };
        alert.push_action("reopened", actor, AlertStatus::Escalated, Some(reason.to_string()), now);
        alert
    }
}

fn title_for(alert_type: AlertType, severity: Severity) -> String {
    let label = match alert_type {
        AlertType::GroomingDetected => "Possible grooming detected",
        AlertType::InappropriateContent => "Inappropriate content",
        AlertType::StrangerContact => "Contact from a stranger",
        AlertType::PersonalInfoRequest => "Request for personal information",
        AlertType::MeetingRequest => "Request to meet in person",
        AlertType::SuspiciousBehavior => "Suspicious behavior",
        AlertType::Cyberbullying => "Possible cyberbullying",
        AlertType::SelfHarmIndicators => "Self-harm indicators",
        AlertType::EmergencyKeywords => "Emergency keywords",
        AlertType::PlatformViolation => "Platform rule violation",
    };
    format!("{} ({})", label, severity)
}
