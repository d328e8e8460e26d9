//! Notification Dispatch
//!
//! Delivery mechanics belong to external services; the pipeline only
//! decides which channels an alert goes to and at what priority, and
//! reports operational conditions (scoring gaps, audit gaps, integrity
//! failures) to the operators.

pub mod webhook;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::error::NotifyError;
use crate::logic::alert::{channels_for, priority_for, Alert};

pub use webhook::WebhookNotifier;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationChannel {
    Dashboard,
    Push,
    Email,
    Sms,
    Webhook,
    EmergencyCall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationPriority {
    Normal,
    High,
    Urgent,
    Immediate,
}

/// Conditions operators must see; never user-facing alerts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "condition", rename_all = "snake_case")]
pub enum OpsCondition {
    ScoringGap { session_id: Uuid, reason: String },
    AuditGap { action: String, resource_id: String, reason: String },
    IntegrityFailure { evidence_id: Uuid, alert_id: Uuid, reason: String },
    NotificationFailure { alert_id: Uuid, channel: NotificationChannel, reason: String },
}

impl std::fmt::Display for OpsCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpsCondition::ScoringGap { session_id, reason } => {
                write!(f, "scoring gap on session {}: {}", session_id, reason)
            }
            OpsCondition::AuditGap { action, resource_id, reason } => {
                write!(f, "audit gap for {} on {}: {}", action, resource_id, reason)
            }
            OpsCondition::IntegrityFailure { evidence_id, alert_id, reason } => {
                write!(f, "evidence {} (alert {}) failed integrity check: {}", evidence_id, alert_id, reason)
            }
            OpsCondition::NotificationFailure { alert_id, channel, reason } => {
                write!(f, "notification of alert {} via {} failed: {}", alert_id, channel, reason)
            }
        }
    }
}

// ============================================================================
// NOTIFIER
// ============================================================================

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        alert: &Alert,
        channel: NotificationChannel,
        priority: NotificationPriority,
    ) -> Result<(), NotifyError>;

    /// Report an operational condition; must not fail
    async fn operational(&self, condition: &OpsCondition);
}

/// Send an alert to every channel its severity calls for.
///
/// Channel failures are reported as operational conditions; retries of the
/// channel itself are the delivery service's concern.
pub async fn dispatch_alert(notifier: &dyn Notifier, alert: &Alert) {
    let priority = priority_for(alert.severity);

    for channel in channels_for(alert.severity) {
        if let Err(e) = notifier.notify(alert, channel, priority).await {
            log::warn!("Alert {} not delivered via {}: {}", alert.id, channel, e);
            notifier
                .operational(&OpsCondition::NotificationFailure {
                    alert_id: alert.id,
                    channel,
                    reason: e.to_string(),
                })
                .await;
        }
    }
}

// ============================================================================
// IMPLEMENTATIONS
// ============================================================================

/// Writes notifications to the log; ops conditions go to the `ops` target
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        alert: &Alert,
        channel: NotificationChannel,
        priority: NotificationPriority,
    ) -> Result<(), NotifyError> {
        log::info!(
            "[{}/{}] {} alert {} for session {} (score {:.2})",
            channel,
            priority,
            alert.severity,
            alert.alert_type,
            alert.session_id,
            alert.risk_score
        );
        Ok(())
    }

    async fn operational(&self, condition: &OpsCondition) {
        log::error!(target: "ops", "{}", condition);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub alert_id: Uuid,
    pub channel: NotificationChannel,
    pub priority: NotificationPriority,
}

/// Keeps every notification in memory
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    deliveries: Mutex<Vec<Delivery>>,
    conditions: Mutex<Vec<OpsCondition>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }

    pub fn conditions(&self) -> Vec<OpsCondition> {
        self.conditions.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        alert: &Alert,
        channel: NotificationChannel,
        priority: NotificationPriority,
    ) -> Result<(), NotifyError> {
        self.deliveries.lock().push(Delivery {
            alert_id: alert.id,
            channel,
            priority,
        });
        Ok(())
    }

    async fn operational(&self, condition: &OpsCondition) {
        log::error!(target: "ops", "{}", condition);
        self.conditions.lock().push(condition.clone());
    }
}
