//! Webhook Notifier
//!
//! Posts a generic JSON payload per notification. The receiving service
//! fans out to push/email/SMS providers.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use super::{NotificationChannel, NotificationPriority, Notifier, OpsCondition};
use crate::error::NotifyError;
use crate::logic::alert::Alert;

pub struct WebhookNotifier {
    url: String,
    http_client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Delivery(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            url: url.into(),
            http_client,
        })
    }

    async fn post(&self, body: serde_json::Value) -> Result<(), NotifyError> {
        let response = self
            .http_client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(NotifyError::Delivery(format!("webhook answered {}", response.status().as_u16())))
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(
        &self,
        alert: &Alert,
        channel: NotificationChannel,
        priority: NotificationPriority,
    ) -> Result<(), NotifyError> {
        let body = json!({
            "kind": "alert",
            "channel": channel,
            "priority": priority,
            "sent_at": Utc::now(),
            "alert": {
                "id": alert.id,
                "session_id": alert.session_id,
                "child_id": alert.child_id,
                "guardian_id": alert.guardian_id,
                "type": alert.alert_type,
                "severity": alert.severity,
                "status": alert.status,
                "title": alert.title,
                "risk_score": alert.risk_score,
                "recommended_actions": alert.recommended_actions(),
            },
        });
        self.post(body).await
    }

    async fn operational(&self, condition: &OpsCondition) {
        log::error!(target: "ops", "{}", condition);

        let body = json!({
            "kind": "operational",
            "sent_at": Utc::now(),
            "condition": condition,
        });
        if let Err(e) = self.post(body).await {
            log::error!(target: "ops", "Failed to forward operational condition: {}", e);
        }
    }
}
