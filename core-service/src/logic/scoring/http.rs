//! HTTP Scoring Oracle
//!
//! Talks JSON to an external analysis service:
//! `POST {base}/v1/analyze/message` and `POST {base}/v1/analyze/session`,
//! both answering with a list of verdicts.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::oracle::ScoringOracle;
use super::types::OracleVerdict;
use crate::error::OracleError;
use crate::logic::session::{Message, Participant, Session};

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    session: &'a Session,
    message: &'a Message,
}

#[derive(Debug, Serialize)]
struct SessionRequest<'a> {
    session: &'a Session,
    participants: &'a [Participant],
}

pub struct HttpOracle {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpOracle {
    /// `timeout` bounds a single request; retries are layered on top
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, OracleError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Unavailable(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Vec<OracleVerdict>, OracleError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .http_client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OracleError::Unavailable(format!("request to {} timed out", url))
                } else {
                    OracleError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| OracleError::InvalidResponse(e.to_string()))
        } else if status.is_server_error() || status.as_u16() == 429 {
            Err(OracleError::Unavailable(format!("oracle answered {}", status.as_u16())))
        } else {
            let error_text = response.text().await.unwrap_or_default();
            Err(OracleError::InvalidResponse(format!("{}: {}", status.as_u16(), error_text)))
        }
    }
}

#[async_trait]
impl ScoringOracle for HttpOracle {
    async fn analyze_message(&self, session: &Session, message: &Message) -> Result<Vec<OracleVerdict>, OracleError> {
        self.post("/v1/analyze/message", &MessageRequest { session, message }).await
    }

    async fn analyze_session(
        &self,
        session: &Session,
        participants: &[Participant],
    ) -> Result<Vec<OracleVerdict>, OracleError> {
        self.post("/v1/analyze/session", &SessionRequest { session, participants })
            .await
    }
}
