//! Event publisher adapters.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use ledger_types::ports::{EventPublisher, PublishError};

use super::signing::sign_payload;

pub const TOPIC_HEADER: &str = "x-ledger-topic";
pub const KEY_HEADER: &str = "x-ledger-key";
pub const SIGNATURE_HEADER: &str = "x-ledger-signature";

/// POSTs each event to a relay endpoint. The raw JSON body is signed with
/// HMAC-SHA256 when a secret is configured.
pub struct HttpEventPublisher {
    client: Client,
    url: String,
    signing_secret: Option<String>,
}

impl HttpEventPublisher {
    pub fn new(
        url: impl Into<String>,
        signing_secret: Option<String>,
        timeout: Duration,
    ) -> Result<Self, PublishError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PublishError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            signing_secret: signing_secret.filter(|s| !s.is_empty()),
        })
    }
}

#[async_trait]
impl EventPublisher for HttpEventPublisher {
    #[tracing::instrument(skip(self, payload))]
    async fn publish(&self, topic: &str, key: &str, payload: &Value) -> Result<(), PublishError> {
        let body =
            serde_json::to_vec(payload).map_err(|e| PublishError::Serialization(e.to_string()))?;

        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(TOPIC_HEADER, topic)
            .header(KEY_HEADER, key);
        if let Some(secret) = &self.signing_secret {
            request = request.header(SIGNATURE_HEADER, sign_payload(&body, secret));
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = response.text().await.unwrap_or_default();
        Err(PublishError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

/// Writes events to the log instead of a bus. Development only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventPublisher;

#[async_trait]
impl EventPublisher for LogEventPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: &Value) -> Result<(), PublishError> {
        tracing::info!(topic, key, payload = %payload, "event published");
        Ok(())
    }
}
