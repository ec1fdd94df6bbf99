//! Event publishing and audit ports.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("publish transport error: {0}")]
    Transport(String),

    #[error("publish rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("publish serialization error: {0}")]
    Serialization(String),
}

/// Relays integration events to the message bus.
#[async_trait::async_trait]
pub trait EventPublisher: Send + Sync + 'static {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &serde_json::Value,
    ) -> Result<(), PublishError>;
}

/// One audit trail entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub action: String,
    pub entity: String,
    pub entity_id: String,
    pub actor: String,
    pub at: DateTime<Utc>,
    pub details: serde_json::Value,
}

#[derive(Debug, thiserror::Error)]
#[error("audit error: {0}")]
pub struct AuditError(pub String);

/// Out-of-band audit sink. Callers treat every failure as best-effort.
#[async_trait::async_trait]
pub trait AuditPort: Send + Sync + 'static {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError>;
}
