//! Transactional outbox rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ids::EventId;

/// Integration event types written to the outbox.
pub mod event_types {
    pub const PAYMENT_POSTED: &str = "payment.posted";
    pub const LEDGER_POSTED: &str = "ledger.posted";
    pub const LEDGER_MANUAL_POSTED: &str = "ledger.manual_posted";
}

/// An integration event awaiting (or past) delivery.
///
/// Inserted in the same transaction as the business fact it describes.
/// After commit only the outbox worker touches the `processing*` and
/// `published*` fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: EventId,
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub processing: bool,
    pub processing_owner: Option<String>,
    pub processing_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OutboxEvent {
    /// New unpublished, unclaimed event.
    pub fn pending(
        aggregate_type: &str,
        aggregate_id: Uuid,
        event_type: &str,
        payload: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EventId::new(),
            aggregate_type: aggregate_type.to_string(),
            aggregate_id,
            event_type: event_type.to_string(),
            payload,
            published: false,
            published_at: None,
            processing: false,
            processing_owner: None,
            processing_at: None,
            created_at,
        }
    }

    /// Whether a worker may claim this row at `now`.
    pub fn is_claimable(&self, now: DateTime<Utc>, claim_ttl: chrono::Duration) -> bool {
        if self.published {
            return false;
        }
        match (self.processing, self.processing_at) {
            (false, _) => true,
            (true, None) => true,
            (true, Some(at)) => at < now - claim_ttl,
        }
    }
}
