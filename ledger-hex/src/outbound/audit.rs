//! Audit sinks.

use std::sync::Arc;

use async_trait::async_trait;

use ledger_types::ports::{AuditError, AuditPort, AuditRecord, EventPublisher};

pub const DEFAULT_AUDIT_TOPIC: &str = "ledger.audit";

/// Publishes audit records to a topic through an [`EventPublisher`], keyed
/// by entity id.
pub struct PublisherAudit {
    publisher: Arc<dyn EventPublisher>,
    topic: String,
}

impl PublisherAudit {
    pub fn new(publisher: Arc<dyn EventPublisher>, topic: impl Into<String>) -> Self {
        Self {
            publisher,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl AuditPort for PublisherAudit {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        let payload = serde_json::to_value(&record).map_err(|e| AuditError(e.to_string()))?;
        self.publisher
            .publish(&self.topic, &record.entity_id, &payload)
            .await
            .map_err(|e| AuditError(e.to_string()))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogAudit;

#[async_trait]
impl AuditPort for LogAudit {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        tracing::info!(
            action = %record.action,
            entity = %record.entity,
            entity_id = %record.entity_id,
            actor = %record.actor,
            details = %record.details,
            "audit"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::Utc;
    use serde_json::{Value, json};

    use super::*;
    use ledger_types::ports::PublishError;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<(String, String, Value)>>,
    }

    #[async_trait]
    impl EventPublisher for Recording {
        async fn publish(
            &self,
            topic: &str,
            key: &str,
            payload: &Value,
        ) -> Result<(), PublishError> {
            self.sent
                .lock()
                .unwrap()
                .push((topic.to_string(), key.to_string(), payload.clone()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_record_is_published_to_audit_topic() {
        let publisher = Arc::new(Recording::default());
        let audit = PublisherAudit::new(publisher.clone(), DEFAULT_AUDIT_TOPIC);

        audit
            .record(AuditRecord {
                action: "payments.post".into(),
                entity: "payments".into(),
                entity_id: "p-1".into(),
                actor: "alice".into(),
                at: Utc::now(),
                details: json!({ "amount": "50.00" }),
            })
            .await
            .unwrap();

        let sent = publisher.sent.lock().unwrap();
        let (topic, key, payload) = &sent[0];
        assert_eq!(topic, "ledger.audit");
        assert_eq!(key, "p-1");
        assert_eq!(payload["action"], "payments.post");
        assert_eq!(payload["actor"], "alice");
        assert_eq!(payload["details"]["amount"], "50.00");
    }
}
