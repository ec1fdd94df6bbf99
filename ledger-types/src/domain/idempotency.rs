//! Write-once idempotency records.

use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::DomainError;

/// Operation names stored alongside each record.
pub mod operations {
    pub const POST_PAYMENT: &str = "PostPayment";
    pub const CREDIT_ACCOUNT: &str = "CreditAccount";
}

/// Cached response for a caller-supplied idempotency key.
#[derive(Debug, Clone, PartialEq)]
pub struct IdempotencyRecord {
    pub key: String,
    pub operation: String,
    /// Serialized response, replayed verbatim on retries.
    pub response_json: String,
    pub status_code: u16,
    pub created_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn new<T: Serialize>(
        key: &str,
        operation: &str,
        response: &T,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let response_json = serde_json::to_string(response)
            .map_err(|e| DomainError::Serialization(e.to_string()))?;
        Ok(Self {
            key: key.to_string(),
            operation: operation.to_string(),
            response_json,
            status_code: 200,
            created_at,
        })
    }

    /// Decodes the cached response, refusing records of another operation.
    pub fn replay<T: DeserializeOwned>(&self, operation: &str) -> Result<T, DomainError> {
        if self.operation != operation {
            return Err(DomainError::IdempotencyKeyReused {
                key: self.key.clone(),
                operation: self.operation.clone(),
            });
        }
        serde_json::from_str(&self.response_json)
            .map_err(|e| DomainError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_other_operation_is_conflict() {
        let rec = IdempotencyRecord::new(
            "key-00000001",
            operations::POST_PAYMENT,
            &serde_json::json!({"status": "posted"}),
            Utc::now(),
        )
        .unwrap();

        let same: serde_json::Value = rec.replay(operations::POST_PAYMENT).unwrap();
        assert_eq!(same["status"], "posted");

        let err = rec
            .replay::<serde_json::Value>(operations::CREDIT_ACCOUNT)
            .unwrap_err();
        assert!(matches!(err, DomainError::IdempotencyKeyReused { .. }));
    }
}
