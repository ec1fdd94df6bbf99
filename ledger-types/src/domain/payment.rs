//! Payment aggregate and its saga step log.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ids::{AccountId, JournalId, PaymentId};
use super::money::Currency;
use crate::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Posted,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Posted => "posted",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        match raw {
            "pending" => Ok(PaymentStatus::Pending),
            "processing" => Ok(PaymentStatus::Processing),
            "posted" => Ok(PaymentStatus::Posted),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(DomainError::Validation(format!(
                "unknown payment status: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payment between two customer accounts.
///
/// Created once per idempotency key and never deleted. The hold reserved
/// at the Accounts service shares the payment's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub idempotency_key: String,
    pub source_account: AccountId,
    pub destination_account: AccountId,
    pub amount: Decimal,
    pub currency: Currency,
    pub status: PaymentStatus,
    pub customer_id: Option<String>,
    pub journal_id: Option<JournalId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn hold_id(&self) -> PaymentId {
        self.id
    }
}

/// Saga milestones recorded on the step log.
pub mod steps {
    pub const RESERVE_HOLD: &str = "reserve_hold";
    pub const POST_LEDGER: &str = "post_ledger";
}

/// One append-only entry of a payment's saga log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentStep {
    pub payment_id: PaymentId,
    pub step: String,
    pub state: String,
    pub details: serde_json::Value,
    pub attempted_at: DateTime<Utc>,
}

impl PaymentStep {
    pub fn ok(
        payment_id: PaymentId,
        step: &str,
        details: serde_json::Value,
        attempted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            payment_id,
            step: step.to_string(),
            state: "ok".to_string(),
            details,
            attempted_at,
        }
    }
}
