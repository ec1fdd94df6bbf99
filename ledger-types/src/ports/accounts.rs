//! Accounts service port.
//!
//! The ledger never owns customer balances. It asks the Accounts service to
//! validate a movement and to reserve or release holds.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{AccountId, Currency, PaymentId};
use crate::error::AppError;

/// Transport-level failure talking to the Accounts service.
///
/// Business refusals are not errors; they come back as `ok == false`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("accounts service unavailable: {0}")]
    Unavailable(String),

    #[error("accounts call timed out after {0:?}")]
    Timeout(Duration),

    #[error("accounts circuit breaker is open")]
    CircuitOpen,

    #[error("accounts transport error: {0}")]
    Transport(String),
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        AppError::Unavailable(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub ok: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

impl ValidationOutcome {
    pub fn accepted() -> Self {
        Self {
            ok: true,
            reason: None,
        }
    }

    pub fn refused(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldRequest {
    pub account_id: AccountId,
    pub currency: Currency,
    pub amount: Decimal,
    pub hold_id: PaymentId,
    pub idempotency_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldOutcome {
    pub ok: bool,
    #[serde(default)]
    pub status: String,
    /// Total amount held on the account after the call.
    #[serde(default)]
    pub new_hold: Option<Decimal>,
}

/// Display data for a customer account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AccountSummary {
    pub account_id: AccountId,
    pub account_number: String,
    pub display_name: String,
    pub account_type: String,
}

#[async_trait::async_trait]
pub trait AccountsGateway: Send + Sync + 'static {
    async fn validate_accounts_and_limits(
        &self,
        source: AccountId,
        destination: AccountId,
        currency: &Currency,
        amount: Decimal,
    ) -> Result<ValidationOutcome, GatewayError>;

    async fn reserve_hold(&self, req: &HoldRequest) -> Result<HoldOutcome, GatewayError>;

    async fn release_hold(&self, req: &HoldRequest) -> Result<HoldOutcome, GatewayError>;

    async fn batch_get_account_summaries(
        &self,
        ids: &[AccountId],
    ) -> Result<Vec<AccountSummary>, GatewayError>;
}
