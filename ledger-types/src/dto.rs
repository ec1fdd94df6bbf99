//! Data Transfer Objects (DTOs) for requests and responses.
//!
//! Amounts travel as decimal strings, never as binary floats.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{
    AccountId, Direction, JournalEntry, JournalId, Payment, PaymentId, PaymentStatus,
    PaymentStep, StatementKind, StatementLine, format_amount,
};
use crate::ports::AccountSummary;

// ─────────────────────────────────────────────────────────────────────────────
// Payment DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to move money between two customer accounts.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostPaymentRequest {
    /// Caller-supplied key; retries with the same key replay the first result
    #[schema(example = "order-2024-0001")]
    pub idempotency_key: String,
    pub source_account_id: String,
    pub destination_account_id: String,
    #[schema(example = "USD")]
    pub currency: String,
    #[schema(example = "50.00")]
    pub amount: String,
    #[schema(example = "user:alice")]
    pub initiated_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PostPaymentResponse {
    pub payment_id: PaymentId,
    pub status: PaymentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentStepResponse {
    pub step: String,
    pub state: String,
    #[schema(value_type = Object)]
    pub details: serde_json::Value,
    pub attempted_at: DateTime<Utc>,
}

impl From<PaymentStep> for PaymentStepResponse {
    fn from(s: PaymentStep) -> Self {
        Self {
            step: s.step,
            state: s.state,
            details: s.details,
            attempted_at: s.attempted_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentResponse {
    pub payment_id: PaymentId,
    pub idempotency_key: String,
    pub source_account_id: AccountId,
    pub destination_account_id: AccountId,
    pub currency: String,
    #[schema(example = "50.000000")]
    pub amount: String,
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    pub hold_id: PaymentId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal_id: Option<JournalId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub steps: Vec<PaymentStepResponse>,
}

impl PaymentResponse {
    pub fn from_parts(payment: Payment, steps: Vec<PaymentStep>) -> Self {
        Self {
            payment_id: payment.id,
            idempotency_key: payment.idempotency_key.clone(),
            source_account_id: payment.source_account,
            destination_account_id: payment.destination_account,
            currency: payment.currency.to_string(),
            amount: format_amount(payment.amount),
            status: payment.status,
            hold_id: payment.hold_id(),
            customer_id: payment.customer_id,
            journal_id: payment.journal_id,
            created_at: payment.created_at,
            updated_at: payment.updated_at,
            steps: steps.into_iter().map(Into::into).collect(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ledger DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Administrative top-up of a customer account.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreditAccountRequest {
    pub idempotency_key: String,
    pub account_id: String,
    #[schema(example = "USD")]
    pub currency: String,
    #[schema(example = "100.00")]
    pub amount: String,
    pub initiated_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct JournalPostedResponse {
    pub journal_id: JournalId,
    #[schema(example = "posted")]
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ManualLineRequest {
    #[schema(example = "GL_SYSTEM_FUND")]
    pub gl_account_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ManualJournalEntryRequest {
    pub currency: String,
    pub initiated_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,
    pub lines: Vec<ManualLineRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct JournalEntriesQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    /// 1-based page number
    pub page: Option<u32>,
    pub size: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JournalLineView {
    pub gl_account_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterparty_ref: Option<AccountId>,
    pub debit: String,
    pub credit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JournalEntryView {
    pub journal_id: JournalId,
    pub currency: String,
    pub status: String,
    pub booked_at: DateTime<Utc>,
    pub external_ref: String,
    pub created_by: String,
    pub lines: Vec<JournalLineView>,
}

impl From<JournalEntry> for JournalEntryView {
    fn from(j: JournalEntry) -> Self {
        Self {
            journal_id: j.id,
            currency: j.currency.to_string(),
            status: j.status.as_str().to_string(),
            booked_at: j.booked_at,
            external_ref: j.external_ref,
            created_by: j.created_by,
            lines: j
                .lines
                .into_iter()
                .map(|l| JournalLineView {
                    gl_account_code: l.gl_account.code().to_string(),
                    counterparty_ref: l.counterparty,
                    debit: format_amount(l.debit),
                    credit: format_amount(l.credit),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JournalEntriesPage {
    pub entries: Vec<JournalEntryView>,
    pub page: u32,
    pub size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatementQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub page: Option<u32>,
    pub size: Option<u32>,
    #[serde(default)]
    pub include_counterparty: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatementItemView {
    pub journal_id: JournalId,
    pub booked_at: DateTime<Utc>,
    pub currency: String,
    pub direction: Direction,
    #[schema(example = "50.000000")]
    pub amount: String,
    pub kind: StatementKind,
    pub memo: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterparty_account_id: Option<AccountId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterparty: Option<AccountSummary>,
}

impl From<StatementLine> for StatementItemView {
    fn from(s: StatementLine) -> Self {
        Self {
            journal_id: s.journal_id,
            booked_at: s.booked_at,
            currency: s.currency.to_string(),
            direction: s.direction,
            amount: format_amount(s.amount),
            kind: s.kind,
            memo: s.memo,
            counterparty_account_id: s.counterparty,
            counterparty: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatementPage {
    pub items: Vec<StatementItemView>,
    pub page: u32,
    pub size: u32,
}
