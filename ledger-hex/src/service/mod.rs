//! Application services.
//!
//! Orchestrate domain operations through the Unit-of-Work and gateway ports.
//! No infrastructure logic lives here.

mod ledger;
mod payment;

use chrono::{DateTime, Utc};
use ledger_types::ports::{AuditPort, AuditRecord};
use ledger_types::validation::{CreditAccountCommand, ManualJournalCommand, PostPaymentCommand};

pub use ledger::LedgerService;
pub use payment::PaymentService;

/// Identifies what a validated command acts on, for span fields and audit
/// records.
pub trait RequestResource {
    fn resource_type(&self) -> &'static str;
    fn resource_id(&self) -> String;
    fn actor(&self) -> &str;
}

impl RequestResource for PostPaymentCommand {
    fn resource_type(&self) -> &'static str {
        "payments"
    }

    fn resource_id(&self) -> String {
        self.idempotency_key.clone()
    }

    fn actor(&self) -> &str {
        &self.initiated_by
    }
}

impl RequestResource for CreditAccountCommand {
    fn resource_type(&self) -> &'static str {
        "journal_entries"
    }

    fn resource_id(&self) -> String {
        self.account.to_string()
    }

    fn actor(&self) -> &str {
        &self.initiated_by
    }
}

impl RequestResource for ManualJournalCommand {
    fn resource_type(&self) -> &'static str {
        "journal_entries"
    }

    fn resource_id(&self) -> String {
        if self.external_ref.is_empty() {
            "manual".to_string()
        } else {
            self.external_ref.clone()
        }
    }

    fn actor(&self) -> &str {
        &self.initiated_by
    }
}

/// Builds an audit record for `resource`, overriding the entity id.
pub(crate) fn audit_record(
    action: &str,
    resource: &dyn RequestResource,
    entity_id: impl Into<String>,
    at: DateTime<Utc>,
    details: serde_json::Value,
) -> AuditRecord {
    AuditRecord {
        action: action.to_string(),
        entity: resource.resource_type().to_string(),
        entity_id: entity_id.into(),
        actor: resource.actor().to_string(),
        at,
        details,
    }
}

/// Records an audit entry. Failures are logged and swallowed.
pub(crate) async fn record_audit(audit: &dyn AuditPort, record: AuditRecord) {
    let action = record.action.clone();
    if let Err(e) = audit.record(record).await {
        tracing::warn!(action = %action, error = %e, "audit record failed");
    }
}
