//! Port traits (interfaces for adapters).
//!
//! The application layer depends on these traits, not on concrete
//! implementations.

mod accounts;
mod events;
mod repository;

pub use accounts::{
    AccountSummary, AccountsGateway, GatewayError, HoldOutcome, HoldRequest, ValidationOutcome,
};
pub use events::{AuditError, AuditPort, AuditRecord, EventPublisher, PublishError};
pub use futures::future::BoxFuture;
pub use repository::{
    IdempotencyRepository, JournalRepository, OutboxRepository, PaymentRepository, Repositories,
    UnitOfWorkManager,
};
