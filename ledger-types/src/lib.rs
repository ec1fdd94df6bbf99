//! # Ledger Types
//!
//! Domain types and port traits for the ledger and payments engine.
//! This crate has no IO: only data structures, business rules, and trait
//! definitions.
//!
//! ## Architecture
//!
//! - `domain/` - journals, payments, outbox events, idempotency records
//! - `ports/` - Unit of Work, accounts gateway, publisher and audit traits
//! - `dto/` - request and response shapes for the API boundary
//! - `validation/` - turns raw DTOs into typed commands
//! - `error/` - domain, repository and application errors

pub mod domain;
pub mod dto;
pub mod error;
pub mod ports;
pub mod validation;

pub use domain::{
    AccountId, Currency, EntryLine, EventId, GlAccount, IdempotencyRecord, JournalEntry,
    JournalId, JournalStatus, OutboxEvent, Payment, PaymentId, PaymentStatus, PaymentStep,
};
pub use dto::*;
pub use error::{AppError, DomainError, RepoError};
pub use ports::{
    AccountsGateway, AuditPort, EventPublisher, Repositories, UnitOfWorkManager,
};
