//! # Ledger Hex
//!
//! Application services, the outbox relay and the adapters around them.
//!
//! ## Architecture
//!
//! - `service/` - payment saga and ledger operations
//! - `outbox` - background relay from the outbox table to the event bus
//! - `outbound/` - accounts service client, event publishers, audit sinks
//! - `inbound/` - HTTP adapter (Axum server)
//!
//! Services are generic over `U: UnitOfWorkManager`, so any storage adapter
//! from `ledger-repo` can be injected.

pub mod inbound;
pub mod openapi;
pub mod outbound;
pub mod outbox;
pub mod service;

#[cfg(test)]
mod service_tests;

pub use outbox::{OutboxConfig, OutboxWorker, RunOutcome};
pub use service::{LedgerService, PaymentService};
