//! Domain models for the ledger.

pub mod idempotency;
pub mod ids;
pub mod journal;
pub mod money;
pub mod outbox;
pub mod payment;
pub mod statement;

pub use idempotency::{IdempotencyRecord, operations};
pub use ids::{AccountId, EventId, JournalId, PaymentId};
pub use journal::{EntryLine, GlAccount, JournalEntry, JournalStatus, ensure_balanced};
pub use money::{AMOUNT_SCALE, Currency, format_amount};
pub use outbox::{OutboxEvent, event_types};
pub use payment::{Payment, PaymentStatus, PaymentStep, steps};
pub use statement::{Direction, StatementKind, StatementLine};
