//! Unit-of-Work and repository ports.
//!
//! Services never talk to a connection directly. They ask the
//! [`UnitOfWorkManager`] for a bundle of repositories bound either to a
//! plain read connection or to a single write transaction, and hand it a
//! closure that does the work. A write commits only if the closure returns
//! `Ok`; an error or a panic rolls everything back.

use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;

use crate::domain::{
    AccountId, EventId, IdempotencyRecord, JournalEntry, JournalId, OutboxEvent, Payment,
    PaymentId, PaymentStep,
};
use crate::error::RepoError;

#[async_trait::async_trait]
pub trait PaymentRepository: Send {
    async fn insert(&mut self, payment: &Payment) -> Result<(), RepoError>;

    async fn insert_step(&mut self, step: &PaymentStep) -> Result<(), RepoError>;

    async fn find_by_id(&mut self, id: PaymentId) -> Result<Option<Payment>, RepoError>;

    async fn find_by_idempotency_key(&mut self, key: &str) -> Result<Option<Payment>, RepoError>;

    /// Steps in the order they were attempted.
    async fn list_steps(&mut self, id: PaymentId) -> Result<Vec<PaymentStep>, RepoError>;
}

#[async_trait::async_trait]
pub trait JournalRepository: Send {
    /// Persists an entry and all of its lines. Re-checks the balance first.
    async fn insert_journal(&mut self, entry: &JournalEntry) -> Result<(), RepoError>;

    async fn get_journal(&mut self, id: JournalId) -> Result<Option<JournalEntry>, RepoError>;

    /// Journals with at least one line booked against `account` and
    /// `booked_at` within `[from, to]`, newest first. `page` is 1-based.
    async fn list_activity_by_account(
        &mut self,
        account: AccountId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        page: u32,
        size: u32,
    ) -> Result<Vec<JournalEntry>, RepoError>;
}

#[async_trait::async_trait]
pub trait OutboxRepository: Send {
    async fn insert(&mut self, event: &OutboxEvent) -> Result<(), RepoError>;

    async fn get(&mut self, id: EventId) -> Result<Option<OutboxEvent>, RepoError>;

    /// Claims up to `limit` unpublished rows for `owner`, oldest first.
    ///
    /// Rows already claimed by another worker are skipped unless the claim
    /// is older than `claim_ttl`. Concurrent callers never receive the same
    /// row.
    async fn claim_batch(
        &mut self,
        limit: u32,
        owner: &str,
        now: DateTime<Utc>,
        claim_ttl: Duration,
    ) -> Result<Vec<OutboxEvent>, RepoError>;

    async fn mark_published(
        &mut self,
        ids: &[EventId],
        now: DateTime<Utc>,
    ) -> Result<u64, RepoError>;

    /// Drops `owner`'s claim on rows that were not published.
    async fn release_claims(&mut self, ids: &[EventId], owner: &str) -> Result<u64, RepoError>;
}

#[async_trait::async_trait]
pub trait IdempotencyRepository: Send {
    async fn get(&mut self, key: &str) -> Result<Option<IdempotencyRecord>, RepoError>;

    /// Fails with [`RepoError::Conflict`] if the key already exists.
    async fn put(&mut self, record: &IdempotencyRecord) -> Result<(), RepoError>;
}

/// The repositories available inside one unit of work.
pub trait Repositories: Send {
    fn payments(&mut self) -> &mut dyn PaymentRepository;
    fn journals(&mut self) -> &mut dyn JournalRepository;
    fn outbox(&mut self) -> &mut dyn OutboxRepository;
    fn idempotency(&mut self) -> &mut dyn IdempotencyRepository;
}

#[async_trait::async_trait]
pub trait UnitOfWorkManager: Send + Sync + 'static {
    /// Runs `f` against read repositories. No transaction is opened.
    async fn do_read<T, F>(&self, f: F) -> Result<T, RepoError>
    where
        T: Send,
        F: for<'r> FnOnce(&'r mut dyn Repositories) -> BoxFuture<'r, Result<T, RepoError>> + Send;

    /// Runs `f` inside one write transaction.
    async fn do_write<T, F>(&self, f: F) -> Result<T, RepoError>
    where
        T: Send,
        F: for<'r> FnOnce(&'r mut dyn Repositories) -> BoxFuture<'r, Result<T, RepoError>> + Send;
}
