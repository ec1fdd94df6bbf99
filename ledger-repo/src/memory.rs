//! In-memory Unit-of-Work adapter.
//!
//! Used by tests and by `memory:` database URLs. A write works on a staged
//! copy of the state while holding the lock, and the copy replaces the state
//! only when the closure succeeds.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;
use tokio::sync::Mutex;

use ledger_types::domain::ensure_balanced;
use ledger_types::ports::{
    IdempotencyRepository, JournalRepository, OutboxRepository, PaymentRepository,
};
use ledger_types::{
    AccountId, EventId, IdempotencyRecord, JournalEntry, JournalId, OutboxEvent, Payment,
    PaymentId, PaymentStep, RepoError, Repositories, UnitOfWorkManager,
};

#[derive(Debug, Clone, Default)]
struct LedgerState {
    payments: HashMap<PaymentId, Payment>,
    steps: Vec<PaymentStep>,
    journals: Vec<JournalEntry>,
    outbox: Vec<OutboxEvent>,
    idempotency: HashMap<String, IdempotencyRecord>,
}

/// Unit-of-work manager backed by process memory.
#[derive(Debug, Default)]
pub struct InMemoryUow {
    state: Mutex<LedgerState>,
    fail_next_write: AtomicBool,
}

impl InMemoryUow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next successful write fail at commit time.
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }

    pub async fn payments(&self) -> Vec<Payment> {
        let mut payments: Vec<Payment> =
            self.state.lock().await.payments.values().cloned().collect();
        payments.sort_by_key(|p| p.created_at);
        payments
    }

    pub async fn journals(&self) -> Vec<JournalEntry> {
        self.state.lock().await.journals.clone()
    }

    pub async fn outbox_events(&self) -> Vec<OutboxEvent> {
        self.state.lock().await.outbox.clone()
    }

    pub async fn idempotency_records(&self) -> Vec<IdempotencyRecord> {
        self.state.lock().await.idempotency.values().cloned().collect()
    }
}

#[async_trait]
impl UnitOfWorkManager for InMemoryUow {
    async fn do_read<T, F>(&self, f: F) -> Result<T, RepoError>
    where
        T: Send,
        F: for<'r> FnOnce(&'r mut dyn Repositories) -> BoxFuture<'r, Result<T, RepoError>> + Send,
    {
        let mut snapshot = self.state.lock().await.clone();
        let mut repos = MemoryRepos {
            state: &mut snapshot,
        };
        f(&mut repos).await
    }

    async fn do_write<T, F>(&self, f: F) -> Result<T, RepoError>
    where
        T: Send,
        F: for<'r> FnOnce(&'r mut dyn Repositories) -> BoxFuture<'r, Result<T, RepoError>> + Send,
    {
        let mut guard = self.state.lock().await;
        let mut staged = guard.clone();

        let value = {
            let mut repos = MemoryRepos { state: &mut staged };
            f(&mut repos).await?
        };

        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(RepoError::Transaction("commit failed".to_string()));
        }
        *guard = staged;
        Ok(value)
    }
}

struct MemoryRepos<'s> {
    state: &'s mut LedgerState,
}

impl<'s> Repositories for MemoryRepos<'s> {
    fn payments(&mut self) -> &mut dyn PaymentRepository {
        self
    }

    fn journals(&mut self) -> &mut dyn JournalRepository {
        self
    }

    fn outbox(&mut self) -> &mut dyn OutboxRepository {
        self
    }

    fn idempotency(&mut self) -> &mut dyn IdempotencyRepository {
        self
    }
}

#[async_trait]
impl<'s> PaymentRepository for MemoryRepos<'s> {
    async fn insert(&mut self, payment: &Payment) -> Result<(), RepoError> {
        if self.state.payments.contains_key(&payment.id) {
            return Err(RepoError::Conflict(format!("payment {}", payment.id)));
        }
        if self
            .state
            .payments
            .values()
            .any(|p| p.idempotency_key == payment.idempotency_key)
        {
            return Err(RepoError::Conflict(format!(
                "idempotency key {}",
                payment.idempotency_key
            )));
        }
        self.state.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn insert_step(&mut self, step: &PaymentStep) -> Result<(), RepoError> {
        if !self.state.payments.contains_key(&step.payment_id) {
            return Err(RepoError::NotFound);
        }
        self.state.steps.push(step.clone());
        Ok(())
    }

    async fn find_by_id(&mut self, id: PaymentId) -> Result<Option<Payment>, RepoError> {
        Ok(self.state.payments.get(&id).cloned())
    }

    async fn find_by_idempotency_key(&mut self, key: &str) -> Result<Option<Payment>, RepoError> {
        Ok(self
            .state
            .payments
            .values()
            .find(|p| p.idempotency_key == key)
            .cloned())
    }

    async fn list_steps(&mut self, id: PaymentId) -> Result<Vec<PaymentStep>, RepoError> {
        let mut steps: Vec<PaymentStep> = self
            .state
            .steps
            .iter()
            .filter(|s| s.payment_id == id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| s.attempted_at);
        Ok(steps)
    }
}

#[async_trait]
impl<'s> JournalRepository for MemoryRepos<'s> {
    async fn insert_journal(&mut self, entry: &JournalEntry) -> Result<(), RepoError> {
        ensure_balanced(&entry.lines)?;
        if self.state.journals.iter().any(|j| j.id == entry.id) {
            return Err(RepoError::Conflict(format!("journal {}", entry.id)));
        }
        self.state.journals.push(entry.clone());
        Ok(())
    }

    async fn get_journal(&mut self, id: JournalId) -> Result<Option<JournalEntry>, RepoError> {
        Ok(self.state.journals.iter().find(|j| j.id == id).cloned())
    }

    async fn list_activity_by_account(
        &mut self,
        account: AccountId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        page: u32,
        size: u32,
    ) -> Result<Vec<JournalEntry>, RepoError> {
        let mut matching: Vec<&JournalEntry> = self
            .state
            .journals
            .iter()
            .filter(|j| j.booked_at >= from && j.booked_at <= to)
            .filter(|j| j.lines.iter().any(|l| l.counterparty == Some(account)))
            .collect();
        matching.sort_by(|a, b| b.booked_at.cmp(&a.booked_at).then(b.id.cmp(&a.id)));

        let offset = (page.max(1) as usize - 1) * size as usize;
        Ok(matching
            .into_iter()
            .skip(offset)
            .take(size as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl<'s> OutboxRepository for MemoryRepos<'s> {
    async fn insert(&mut self, event: &OutboxEvent) -> Result<(), RepoError> {
        if self.state.outbox.iter().any(|e| e.id == event.id) {
            return Err(RepoError::Conflict(format!("outbox event {}", event.id)));
        }
        self.state.outbox.push(event.clone());
        Ok(())
    }

    async fn get(&mut self, id: EventId) -> Result<Option<OutboxEvent>, RepoError> {
        Ok(self.state.outbox.iter().find(|e| e.id == id).cloned())
    }

    async fn claim_batch(
        &mut self,
        limit: u32,
        owner: &str,
        now: DateTime<Utc>,
        claim_ttl: Duration,
    ) -> Result<Vec<OutboxEvent>, RepoError> {
        let mut candidates: Vec<usize> = self
            .state
            .outbox
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_claimable(now, claim_ttl))
            .map(|(i, _)| i)
            .collect();
        candidates.sort_by_key(|&i| self.state.outbox[i].created_at);
        candidates.truncate(limit as usize);

        let mut claimed = Vec::with_capacity(candidates.len());
        for i in candidates {
            let event = &mut self.state.outbox[i];
            event.processing = true;
            event.processing_owner = Some(owner.to_string());
            event.processing_at = Some(now);
            claimed.push(event.clone());
        }
        Ok(claimed)
    }

    async fn mark_published(
        &mut self,
        ids: &[EventId],
        now: DateTime<Utc>,
    ) -> Result<u64, RepoError> {
        let mut updated = 0;
        for event in self.state.outbox.iter_mut().filter(|e| ids.contains(&e.id)) {
            event.published = true;
            event.published_at = Some(now);
            event.processing = false;
            event.processing_owner = None;
            event.processing_at = None;
            updated += 1;
        }
        Ok(updated)
    }

    async fn release_claims(&mut self, ids: &[EventId], owner: &str) -> Result<u64, RepoError> {
        let mut released = 0;
        for event in self.state.outbox.iter_mut().filter(|e| {
            ids.contains(&e.id) && !e.published && e.processing_owner.as_deref() == Some(owner)
        }) {
            event.processing = false;
            event.processing_owner = None;
            event.processing_at = None;
            released += 1;
        }
        Ok(released)
    }
}

#[async_trait]
impl<'s> IdempotencyRepository for MemoryRepos<'s> {
    async fn get(&mut self, key: &str) -> Result<Option<IdempotencyRecord>, RepoError> {
        Ok(self.state.idempotency.get(key).cloned())
    }

    async fn put(&mut self, record: &IdempotencyRecord) -> Result<(), RepoError> {
        if self.state.idempotency.contains_key(&record.key) {
            return Err(RepoError::Conflict(format!(
                "idempotency key {}",
                record.key
            )));
        }
        self.state
            .idempotency
            .insert(record.key.clone(), record.clone());
        Ok(())
    }
}
