//! PostgreSQL Unit-of-Work adapter.
//!
//! Reads may go to a replica pool. The outbox claim locks candidate rows
//! with `FOR UPDATE SKIP LOCKED`, so concurrent workers never claim the same
//! row.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use ledger_types::domain::ensure_balanced;
use ledger_types::ports::{
    IdempotencyRepository, JournalRepository, OutboxRepository, PaymentRepository,
};
use ledger_types::{
    AccountId, EntryLine, EventId, IdempotencyRecord, JournalEntry, JournalId, OutboxEvent,
    Payment, PaymentId, PaymentStep, RepoError, Repositories, UnitOfWorkManager,
};

use crate::map_write_err;
use crate::types::native::{
    PgEntryLine, PgIdempotencyRecord, PgJournal, PgOutboxEvent, PgPayment, PgPaymentStep,
};

/// Executes SQL statements from a migration file, splitting by semicolons.
async fn execute_migration(pool: &PgPool, sql: &str, name: &str) -> Result<(), anyhow::Error> {
    for statement in sql.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt)
                .execute(pool)
                .await
                .map_err(|e| anyhow::anyhow!("Migration {} failed: {}", name, e))?;
        }
    }
    Ok(())
}

/// Runs all database migrations.
async fn run_migrations(pool: &PgPool) -> Result<(), anyhow::Error> {
    execute_migration(
        pool,
        include_str!("../migrations/0001_create_ledger_tables_pg.sql"),
        "0001",
    )
    .await
}

// ─────────────────────────────────────────────────────────────────────────────
// Unit of Work
// ─────────────────────────────────────────────────────────────────────────────

/// PostgreSQL unit-of-work manager with optional read replica.
pub struct PostgresUow {
    write: PgPool,
    read: PgPool,
}

impl PostgresUow {
    /// Connects to the primary, runs migrations, and reads from it too.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let write = PgPool::connect(database_url).await?;
        run_migrations(&write).await?;
        Ok(Self {
            read: write.clone(),
            write,
        })
    }

    pub async fn with_read_url(write_url: &str, read_url: &str) -> anyhow::Result<Self> {
        let mut uow = Self::new(write_url).await?;
        if read_url != write_url {
            uow.read = PgPool::connect(read_url).await?;
        }
        Ok(uow)
    }

    pub fn pool(&self) -> &PgPool {
        &self.write
    }
}

#[async_trait]
impl UnitOfWorkManager for PostgresUow {
    async fn do_read<T, F>(&self, f: F) -> Result<T, RepoError>
    where
        T: Send,
        F: for<'r> FnOnce(&'r mut dyn Repositories) -> BoxFuture<'r, Result<T, RepoError>> + Send,
    {
        let mut conn = self
            .read
            .acquire()
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;
        let mut repos = PgRepos::new(&mut conn);
        f(&mut repos).await
    }

    async fn do_write<T, F>(&self, f: F) -> Result<T, RepoError>
    where
        T: Send,
        F: for<'r> FnOnce(&'r mut dyn Repositories) -> BoxFuture<'r, Result<T, RepoError>> + Send,
    {
        let mut tx = self
            .write
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        let result = {
            let mut repos = PgRepos::new(&mut tx);
            f(&mut repos).await
        };

        match result {
            Ok(value) => {
                tx.commit()
                    .await
                    .map_err(|e| RepoError::Transaction(e.to_string()))?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    tracing::warn!(error = %rb, "postgres rollback failed");
                }
                Err(e)
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Repositories bound to one connection
// ─────────────────────────────────────────────────────────────────────────────

pub struct PgRepos<'c> {
    conn: &'c mut PgConnection,
}

impl<'c> PgRepos<'c> {
    pub fn new(conn: &'c mut PgConnection) -> Self {
        Self { conn }
    }

    async fn load_lines(&mut self, journal_id: Uuid) -> Result<Vec<EntryLine>, RepoError> {
        let rows: Vec<PgEntryLine> = sqlx::query_as(
            r#"SELECT id, journal_id, gl_account_code, counterparty_ref, debit, credit
               FROM entry_lines WHERE journal_id = $1 ORDER BY line_no"#,
        )
        .bind(journal_id)
        .fetch_all(&mut *self.conn)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(PgEntryLine::into_domain).collect()
    }
}

impl<'c> Repositories for PgRepos<'c> {
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

const PAYMENT_COLUMNS: &str = "id, idempotency_key, source_account_id, destination_account_id, \
     amount, currency, status, customer_id, journal_id, created_at, updated_at";

const OUTBOX_COLUMNS: &str = "id, aggregate_type, aggregate_id, event_type, payload_json, \
     published, published_at, processing, processing_owner, processing_at, created_at";

#[async_trait]
impl<'c> PaymentRepository for PgRepos<'c> {
    async fn insert(&mut self, payment: &Payment) -> Result<(), RepoError> {
        sqlx::query(
            r#"INSERT INTO payments (id, idempotency_key, source_account_id, destination_account_id,
                   amount, currency, status, customer_id, hold_id, journal_id, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"#,
        )
        .bind(payment.id.into_uuid())
        .bind(&payment.idempotency_key)
        .bind(payment.source_account.into_uuid())
        .bind(payment.destination_account.into_uuid())
        .bind(payment.amount)
        .bind(payment.currency.as_str())
        .bind(payment.status.as_str())
        .bind(&payment.customer_id)
        .bind(payment.hold_id().into_uuid())
        .bind(payment.journal_id.map(JournalId::into_uuid))
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *self.conn)
        .await
        .map_err(map_write_err)?;
        Ok(())
    }

    async fn insert_step(&mut self, step: &PaymentStep) -> Result<(), RepoError> {
        sqlx::query(
            r#"INSERT INTO payment_steps (payment_id, step, state, details_json, attempted_at)
               VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(step.payment_id.into_uuid())
        .bind(&step.step)
        .bind(&step.state)
        .bind(&step.details)
        .bind(step.attempted_at)
        .execute(&mut *self.conn)
        .await
        .map_err(map_write_err)?;
        Ok(())
    }

    async fn find_by_id(&mut self, id: PaymentId) -> Result<Option<Payment>, RepoError> {
        let row: Option<PgPayment> = sqlx::query_as(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"
        ))
        .bind(id.into_uuid())
        .fetch_optional(&mut *self.conn)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(PgPayment::into_domain).transpose()
    }

    async fn find_by_idempotency_key(&mut self, key: &str) -> Result<Option<Payment>, RepoError> {
        let row: Option<PgPayment> = sqlx::query_as(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE idempotency_key = $1"
        ))
        .bind(key)
        .fetch_optional(&mut *self.conn)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(PgPayment::into_domain).transpose()
    }

    async fn list_steps(&mut self, id: PaymentId) -> Result<Vec<PaymentStep>, RepoError> {
        let rows: Vec<PgPaymentStep> = sqlx::query_as(
            r#"SELECT payment_id, step, state, details_json, attempted_at
               FROM payment_steps WHERE payment_id = $1 ORDER BY attempted_at, id"#,
        )
        .bind(id.into_uuid())
        .fetch_all(&mut *self.conn)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(PgPaymentStep::into_domain).collect())
    }
}

#[async_trait]
impl<'c> JournalRepository for PgRepos<'c> {
    async fn insert_journal(&mut self, entry: &JournalEntry) -> Result<(), RepoError> {
        ensure_balanced(&entry.lines)?;

        sqlx::query(
            r#"INSERT INTO journal_entries (id, external_ref, booked_at, created_by, status, currency)
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(entry.id.into_uuid())
        .bind(&entry.external_ref)
        .bind(entry.booked_at)
        .bind(&entry.created_by)
        .bind(entry.status.as_str())
        .bind(entry.currency.as_str())
        .execute(&mut *self.conn)
        .await
        .map_err(map_write_err)?;

        for (line_no, line) in entry.lines.iter().enumerate() {
            sqlx::query(
                r#"INSERT INTO entry_lines (id, journal_id, line_no, gl_account_id, gl_account_code,
                       counterparty_ref, debit, credit)
                   VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
            )
            .bind(line.id)
            .bind(entry.id.into_uuid())
            .bind(line_no as i32)
            .bind(line.gl_account.id())
            .bind(line.gl_account.code())
            .bind(line.counterparty.map(|c| c.to_string()))
            .bind(line.debit)
            .bind(line.credit)
            .execute(&mut *self.conn)
            .await
            .map_err(map_write_err)?;
        }
        Ok(())
    }

    async fn get_journal(&mut self, id: JournalId) -> Result<Option<JournalEntry>, RepoError> {
        let row: Option<PgJournal> = sqlx::query_as(
            r#"SELECT id, external_ref, booked_at, created_by, status, currency
               FROM journal_entries WHERE id = $1"#,
        )
        .bind(id.into_uuid())
        .fetch_optional(&mut *self.conn)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        match row {
            Some(row) => {
                let lines = self.load_lines(row.id).await?;
                Ok(Some(row.into_domain(lines)?))
            }
            None => Ok(None),
        }
    }

    async fn list_activity_by_account(
        &mut self,
        account: AccountId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        page: u32,
        size: u32,
    ) -> Result<Vec<JournalEntry>, RepoError> {
        let offset = i64::from(page.max(1) - 1) * i64::from(size);

        let rows: Vec<PgJournal> = sqlx::query_as(
            r#"SELECT je.id, je.external_ref, je.booked_at, je.created_by, je.status, je.currency
               FROM journal_entries je
               WHERE je.booked_at BETWEEN $1 AND $2
                 AND EXISTS (
                     SELECT 1 FROM entry_lines el
                     WHERE el.journal_id = je.id AND el.counterparty_ref = $3
                 )
               ORDER BY je.booked_at DESC, je.id DESC
               LIMIT $4 OFFSET $5"#,
        )
        .bind(from)
        .bind(to)
        .bind(account.to_string())
        .bind(i64::from(size))
        .bind(offset)
        .fetch_all(&mut *self.conn)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let lines = self.load_lines(row.id).await?;
            entries.push(row.into_domain(lines)?);
        }
        Ok(entries)
    }
}

#[async_trait]
impl<'c> OutboxRepository for PgRepos<'c> {
    async fn insert(&mut self, event: &OutboxEvent) -> Result<(), RepoError> {
        sqlx::query(
            r#"INSERT INTO outbox_events (id, aggregate_type, aggregate_id, event_type, payload_json,
                   published, published_at, processing, processing_owner, processing_at, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"#,
        )
        .bind(event.id.into_uuid())
        .bind(&event.aggregate_type)
        .bind(event.aggregate_id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(event.published)
        .bind(event.published_at)
        .bind(event.processing)
        .bind(&event.processing_owner)
        .bind(event.processing_at)
        .bind(event.created_at)
        .execute(&mut *self.conn)
        .await
        .map_err(map_write_err)?;
        Ok(())
    }

    async fn get(&mut self, id: EventId) -> Result<Option<OutboxEvent>, RepoError> {
        let row: Option<PgOutboxEvent> = sqlx::query_as(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM outbox_events WHERE id = $1"
        ))
        .bind(id.into_uuid())
        .fetch_optional(&mut *self.conn)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(row.map(PgOutboxEvent::into_domain))
    }

    async fn claim_batch(
        &mut self,
        limit: u32,
        owner: &str,
        now: DateTime<Utc>,
        claim_ttl: Duration,
    ) -> Result<Vec<OutboxEvent>, RepoError> {
        let rows: Vec<PgOutboxEvent> = sqlx::query_as(&format!(
            r#"UPDATE outbox_events
               SET processing = TRUE, processing_owner = $1, processing_at = $2
               WHERE id IN (
                   SELECT id FROM outbox_events
                   WHERE published = FALSE
                     AND (processing = FALSE OR processing_at IS NULL OR processing_at < $3)
                   ORDER BY created_at, id
                   LIMIT $4
                   FOR UPDATE SKIP LOCKED
               )
               RETURNING {OUTBOX_COLUMNS}"#
        ))
        .bind(owner)
        .bind(now)
        .bind(now - claim_ttl)
        .bind(i64::from(limit))
        .fetch_all(&mut *self.conn)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        let mut events: Vec<OutboxEvent> =
            rows.into_iter().map(PgOutboxEvent::into_domain).collect();
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(events)
    }

    async fn mark_published(
        &mut self,
        ids: &[EventId],
        now: DateTime<Utc>,
    ) -> Result<u64, RepoError> {
        let ids: Vec<Uuid> = ids.iter().map(|id| id.into_uuid()).collect();
        let result = sqlx::query(
            r#"UPDATE outbox_events
               SET published = TRUE, published_at = $1, processing = FALSE,
                   processing_owner = NULL, processing_at = NULL
               WHERE id = ANY($2)"#,
        )
        .bind(now)
        .bind(&ids)
        .execute(&mut *self.conn)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn release_claims(&mut self, ids: &[EventId], owner: &str) -> Result<u64, RepoError> {
        let ids: Vec<Uuid> = ids.iter().map(|id| id.into_uuid()).collect();
        let result = sqlx::query(
            r#"UPDATE outbox_events
               SET processing = FALSE, processing_owner = NULL, processing_at = NULL
               WHERE id = ANY($1) AND processing_owner = $2 AND published = FALSE"#,
        )
        .bind(&ids)
        .bind(owner)
        .execute(&mut *self.conn)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl<'c> IdempotencyRepository for PgRepos<'c> {
    async fn get(&mut self, key: &str) -> Result<Option<IdempotencyRecord>, RepoError> {
        let row: Option<PgIdempotencyRecord> = sqlx::query_as(
            r#"SELECT key, operation, response_json, status_code, created_at
               FROM idempotency_records WHERE key = $1"#,
        )
        .bind(key)
        .fetch_optional(&mut *self.conn)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(PgIdempotencyRecord::into_domain).transpose()
    }

    async fn put(&mut self, record: &IdempotencyRecord) -> Result<(), RepoError> {
        sqlx::query(
            r#"INSERT INTO idempotency_records (key, operation, response_json, status_code, created_at)
               VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(&record.key)
        .bind(&record.operation)
        .bind(&record.response_json)
        .bind(i32::from(record.status_code))
        .bind(record.created_at)
        .execute(&mut *self.conn)
        .await
        .map_err(map_write_err)?;
        Ok(())
    }
}
