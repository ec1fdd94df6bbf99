//! SQLite Unit-of-Work adapter.
//!
//! Writes run inside one `BEGIN ... COMMIT`. SQLite serializes writers, so
//! the outbox claim is a single `UPDATE ... RETURNING` statement.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};

use ledger_types::domain::{ensure_balanced, format_amount};
use ledger_types::ports::{
    IdempotencyRepository, JournalRepository, OutboxRepository, PaymentRepository,
};
use ledger_types::{
    AccountId, EventId, IdempotencyRecord, JournalEntry, JournalId, OutboxEvent, Payment,
    PaymentId, PaymentStep, RepoError, Repositories, UnitOfWorkManager,
};

use crate::map_write_err;
use crate::types::text::{
    DbEntryLine, DbIdempotencyRecord, DbJournal, DbOutboxEvent, DbPayment, DbPaymentStep, ts,
};

/// Executes SQL statements from a migration file, splitting by semicolons.
async fn execute_migration(pool: &SqlitePool, sql: &str, name: &str) -> anyhow::Result<()> {
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

async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    execute_migration(
        pool,
        include_str!("../migrations/0001_create_ledger_tables.sql"),
        "0001",
    )
    .await
}

fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// Directory that must exist before SQLite can create the ledger file.
pub(crate) fn database_dir(database_url: &str) -> Option<&std::path::Path> {
    let file = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let file = file.split('?').next().unwrap_or(file);
    if file.is_empty() || file == ":memory:" {
        return None;
    }
    std::path::Path::new(file)
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
}

async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    if let Some(dir) = database_dir(database_url) {
        tokio::fs::create_dir_all(dir).await?;
    }

    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    // Every connection to `:memory:` is a separate database: pin exactly one.
    let pool = if is_in_memory(database_url) {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new().connect_with(options).await?
    };
    Ok(pool)
}

// ─────────────────────────────────────────────────────────────────────────────
// Unit of Work
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite unit-of-work manager.
pub struct SqliteUow {
    write: SqlitePool,
    read: SqlitePool,
}

impl SqliteUow {
    /// Connects, runs migrations, and uses the same pool for reads.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let write = connect(database_url).await?;
        run_migrations(&write).await?;
        Ok(Self {
            read: write.clone(),
            write,
        })
    }

    /// Separate read pool, e.g. a read-only replica file.
    pub async fn with_read_url(write_url: &str, read_url: &str) -> anyhow::Result<Self> {
        let mut uow = Self::new(write_url).await?;
        if read_url != write_url {
            uow.read = connect(read_url).await?;
        }
        Ok(uow)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.write
    }
}

#[async_trait]
impl UnitOfWorkManager for SqliteUow {
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
        let mut repos = SqliteRepos::new(&mut conn);
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
            let mut repos = SqliteRepos::new(&mut tx);
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
                    tracing::warn!(error = %rb, "sqlite rollback failed");
                }
                Err(e)
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Repositories bound to one connection
// ─────────────────────────────────────────────────────────────────────────────

/// All repositories over a single connection or open transaction.
pub struct SqliteRepos<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> SqliteRepos<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    async fn load_lines(
        &mut self,
        journal_id: &str,
    ) -> Result<Vec<ledger_types::EntryLine>, RepoError> {
        let rows: Vec<DbEntryLine> = sqlx::query_as(
            r#"SELECT id, journal_id, gl_account_code, counterparty_ref, debit, credit
               FROM entry_lines WHERE journal_id = ? ORDER BY line_no"#,
        )
        .bind(journal_id)
        .fetch_all(&mut *self.conn)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbEntryLine::into_domain).collect()
    }
}

impl<'c> Repositories for SqliteRepos<'c> {
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
impl<'c> PaymentRepository for SqliteRepos<'c> {
    async fn insert(&mut self, payment: &Payment) -> Result<(), RepoError> {
        sqlx::query(
            r#"INSERT INTO payments (id, idempotency_key, source_account_id, destination_account_id,
                   amount, currency, status, customer_id, hold_id, journal_id, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(payment.id.to_string())
        .bind(&payment.idempotency_key)
        .bind(payment.source_account.to_string())
        .bind(payment.destination_account.to_string())
        .bind(format_amount(payment.amount))
        .bind(payment.currency.as_str())
        .bind(payment.status.as_str())
        .bind(&payment.customer_id)
        .bind(payment.hold_id().to_string())
        .bind(payment.journal_id.map(|j| j.to_string()))
        .bind(ts(payment.created_at))
        .bind(ts(payment.updated_at))
        .execute(&mut *self.conn)
        .await
        .map_err(map_write_err)?;
        Ok(())
    }

    async fn insert_step(&mut self, step: &PaymentStep) -> Result<(), RepoError> {
        sqlx::query(
            r#"INSERT INTO payment_steps (payment_id, step, state, details_json, attempted_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(step.payment_id.to_string())
        .bind(&step.step)
        .bind(&step.state)
        .bind(step.details.to_string())
        .bind(ts(step.attempted_at))
        .execute(&mut *self.conn)
        .await
        .map_err(map_write_err)?;
        Ok(())
    }

    async fn find_by_id(&mut self, id: PaymentId) -> Result<Option<Payment>, RepoError> {
        let row: Option<DbPayment> = sqlx::query_as(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&mut *self.conn)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbPayment::into_domain).transpose()
    }

    async fn find_by_idempotency_key(&mut self, key: &str) -> Result<Option<Payment>, RepoError> {
        let row: Option<DbPayment> = sqlx::query_as(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE idempotency_key = ?"
        ))
        .bind(key)
        .fetch_optional(&mut *self.conn)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbPayment::into_domain).transpose()
    }

    async fn list_steps(&mut self, id: PaymentId) -> Result<Vec<PaymentStep>, RepoError> {
        let rows: Vec<DbPaymentStep> = sqlx::query_as(
            r#"SELECT payment_id, step, state, details_json, attempted_at
               FROM payment_steps WHERE payment_id = ? ORDER BY attempted_at, id"#,
        )
        .bind(id.to_string())
        .fetch_all(&mut *self.conn)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbPaymentStep::into_domain).collect()
    }
}

#[async_trait]
impl<'c> JournalRepository for SqliteRepos<'c> {
    async fn insert_journal(&mut self, entry: &JournalEntry) -> Result<(), RepoError> {
        ensure_balanced(&entry.lines)?;

        sqlx::query(
            r#"INSERT INTO journal_entries (id, external_ref, booked_at, created_by, status, currency)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(entry.id.to_string())
        .bind(&entry.external_ref)
        .bind(ts(entry.booked_at))
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
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(line.id.to_string())
            .bind(entry.id.to_string())
            .bind(line_no as i64)
            .bind(line.gl_account.id().to_string())
            .bind(line.gl_account.code())
            .bind(line.counterparty.map(|c| c.to_string()))
            .bind(format_amount(line.debit))
            .bind(format_amount(line.credit))
            .execute(&mut *self.conn)
            .await
            .map_err(map_write_err)?;
        }
        Ok(())
    }

    async fn get_journal(&mut self, id: JournalId) -> Result<Option<JournalEntry>, RepoError> {
        let row: Option<DbJournal> = sqlx::query_as(
            r#"SELECT id, external_ref, booked_at, created_by, status, currency
               FROM journal_entries WHERE id = ?"#,
        )
        .bind(id.to_string())
        .fetch_optional(&mut *self.conn)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        match row {
            Some(row) => {
                let lines = self.load_lines(&row.id).await?;
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

        let rows: Vec<DbJournal> = sqlx::query_as(
            r#"SELECT je.id, je.external_ref, je.booked_at, je.created_by, je.status, je.currency
               FROM journal_entries je
               WHERE je.booked_at >= ? AND je.booked_at <= ?
                 AND EXISTS (
                     SELECT 1 FROM entry_lines el
                     WHERE el.journal_id = je.id AND el.counterparty_ref = ?
                 )
               ORDER BY je.booked_at DESC, je.id DESC
               LIMIT ? OFFSET ?"#,
        )
        .bind(ts(from))
        .bind(ts(to))
        .bind(account.to_string())
        .bind(i64::from(size))
        .bind(offset)
        .fetch_all(&mut *self.conn)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let lines = self.load_lines(&row.id).await?;
            entries.push(row.into_domain(lines)?);
        }
        Ok(entries)
    }
}

#[async_trait]
impl<'c> OutboxRepository for SqliteRepos<'c> {
    async fn insert(&mut self, event: &OutboxEvent) -> Result<(), RepoError> {
        sqlx::query(
            r#"INSERT INTO outbox_events (id, aggregate_type, aggregate_id, event_type, payload_json,
                   published, published_at, processing, processing_owner, processing_at, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(event.id.to_string())
        .bind(&event.aggregate_type)
        .bind(event.aggregate_id.to_string())
        .bind(&event.event_type)
        .bind(event.payload.to_string())
        .bind(event.published)
        .bind(event.published_at.map(ts))
        .bind(event.processing)
        .bind(&event.processing_owner)
        .bind(event.processing_at.map(ts))
        .bind(ts(event.created_at))
        .execute(&mut *self.conn)
        .await
        .map_err(map_write_err)?;
        Ok(())
    }

    async fn get(&mut self, id: EventId) -> Result<Option<OutboxEvent>, RepoError> {
        let row: Option<DbOutboxEvent> = sqlx::query_as(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM outbox_events WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&mut *self.conn)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbOutboxEvent::into_domain).transpose()
    }

    async fn claim_batch(
        &mut self,
        limit: u32,
        owner: &str,
        now: DateTime<Utc>,
        claim_ttl: Duration,
    ) -> Result<Vec<OutboxEvent>, RepoError> {
        let rows: Vec<DbOutboxEvent> = sqlx::query_as(&format!(
            r#"UPDATE outbox_events
               SET processing = 1, processing_owner = ?, processing_at = ?
               WHERE id IN (
                   SELECT id FROM outbox_events
                   WHERE published = 0
                     AND (processing = 0 OR processing_at IS NULL OR processing_at < ?)
                   ORDER BY created_at, id
                   LIMIT ?
               )
               RETURNING {OUTBOX_COLUMNS}"#
        ))
        .bind(owner)
        .bind(ts(now))
        .bind(ts(now - claim_ttl))
        .bind(i64::from(limit))
        .fetch_all(&mut *self.conn)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        let mut events = rows
            .into_iter()
            .map(DbOutboxEvent::into_domain)
            .collect::<Result<Vec<_>, _>>()?;
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(events)
    }

    async fn mark_published(
        &mut self,
        ids: &[EventId],
        now: DateTime<Utc>,
    ) -> Result<u64, RepoError> {
        let mut updated = 0;
        for id in ids {
            let result = sqlx::query(
                r#"UPDATE outbox_events
                   SET published = 1, published_at = ?, processing = 0,
                       processing_owner = NULL, processing_at = NULL
                   WHERE id = ?"#,
            )
            .bind(ts(now))
            .bind(id.to_string())
            .execute(&mut *self.conn)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;
            updated += result.rows_affected();
        }
        Ok(updated)
    }

    async fn release_claims(&mut self, ids: &[EventId], owner: &str) -> Result<u64, RepoError> {
        let mut released = 0;
        for id in ids {
            let result = sqlx::query(
                r#"UPDATE outbox_events
                   SET processing = 0, processing_owner = NULL, processing_at = NULL
                   WHERE id = ? AND processing_owner = ? AND published = 0"#,
            )
            .bind(id.to_string())
            .bind(owner)
            .execute(&mut *self.conn)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;
            released += result.rows_affected();
        }
        Ok(released)
    }
}

#[async_trait]
impl<'c> IdempotencyRepository for SqliteRepos<'c> {
    async fn get(&mut self, key: &str) -> Result<Option<IdempotencyRecord>, RepoError> {
        let row: Option<DbIdempotencyRecord> = sqlx::query_as(
            r#"SELECT key, operation, response_json, status_code, created_at
               FROM idempotency_records WHERE key = ?"#,
        )
        .bind(key)
        .fetch_optional(&mut *self.conn)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbIdempotencyRecord::into_domain).transpose()
    }

    async fn put(&mut self, record: &IdempotencyRecord) -> Result<(), RepoError> {
        sqlx::query(
            r#"INSERT INTO idempotency_records (key, operation, response_json, status_code, created_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(&record.key)
        .bind(&record.operation)
        .bind(&record.response_json)
        .bind(i64::from(record.status_code))
        .bind(ts(record.created_at))
        .execute(&mut *self.conn)
        .await
        .map_err(map_write_err)?;
        Ok(())
    }
}
