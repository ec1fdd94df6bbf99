//! Database row types with feature-gated layouts for SQLite and PostgreSQL.
//!
//! SQLite stores identifiers, timestamps and decimals as TEXT; PostgreSQL
//! uses native UUID, TIMESTAMPTZ, NUMERIC and JSONB columns.

#[cfg(feature = "sqlite")]
pub mod text {
    use std::str::FromStr;

    use chrono::{DateTime, SecondsFormat, Utc};
    use rust_decimal::Decimal;
    use sqlx::FromRow;
    use uuid::Uuid;

    use ledger_types::{
        AccountId, Currency, EntryLine, EventId, GlAccount, IdempotencyRecord, JournalEntry,
        JournalId, JournalStatus, OutboxEvent, Payment, PaymentId, PaymentStatus, PaymentStep,
        RepoError,
    };

    // ─────────────────────────────────────────────────────────────────────────
    // Column codecs
    // ─────────────────────────────────────────────────────────────────────────

    /// Fixed-width UTC timestamp so that TEXT ordering matches time ordering.
    pub fn ts(at: DateTime<Utc>) -> String {
        at.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>, RepoError> {
        DateTime::parse_from_rfc3339(raw)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| RepoError::Database(format!("bad timestamp {raw}: {e}")))
    }

    pub fn parse_uuid(raw: &str) -> Result<Uuid, RepoError> {
        Uuid::parse_str(raw).map_err(|e| RepoError::Database(format!("bad uuid {raw}: {e}")))
    }

    pub fn parse_decimal(raw: &str) -> Result<Decimal, RepoError> {
        Decimal::from_str(raw).map_err(|e| RepoError::Database(format!("bad decimal {raw}: {e}")))
    }

    fn parse_currency(raw: &str) -> Result<Currency, RepoError> {
        Ok(Currency::parse(raw)?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Rows
    // ─────────────────────────────────────────────────────────────────────────

    #[derive(FromRow)]
    pub struct DbPayment {
        pub id: String,
        pub idempotency_key: String,
        pub source_account_id: String,
        pub destination_account_id: String,
        pub amount: String,
        pub currency: String,
        pub status: String,
        pub customer_id: Option<String>,
        pub journal_id: Option<String>,
        pub created_at: String,
        pub updated_at: String,
    }

    impl DbPayment {
        pub fn into_domain(self) -> Result<Payment, RepoError> {
            Ok(Payment {
                id: PaymentId::from_uuid(parse_uuid(&self.id)?),
                idempotency_key: self.idempotency_key,
                source_account: AccountId::from_uuid(parse_uuid(&self.source_account_id)?),
                destination_account: AccountId::from_uuid(parse_uuid(
                    &self.destination_account_id,
                )?),
                amount: parse_decimal(&self.amount)?,
                currency: parse_currency(&self.currency)?,
                status: PaymentStatus::parse(&self.status)?,
                customer_id: self.customer_id,
                journal_id: self
                    .journal_id
                    .as_deref()
                    .map(parse_uuid)
                    .transpose()?
                    .map(JournalId::from_uuid),
                created_at: parse_ts(&self.created_at)?,
                updated_at: parse_ts(&self.updated_at)?,
            })
        }
    }

    #[derive(FromRow)]
    pub struct DbPaymentStep {
        pub payment_id: String,
        pub step: String,
        pub state: String,
        pub details_json: String,
        pub attempted_at: String,
    }

    impl DbPaymentStep {
        pub fn into_domain(self) -> Result<PaymentStep, RepoError> {
            Ok(PaymentStep {
                payment_id: PaymentId::from_uuid(parse_uuid(&self.payment_id)?),
                step: self.step,
                state: self.state,
                details: serde_json::from_str(&self.details_json)
                    .map_err(|e| RepoError::Database(e.to_string()))?,
                attempted_at: parse_ts(&self.attempted_at)?,
            })
        }
    }

    #[derive(FromRow)]
    pub struct DbJournal {
        pub id: String,
        pub external_ref: String,
        pub booked_at: String,
        pub created_by: String,
        pub status: String,
        pub currency: String,
    }

    impl DbJournal {
        pub fn into_domain(self, lines: Vec<EntryLine>) -> Result<JournalEntry, RepoError> {
            Ok(JournalEntry {
                id: JournalId::from_uuid(parse_uuid(&self.id)?),
                external_ref: self.external_ref,
                booked_at: parse_ts(&self.booked_at)?,
                created_by: self.created_by,
                status: JournalStatus::parse(&self.status)?,
                currency: parse_currency(&self.currency)?,
                lines,
            })
        }
    }

    #[derive(FromRow)]
    pub struct DbEntryLine {
        pub id: String,
        pub journal_id: String,
        pub gl_account_code: String,
        pub counterparty_ref: Option<String>,
        pub debit: String,
        pub credit: String,
    }

    impl DbEntryLine {
        pub fn into_domain(self) -> Result<EntryLine, RepoError> {
            Ok(EntryLine {
                id: parse_uuid(&self.id)?,
                journal_id: JournalId::from_uuid(parse_uuid(&self.journal_id)?),
                gl_account: GlAccount::from_code(&self.gl_account_code)?,
                counterparty: self
                    .counterparty_ref
                    .as_deref()
                    .map(parse_uuid)
                    .transpose()?
                    .map(AccountId::from_uuid),
                debit: parse_decimal(&self.debit)?,
                credit: parse_decimal(&self.credit)?,
            })
        }
    }

    #[derive(FromRow)]
    pub struct DbOutboxEvent {
        pub id: String,
        pub aggregate_type: String,
        pub aggregate_id: String,
        pub event_type: String,
        pub payload_json: String,
        pub published: bool,
        pub published_at: Option<String>,
        pub processing: bool,
        pub processing_owner: Option<String>,
        pub processing_at: Option<String>,
        pub created_at: String,
    }

    impl DbOutboxEvent {
        pub fn into_domain(self) -> Result<OutboxEvent, RepoError> {
            Ok(OutboxEvent {
                id: EventId::from_uuid(parse_uuid(&self.id)?),
                aggregate_type: self.aggregate_type,
                aggregate_id: parse_uuid(&self.aggregate_id)?,
                event_type: self.event_type,
                payload: serde_json::from_str(&self.payload_json)
                    .map_err(|e| RepoError::Database(e.to_string()))?,
                published: self.published,
                published_at: self.published_at.as_deref().map(parse_ts).transpose()?,
                processing: self.processing,
                processing_owner: self.processing_owner,
                processing_at: self.processing_at.as_deref().map(parse_ts).transpose()?,
                created_at: parse_ts(&self.created_at)?,
            })
        }
    }

    #[derive(FromRow)]
    pub struct DbIdempotencyRecord {
        pub key: String,
        pub operation: String,
        pub response_json: String,
        pub status_code: i64,
        pub created_at: String,
    }

    impl DbIdempotencyRecord {
        pub fn into_domain(self) -> Result<IdempotencyRecord, RepoError> {
            Ok(IdempotencyRecord {
                key: self.key,
                operation: self.operation,
                response_json: self.response_json,
                status_code: u16::try_from(self.status_code)
                    .map_err(|e| RepoError::Database(e.to_string()))?,
                created_at: parse_ts(&self.created_at)?,
            })
        }
    }
}

#[cfg(feature = "postgres")]
pub mod native {
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;
    use sqlx::FromRow;
    use uuid::Uuid;

    use ledger_types::{
        AccountId, Currency, EntryLine, EventId, GlAccount, IdempotencyRecord, JournalEntry,
        JournalId, JournalStatus, OutboxEvent, Payment, PaymentId, PaymentStatus, PaymentStep,
        RepoError,
    };

    fn parse_counterparty(raw: Option<String>) -> Result<Option<AccountId>, RepoError> {
        raw.map(|s| {
            s.parse::<AccountId>()
                .map_err(|e| RepoError::Database(format!("bad counterparty {s}: {e}")))
        })
        .transpose()
    }

    #[derive(FromRow)]
    pub struct PgPayment {
        pub id: Uuid,
        pub idempotency_key: String,
        pub source_account_id: Uuid,
        pub destination_account_id: Uuid,
        pub amount: Decimal,
        pub currency: String,
        pub status: String,
        pub customer_id: Option<String>,
        pub journal_id: Option<Uuid>,
        pub created_at: DateTime<Utc>,
        pub updated_at: DateTime<Utc>,
    }

    impl PgPayment {
        pub fn into_domain(self) -> Result<Payment, RepoError> {
            Ok(Payment {
                id: PaymentId::from_uuid(self.id),
                idempotency_key: self.idempotency_key,
                source_account: AccountId::from_uuid(self.source_account_id),
                destination_account: AccountId::from_uuid(self.destination_account_id),
                amount: self.amount,
                currency: Currency::parse(&self.currency)?,
                status: PaymentStatus::parse(&self.status)?,
                customer_id: self.customer_id,
                journal_id: self.journal_id.map(JournalId::from_uuid),
                created_at: self.created_at,
                updated_at: self.updated_at,
            })
        }
    }

    #[derive(FromRow)]
    pub struct PgPaymentStep {
        pub payment_id: Uuid,
        pub step: String,
        pub state: String,
        pub details_json: serde_json::Value,
        pub attempted_at: DateTime<Utc>,
    }

    impl PgPaymentStep {
        pub fn into_domain(self) -> PaymentStep {
            PaymentStep {
                payment_id: PaymentId::from_uuid(self.payment_id),
                step: self.step,
                state: self.state,
                details: self.details_json,
                attempted_at: self.attempted_at,
            }
        }
    }

    #[derive(FromRow)]
    pub struct PgJournal {
        pub id: Uuid,
        pub external_ref: String,
        pub booked_at: DateTime<Utc>,
        pub created_by: String,
        pub status: String,
        pub currency: String,
    }

    impl PgJournal {
        pub fn into_domain(self, lines: Vec<EntryLine>) -> Result<JournalEntry, RepoError> {
            Ok(JournalEntry {
                id: JournalId::from_uuid(self.id),
                external_ref: self.external_ref,
                booked_at: self.booked_at,
                created_by: self.created_by,
                status: JournalStatus::parse(&self.status)?,
                currency: Currency::parse(&self.currency)?,
                lines,
            })
        }
    }

    #[derive(FromRow)]
    pub struct PgEntryLine {
        pub id: Uuid,
        pub journal_id: Uuid,
        pub gl_account_code: String,
        pub counterparty_ref: Option<String>,
        pub debit: Decimal,
        pub credit: Decimal,
    }

    impl PgEntryLine {
        pub fn into_domain(self) -> Result<EntryLine, RepoError> {
            Ok(EntryLine {
                id: self.id,
                journal_id: JournalId::from_uuid(self.journal_id),
                gl_account: GlAccount::from_code(&self.gl_account_code)?,
                counterparty: parse_counterparty(self.counterparty_ref)?,
                debit: self.debit,
                credit: self.credit,
            })
        }
    }

    #[derive(FromRow)]
    pub struct PgOutboxEvent {
        pub id: Uuid,
        pub aggregate_type: String,
        pub aggregate_id: Uuid,
        pub event_type: String,
        pub payload_json: serde_json::Value,
        pub published: bool,
        pub published_at: Option<DateTime<Utc>>,
        pub processing: bool,
        pub processing_owner: Option<String>,
        pub processing_at: Option<DateTime<Utc>>,
        pub created_at: DateTime<Utc>,
    }

    impl PgOutboxEvent {
        pub fn into_domain(self) -> OutboxEvent {
            OutboxEvent {
                id: EventId::from_uuid(self.id),
                aggregate_type: self.aggregate_type,
                aggregate_id: self.aggregate_id,
                event_type: self.event_type,
                payload: self.payload_json,
                published: self.published,
                published_at: self.published_at,
                processing: self.processing,
                processing_owner: self.processing_owner,
                processing_at: self.processing_at,
                created_at: self.created_at,
            }
        }
    }

    #[derive(FromRow)]
    pub struct PgIdempotencyRecord {
        pub key: String,
        pub operation: String,
        pub response_json: String,
        pub status_code: i32,
        pub created_at: DateTime<Utc>,
    }

    impl PgIdempotencyRecord {
        pub fn into_domain(self) -> Result<IdempotencyRecord, RepoError> {
            Ok(IdempotencyRecord {
                key: self.key,
                operation: self.operation,
                response_json: self.response_json,
                status_code: u16::try_from(self.status_code)
                    .map_err(|e| RepoError::Database(e.to_string()))?,
                created_at: self.created_at,
            })
        }
    }
}
