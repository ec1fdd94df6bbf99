//! # Ledger Repository
//!
//! Unit-of-Work adapters for the ledger service. Each adapter implements the
//! `UnitOfWorkManager` port from `ledger-types`:
//!
//! - `postgres` - PostgreSQL, with an optional read replica (feature `postgres`)
//! - `sqlite` - SQLite, file or in-memory (feature `sqlite`)
//! - `memory` - process memory, always available

use async_trait::async_trait;
use futures::future::BoxFuture;
use ledger_types::{RepoError, Repositories, UnitOfWorkManager};

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(feature = "postgres", feature = "sqlite"))]
mod types;


pub use memory::InMemoryUow;
#[cfg(feature = "postgres")]
pub use postgres::PostgresUow;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteUow;

/// Maps a failed insert, turning unique-constraint violations into
/// [`RepoError::Conflict`].
#[cfg(any(feature = "postgres", feature = "sqlite"))]
pub(crate) fn map_write_err(e: sqlx::Error) -> RepoError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => RepoError::Conflict(db.message().to_string()),
        _ => RepoError::Database(e.to_string()),
    }
}

/// Unified unit-of-work manager, selected from the database URL at startup.
pub enum Repo {
    #[cfg(feature = "postgres")]
    Postgres(postgres::PostgresUow),
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite::SqliteUow),
    Memory(memory::InMemoryUow),
}

/// Opens the ledger store named by `database_url`: `postgres://` or
/// `postgresql://`, `sqlite:`, or `memory:` for a process-local ledger.
/// SQL backends get the ledger schema applied before this returns.
///
/// ```ignore
/// let repo = build_repo("sqlite://data/ledger.db?mode=rwc").await?;
/// let repo = build_repo("memory:").await?;
/// ```
pub async fn build_repo(database_url: &str) -> anyhow::Result<Repo> {
    Repo::new(database_url).await
}

impl Repo {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        Self::with_read_url(database_url, None).await
    }

    /// Like [`Repo::new`], sending reads to `read_url` when given.
    pub async fn with_read_url(write_url: &str, read_url: Option<&str>) -> anyhow::Result<Self> {
        if write_url.starts_with("memory") {
            return Ok(Self::Memory(memory::InMemoryUow::new()));
        }

        if write_url.starts_with("postgres://") || write_url.starts_with("postgresql://") {
            #[cfg(feature = "postgres")]
            {
                let uow = match read_url {
                    Some(read) => postgres::PostgresUow::with_read_url(write_url, read).await?,
                    None => postgres::PostgresUow::new(write_url).await?,
                };
                return Ok(Self::Postgres(uow));
            }
            #[cfg(not(feature = "postgres"))]
            anyhow::bail!("postgres support is not compiled in (enable feature `postgres`)");
        }

        if write_url.starts_with("sqlite:") {
            #[cfg(feature = "sqlite")]
            {
                let uow = match read_url {
                    Some(read) => sqlite::SqliteUow::with_read_url(write_url, read).await?,
                    None => sqlite::SqliteUow::new(write_url).await?,
                };
                return Ok(Self::Sqlite(uow));
            }
            #[cfg(not(feature = "sqlite"))]
            anyhow::bail!("sqlite support is not compiled in (enable feature `sqlite`)");
        }

        anyhow::bail!("unsupported database url scheme: {write_url}")
    }

    pub fn backend(&self) -> &'static str {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(_) => "postgres",
            #[cfg(feature = "sqlite")]
            Self::Sqlite(_) => "sqlite",
            Self::Memory(_) => "memory",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Implement UnitOfWorkManager for Repo (delegation)
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl UnitOfWorkManager for Repo {
    async fn do_read<T, F>(&self, f: F) -> Result<T, RepoError>
    where
        T: Send,
        F: for<'r> FnOnce(&'r mut dyn Repositories) -> BoxFuture<'r, Result<T, RepoError>> + Send,
    {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(uow) => uow.do_read(f).await,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(uow) => uow.do_read(f).await,
            Self::Memory(uow) => uow.do_read(f).await,
        }
    }

    async fn do_write<T, F>(&self, f: F) -> Result<T, RepoError>
    where
        T: Send,
        F: for<'r> FnOnce(&'r mut dyn Repositories) -> BoxFuture<'r, Result<T, RepoError>> + Send,
    {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(uow) => uow.do_write(f).await,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(uow) => uow.do_write(f).await,
            Self::Memory(uow) => uow.do_write(f).await,
        }
    }
}
