//! Configuration loading from environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub app_env: String,
    pub service_name: String,
    pub port: u16,
    pub write_dsn: String,
    pub read_dsn: Option<String>,
    pub accounts: AccountsConfig,
    pub outbox: OutboxSettings,
    pub events: EventsConfig,
    pub worker_id: String,
}

#[derive(Debug, Clone)]
pub struct AccountsConfig {
    /// Unset leaves the gateway unavailable.
    pub base_url: Option<String>,
    pub internal_token: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct OutboxSettings {
    pub batch_size: u32,
    pub poll_interval: Duration,
    pub claim_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct EventsConfig {
    /// Unset falls back to the log publisher.
    pub publish_url: Option<String>,
    pub signing_secret: Option<String>,
    pub audit_topic: String,
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match non_empty(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        None => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let write_dsn = non_empty("DB_WRITE_DSN")
            .or_else(|| non_empty("DATABASE_URL"))
            .ok_or_else(|| anyhow::anyhow!("DB_WRITE_DSN or DATABASE_URL is required"))?;

        Ok(Self {
            app_env: non_empty("APP_ENV").unwrap_or_else(|| "dev".to_string()),
            service_name: non_empty("SERVICE_NAME").unwrap_or_else(|| "ledger-payments".to_string()),
            port: parse_or("PORT", 8082)?,
            read_dsn: non_empty("DB_READ_DSN"),
            write_dsn,
            accounts: AccountsConfig {
                base_url: non_empty("ACCOUNTS_BASE_URL"),
                internal_token: non_empty("ACCOUNTS_INTERNAL_TOKEN"),
                timeout: Duration::from_millis(parse_or("ACCOUNTS_TIMEOUT_MS", 3000)?),
            },
            outbox: OutboxSettings {
                batch_size: parse_or("OUTBOX_BATCH_SIZE", 50)?,
                poll_interval: Duration::from_millis(parse_or("OUTBOX_POLL_INTERVAL_MS", 200)?),
                claim_ttl: Duration::from_secs(parse_or("OUTBOX_CLAIM_TTL_SECS", 120)?),
            },
            events: EventsConfig {
                publish_url: non_empty("EVENTS_PUBLISH_URL"),
                signing_secret: non_empty("EVENTS_SIGNING_SECRET"),
                audit_topic: non_empty("AUDIT_TOPIC").unwrap_or_else(|| "ledger.audit".to_string()),
            },
            worker_id: non_empty("WORKER_ID")
                .or_else(|| non_empty("HOSTNAME"))
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }
}
