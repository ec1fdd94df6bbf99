//! # Ledger Application
//!
//! Binary that wires together all the components:
//! - Load configuration from environment
//! - Initialize the Unit-of-Work adapter
//! - Install the accounts gateway, event publisher and audit sink
//! - Start the outbox worker and the HTTP server

mod config;

use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use ledger_hex::inbound::HttpServer;
use ledger_hex::outbound::{
    AccountsGatewaySwitch, HttpAccountsGateway, HttpEventPublisher, LogEventPublisher,
    PublisherAudit,
};
use ledger_hex::{LedgerService, OutboxConfig, OutboxWorker, PaymentService};
use ledger_repo::Repo;
use ledger_types::{AccountsGateway, AuditPort, EventPublisher};

use config::Config;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,ledger_app=debug,ledger_hex=debug".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn build_publisher(config: &Config) -> anyhow::Result<Arc<dyn EventPublisher>> {
    match &config.events.publish_url {
        Some(url) => {
            tracing::info!(url = %url, "relaying events over HTTP");
            let publisher = HttpEventPublisher::new(
                url.clone(),
                config.events.signing_secret.clone(),
                config.accounts.timeout,
            )?;
            Ok(Arc::new(publisher))
        }
        None => {
            tracing::warn!("EVENTS_PUBLISH_URL not set, events go to the log");
            Ok(Arc::new(LogEventPublisher))
        }
    }
}

fn build_accounts(config: &Config) -> anyhow::Result<Arc<AccountsGatewaySwitch>> {
    let switch = Arc::new(AccountsGatewaySwitch::new());
    match &config.accounts.base_url {
        Some(base_url) => {
            let gateway = HttpAccountsGateway::new(
                base_url,
                config.accounts.internal_token.clone(),
                config.accounts.timeout,
            )?;
            switch.swap(Arc::new(gateway));
            tracing::info!(base_url = %base_url, "accounts gateway installed");
        }
        None => tracing::warn!("ACCOUNTS_BASE_URL not set, accounts gateway unavailable"),
    }
    Ok(switch)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env()?;
    tracing::info!(
        service = %config.service_name,
        env = %config.app_env,
        port = config.port,
        "starting ledger server"
    );

    // Build the Unit of Work (handles connection and migration)
    let repo = Arc::new(Repo::with_read_url(&config.write_dsn, config.read_dsn.as_deref()).await?);
    tracing::info!(backend = repo.backend(), "storage ready");

    let accounts: Arc<dyn AccountsGateway> = build_accounts(&config)?;
    let publisher = build_publisher(&config)?;
    let audit: Arc<dyn AuditPort> = Arc::new(PublisherAudit::new(
        publisher.clone(),
        config.events.audit_topic.clone(),
    ));

    let payments = PaymentService::new(repo.clone(), accounts.clone(), audit.clone());
    let ledger = LedgerService::new(repo.clone(), accounts, audit);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = OutboxWorker::new(
        repo,
        publisher,
        OutboxConfig {
            batch_size: config.outbox.batch_size,
            poll_interval: config.outbox.poll_interval,
            claim_ttl: config.outbox.claim_ttl,
            worker_id: config.worker_id.clone(),
        },
    );
    let worker_handle = tokio::spawn(worker.run(shutdown_rx));

    let server = HttpServer::new(payments, ledger, &config.app_env);
    let addr = format!("0.0.0.0:{}", config.port);
    let served = server.run(&addr).await;

    // Stop the relay after the server has drained.
    let _ = shutdown_tx.send(true);
    if let Err(e) = worker_handle.await {
        tracing::error!(error = %e, "outbox worker task failed");
    }

    served
}
