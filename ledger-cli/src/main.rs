//! Ledger CLI
//!
//! Command-line interface for the ledger and payments API.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use ledger_client::LedgerClient;
use ledger_hex::outbound::publisher::{KEY_HEADER, SIGNATURE_HEADER, TOPIC_HEADER};
use ledger_hex::outbound::signing::verify_signature;
use ledger_types::{
    CreditAccountRequest, JournalEntriesQuery, ManualJournalEntryRequest, ManualLineRequest,
    PaymentId, PostPaymentRequest, StatementQuery,
};

#[derive(Parser)]
#[command(name = "ledger")]
#[command(author, version, about = "Ledger & Payments API CLI client", long_about = None)]
struct Cli {
    /// Base URL of the ledger API
    #[arg(long, env = "LEDGER_API_URL", default_value = "http://localhost:8082")]
    api_url: String,

    /// Correlation id sent with every request
    #[arg(long, env = "LEDGER_CORRELATION_ID")]
    correlation_id: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Payment operations
    Payment {
        #[command(subcommand)]
        action: PaymentCommands,
    },
    /// Journal postings and account activity
    Ledger {
        #[command(subcommand)]
        action: LedgerCommands,
    },
    /// Relayed event operations
    Events {
        #[command(subcommand)]
        action: EventCommands,
    },
    /// Check API health
    Health,
}

#[derive(Subcommand)]
enum PaymentCommands {
    /// Move money between two accounts
    Post {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        /// Decimal amount, e.g. 50.00
        #[arg(long)]
        amount: String,
        #[arg(long, default_value = "USD")]
        currency: String,
        #[arg(long, env = "LEDGER_ACTOR", default_value = "cli")]
        initiated_by: String,
        /// Generated when omitted; pass the same key to retry safely
        #[arg(long)]
        idempotency_key: Option<String>,
        #[arg(long)]
        customer_id: Option<String>,
    },
    /// Get a payment with its step log
    Get {
        /// Payment ID (UUID)
        id: String,
    },
}

#[derive(Subcommand)]
enum LedgerCommands {
    /// Top up an account
    Credit {
        #[arg(long)]
        account: String,
        #[arg(long)]
        amount: String,
        #[arg(long, default_value = "USD")]
        currency: String,
        #[arg(long, env = "LEDGER_ACTOR", default_value = "cli")]
        initiated_by: String,
        #[arg(long)]
        idempotency_key: Option<String>,
        #[arg(long)]
        external_ref: Option<String>,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Post a manual journal entry
    Manual {
        #[arg(long, default_value = "USD")]
        currency: String,
        #[arg(long, env = "LEDGER_ACTOR", default_value = "cli")]
        initiated_by: String,
        #[arg(long)]
        external_ref: Option<String>,
        /// GL_CODE,counterparty,debit,credit (empty fields allowed); repeatable
        #[arg(long = "line", required = true, value_parser = parse_line)]
        lines: Vec<ManualLineRequest>,
    },
    /// List journal entries touching an account
    Journal {
        account: String,
        #[arg(long)]
        from: DateTime<Utc>,
        #[arg(long)]
        to: DateTime<Utc>,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        size: Option<u32>,
    },
    /// Account statement
    Statement {
        account: String,
        #[arg(long)]
        from: DateTime<Utc>,
        #[arg(long)]
        to: DateTime<Utc>,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        size: Option<u32>,
        /// Resolve counterparty account details
        #[arg(long)]
        with_counterparty: bool,
    },
}

#[derive(Subcommand)]
enum EventCommands {
    /// Start a local receiver for relayed events
    Listen {
        #[arg(long, default_value = "9090")]
        port: u16,
        /// Verify `x-ledger-signature` with this secret
        #[arg(long, env = "EVENTS_SIGNING_SECRET")]
        secret: Option<String>,
    },
}

/// Parses `GL_CODE,counterparty,debit,credit`.
fn parse_line(raw: &str) -> Result<ManualLineRequest, String> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    let [code, counterparty, debit, credit] = parts.as_slice() else {
        return Err(format!(
            "expected GL_CODE,counterparty,debit,credit but got {raw:?}"
        ));
    };
    let field = |s: &str| (!s.is_empty()).then(|| s.to_string());
    Ok(ManualLineRequest {
        gl_account_code: code.to_string(),
        counterparty_ref: field(counterparty),
        debit: field(debit),
        credit: field(credit),
    })
}

fn parse_payment_id(s: &str) -> Result<PaymentId> {
    s.parse()
        .map_err(|_| anyhow::anyhow!("Invalid payment ID: {}", s))
}

fn key_or_new(key: Option<String>) -> String {
    key.unwrap_or_else(|| format!("cli-{}", uuid::Uuid::new_v4()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut client = LedgerClient::new(&cli.api_url);
    if let Some(id) = cli.correlation_id {
        client = client.with_correlation_id(id);
    }

    match cli.command {
        Commands::Health => {
            let healthy = client.health().await?;
            if healthy {
                println!("✓ API is healthy");
            } else {
                println!("✗ API is not healthy");
                std::process::exit(1);
            }
        }

        Commands::Payment { action } => match action {
            PaymentCommands::Post {
                from,
                to,
                amount,
                currency,
                initiated_by,
                idempotency_key,
                customer_id,
            } => {
                let req = PostPaymentRequest {
                    idempotency_key: key_or_new(idempotency_key),
                    source_account_id: from,
                    destination_account_id: to,
                    currency,
                    amount,
                    initiated_by,
                    customer_id,
                };
                eprintln!("idempotency key: {}", req.idempotency_key);
                print_json(&client.post_payment(&req).await?)?;
            }
            PaymentCommands::Get { id } => {
                let payment_id = parse_payment_id(&id)?;
                print_json(&client.get_payment(payment_id).await?)?;
            }
        },

        Commands::Ledger { action } => match action {
            LedgerCommands::Credit {
                account,
                amount,
                currency,
                initiated_by,
                idempotency_key,
                external_ref,
                reason,
            } => {
                let req = CreditAccountRequest {
                    idempotency_key: key_or_new(idempotency_key),
                    account_id: account,
                    currency,
                    amount,
                    initiated_by,
                    external_ref,
                    reason,
                    customer_id: None,
                };
                eprintln!("idempotency key: {}", req.idempotency_key);
                print_json(&client.credit_account(&req).await?)?;
            }
            LedgerCommands::Manual {
                currency,
                initiated_by,
                external_ref,
                lines,
            } => {
                let req = ManualJournalEntryRequest {
                    currency,
                    initiated_by,
                    external_ref,
                    lines,
                };
                print_json(&client.create_manual_journal_entry(&req).await?)?;
            }
            LedgerCommands::Journal {
                account,
                from,
                to,
                page,
                size,
            } => {
                let query = JournalEntriesQuery {
                    from,
                    to,
                    page,
                    size,
                };
                print_json(&client.list_account_journal_entries(&account, &query).await?)?;
            }
            LedgerCommands::Statement {
                account,
                from,
                to,
                page,
                size,
                with_counterparty,
            } => {
                let query = StatementQuery {
                    from,
                    to,
                    page,
                    size,
                    include_counterparty: with_counterparty,
                };
                print_json(&client.list_account_statement(&account, &query).await?)?;
            }
        },

        Commands::Events { action } => match action {
            EventCommands::Listen { port, secret } => {
                let app = axum::Router::new()
                    .route("/events", axum::routing::post(handle_event))
                    .with_state(secret);
                let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
                println!("Listening for events on {}/events", addr);
                let listener = tokio::net::TcpListener::bind(&addr).await?;
                axum::serve(listener, app).await?;
            }
        },
    }

    Ok(())
}

async fn handle_event(
    axum::extract::State(secret): axum::extract::State<Option<String>>,
    headers: axum::http::HeaderMap,
    body: String,
) -> axum::http::StatusCode {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string()
    };

    let verified = match &secret {
        Some(secret) => {
            let ok = verify_signature(body.as_bytes(), &header(SIGNATURE_HEADER), secret);
            if ok { "valid" } else { "INVALID" }
        }
        None => "not checked",
    };
    println!(
        "topic={} key={} signature={}",
        header(TOPIC_HEADER),
        header(KEY_HEADER),
        verified
    );
    println!("{}", body);
    println!("----------------------------------------");

    if verified == "INVALID" {
        axum::http::StatusCode::UNAUTHORIZED
    } else {
        axum::http::StatusCode::OK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line_with_empty_fields() {
        let line = parse_line("GL_SYSTEM_FUND,,100.00,").unwrap();
        assert_eq!(line.gl_account_code, "GL_SYSTEM_FUND");
        assert!(line.counterparty_ref.is_none());
        assert_eq!(line.debit.as_deref(), Some("100.00"));
        assert!(line.credit.is_none());
    }

    #[test]
    fn test_parse_line_requires_four_fields() {
        assert!(parse_line("GL_IN,100").is_err());
    }

    #[test]
    fn test_cli_parses_statement_window() {
        let cli = Cli::try_parse_from([
            "ledger",
            "ledger",
            "statement",
            "8d0f7c3e-6a51-4c3b-9a57-0d6f3f1b2a10",
            "--from",
            "2026-01-01T00:00:00Z",
            "--to",
            "2026-02-01T00:00:00Z",
            "--with-counterparty",
        ])
        .unwrap();
        match cli.command {
            Commands::Ledger {
                action:
                    LedgerCommands::Statement {
                        with_counterparty,
                        from,
                        ..
                    },
            } => {
                assert!(with_counterparty);
                assert_eq!(from.to_rfc3339(), "2026-01-01T00:00:00+00:00");
            }
            _ => panic!("unexpected command"),
        }
    }
}
