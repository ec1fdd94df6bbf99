//! HTTP Server configuration and startup.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Request,
    http::HeaderName,
    middleware,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;

use ledger_types::UnitOfWorkManager;

use super::errors::{ErrorPolicy, handle_panic, sanitize_errors};
use super::handlers::{self, AppState};
use crate::openapi::ApiDoc;
use crate::service::{LedgerService, PaymentService};

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// HTTP Server for the ledger and payments API.
pub struct HttpServer<U: UnitOfWorkManager> {
    state: Arc<AppState<U>>,
    errors: ErrorPolicy,
}

impl<U: UnitOfWorkManager> HttpServer<U> {
    pub fn new(payments: PaymentService<U>, ledger: LedgerService<U>, app_env: &str) -> Self {
        Self {
            state: Arc::new(AppState { payments, ledger }),
            errors: ErrorPolicy::for_env(app_env),
        }
    }

    /// Builds the Axum router with all routes.
    pub fn router(&self) -> Router {
        let correlation_id = HeaderName::from_static(CORRELATION_ID_HEADER);

        let trace = TraceLayer::new_for_http().make_span_with(|request: &Request| {
            let correlation_id = request
                .headers()
                .get(CORRELATION_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "http",
                method = %request.method(),
                uri = %request.uri(),
                correlation_id = %correlation_id,
            )
        });

        Router::new()
            .route("/health", get(handlers::health))
            .route(
                "/api-docs/openapi.json",
                get(|| async { Json(ApiDoc::openapi()) }),
            )
            .route("/v1/payments", post(handlers::post_payment::<U>))
            .route("/v1/payments/{id}", get(handlers::get_payment::<U>))
            .route("/v1/ledger/credits", post(handlers::credit_account::<U>))
            .route(
                "/v1/ledger/journal-entries",
                post(handlers::create_manual_journal_entry::<U>),
            )
            .route(
                "/v1/ledger/accounts/{id}/journal-entries",
                get(handlers::list_journal_entries::<U>),
            )
            .route(
                "/v1/ledger/accounts/{id}/statement",
                get(handlers::list_statement::<U>),
            )
            .layer(middleware::from_fn_with_state(self.errors, sanitize_errors))
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(
                        correlation_id.clone(),
                        MakeRequestUuid,
                    ))
                    .layer(trace)
                    .layer(PropagateRequestIdLayer::new(correlation_id))
                    .layer(CatchPanicLayer::custom(handle_panic)),
            )
            .with_state(self.state.clone())
    }

    /// Runs the server on the given address until a shutdown signal arrives.
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}
