//! HTTP request handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};

use ledger_types::{
    AppError, CreditAccountRequest, JournalEntriesQuery, ManualJournalEntryRequest, PaymentId,
    PostPaymentRequest, StatementQuery, UnitOfWorkManager,
};

use super::errors::ApiError;
use crate::service::{LedgerService, PaymentService};

/// Application state shared across handlers.
pub struct AppState<U: UnitOfWorkManager> {
    pub payments: PaymentService<U>,
    pub ledger: LedgerService<U>,
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(inner)| inner)
        .map_err(|e| AppError::BadRequest(e.body_text()).into())
}

fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    query
        .map(|Query(inner)| inner)
        .map_err(|e| AppError::BadRequest(e.body_text()).into())
}

/// Health check endpoint.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Payments
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip_all)]
pub async fn post_payment<U: UnitOfWorkManager>(
    State(state): State<Arc<AppState<U>>>,
    body: Result<Json<PostPaymentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = json_body(body)?;
    let response = state.payments.post_payment(&req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[tracing::instrument(skip(state), fields(payment_id = %id))]
pub async fn get_payment<U: UnitOfWorkManager>(
    State(state): State<Arc<AppState<U>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let payment_id: PaymentId = id
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid payment ID".into()))?;

    let payment = state.payments.get_payment(payment_id).await?;
    Ok(Json(payment))
}

// ─────────────────────────────────────────────────────────────────────────────
// Ledger
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip_all)]
pub async fn credit_account<U: UnitOfWorkManager>(
    State(state): State<Arc<AppState<U>>>,
    body: Result<Json<CreditAccountRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = json_body(body)?;
    let posted = state.ledger.credit_account(&req).await?;
    Ok((StatusCode::CREATED, Json(posted)))
}

#[tracing::instrument(skip_all)]
pub async fn create_manual_journal_entry<U: UnitOfWorkManager>(
    State(state): State<Arc<AppState<U>>>,
    body: Result<Json<ManualJournalEntryRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = json_body(body)?;
    let posted = state.ledger.create_manual_journal_entry(&req).await?;
    Ok((StatusCode::CREATED, Json(posted)))
}

#[tracing::instrument(skip(state, query), fields(account_id = %id))]
pub async fn list_journal_entries<U: UnitOfWorkManager>(
    State(state): State<Arc<AppState<U>>>,
    Path(id): Path<String>,
    query: Result<Query<JournalEntriesQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let query = query_params(query)?;
    let page = state
        .ledger
        .list_account_journal_entries(&id, &query)
        .await?;
    Ok(Json(page))
}

#[tracing::instrument(skip(state, query), fields(account_id = %id))]
pub async fn list_statement<U: UnitOfWorkManager>(
    State(state): State<Arc<AppState<U>>>,
    Path(id): Path<String>,
    query: Result<Query<StatementQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let query = query_params(query)?;
    let statement = state.ledger.list_account_statement(&id, &query).await?;
    Ok(Json(statement))
}
