//! HTTP-level tests for the ledger API: routing, status mapping, error
//! sanitization and correlation ids.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tower::ServiceExt;

use ledger_hex::inbound::{CORRELATION_ID_HEADER, HttpServer};
use ledger_hex::outbound::{LogAudit, UnavailableAccountsGateway};
use ledger_hex::{LedgerService, PaymentService};
use ledger_repo::InMemoryUow;
use ledger_types::ports::{
    AccountSummary, GatewayError, HoldOutcome, HoldRequest, ValidationOutcome,
};
use ledger_types::{AccountId, AccountsGateway, Currency};

struct AcceptAll;

#[async_trait]
impl AccountsGateway for AcceptAll {
    async fn validate_accounts_and_limits(
        &self,
        _source: AccountId,
        _destination: AccountId,
        _currency: &Currency,
        _amount: Decimal,
    ) -> Result<ValidationOutcome, GatewayError> {
        Ok(ValidationOutcome::accepted())
    }

    async fn reserve_hold(&self, req: &HoldRequest) -> Result<HoldOutcome, GatewayError> {
        Ok(HoldOutcome {
            ok: true,
            status: "held".into(),
            new_hold: Some(req.amount),
        })
    }

    async fn release_hold(&self, _req: &HoldRequest) -> Result<HoldOutcome, GatewayError> {
        Ok(HoldOutcome {
            ok: true,
            status: "released".into(),
            new_hold: None,
        })
    }

    async fn batch_get_account_summaries(
        &self,
        _ids: &[AccountId],
    ) -> Result<Vec<AccountSummary>, GatewayError> {
        Ok(Vec::new())
    }
}

/// Helper to build a router over an in-memory store.
fn app(accounts: Arc<dyn AccountsGateway>, app_env: &str) -> Router {
    let uow = Arc::new(InMemoryUow::new());
    let payments = PaymentService::new(uow.clone(), accounts.clone(), Arc::new(LogAudit));
    let ledger = LedgerService::new(uow, accounts, Arc::new(LogAudit));
    HttpServer::new(payments, ledger, app_env).router()
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn payment_body(key: &str) -> Value {
    json!({
        "idempotency_key": key,
        "source_account_id": AccountId::new().to_string(),
        "destination_account_id": AccountId::new().to_string(),
        "currency": "USD",
        "amount": "50.00",
        "initiated_by": "user:alice"
    })
}

#[tokio::test]
async fn test_health_carries_generated_correlation_id() {
    let response = app(Arc::new(AcceptAll), "dev")
        .oneshot(get("/health"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(CORRELATION_ID_HEADER));
    assert_eq!(body_json(response).await["status"], "healthy");
}

#[tokio::test]
async fn test_correlation_id_is_propagated() {
    let request = Request::builder()
        .uri("/health")
        .header(CORRELATION_ID_HEADER, "corr-123")
        .body(Body::empty())
        .unwrap();
    let response = app(Arc::new(AcceptAll), "dev")
        .oneshot(request)
        .await
        .unwrap();

    assert_eq!(
        response.headers().get(CORRELATION_ID_HEADER).unwrap(),
        "corr-123"
    );
}

#[tokio::test]
async fn test_post_then_get_payment() {
    let app = app(Arc::new(AcceptAll), "dev");

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/v1/payments",
            payment_body("http-pay-0001"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert_eq!(created["status"], "posted");
    let payment_id = created["payment_id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(get(&format!("/v1/payments/{payment_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let payment = body_json(response).await;
    assert_eq!(payment["payment_id"], payment_id.as_str());
    assert_eq!(payment["amount"], "50.000000");
    assert_eq!(payment["steps"].as_array().unwrap().len(), 2);

    let response = app.oneshot(get("/v1/payments/not-a-uuid")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/payments")
        .header("Content-Type", "application/json")
        .body(Body::from(r#"{"idempotency_key": 42"#))
        .unwrap();
    let response = app(Arc::new(AcceptAll), "dev")
        .oneshot(request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], 400);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_unavailable_gateway_is_503() {
    let response = app(Arc::new(UnavailableAccountsGateway), "dev")
        .oneshot(json_request(
            Method::POST,
            "/v1/payments",
            payment_body("http-down-0001"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert!(
        body["error"]
            .as_str()
            .unwrap()
            .contains("not configured")
    );
}

#[tokio::test]
async fn test_production_hides_server_side_details() {
    let response = app(Arc::new(UnavailableAccountsGateway), "prod")
        .oneshot(json_request(
            Method::POST,
            "/v1/payments",
            payment_body("http-prod-0001"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.headers().contains_key(CORRELATION_ID_HEADER));
    let body = body_json(response).await;
    assert_eq!(body["error"], "service unavailable, retry later");
    assert_eq!(body["code"], 503);
}

#[tokio::test]
async fn test_unbalanced_manual_entry_is_bad_request() {
    let body = json!({
        "currency": "USD",
        "initiated_by": "ops:bob",
        "lines": [
            { "gl_account_code": "GL_SYSTEM_FUND", "debit": "100.00" },
            {
                "gl_account_code": "GL_CUSTOMER_CASH",
                "counterparty_ref": AccountId::new().to_string(),
                "credit": "90.00"
            }
        ]
    });
    let response = app(Arc::new(AcceptAll), "prod")
        .oneshot(json_request(Method::POST, "/v1/ledger/journal-entries", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("Unbalanced"));
}

#[tokio::test]
async fn test_credit_then_list_journal_entries() {
    let app = app(Arc::new(AcceptAll), "dev");
    let account = AccountId::new();
    let credit = json!({
        "idempotency_key": "http-credit-0001",
        "account_id": account.to_string(),
        "currency": "USD",
        "amount": "100.00",
        "initiated_by": "ops:bob"
    });

    let response = app
        .clone()
        .oneshot(json_request(Method::POST, "/v1/ledger/credits", credit))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let uri = format!(
        "/v1/ledger/accounts/{account}/journal-entries?from=2000-01-01T00:00:00Z&to=2000-02-01T00:00:00Z&size=10"
    );
    let response = app.clone().oneshot(get(&uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await["entries"].as_array().unwrap().is_empty());

    let now = chrono::Utc::now();
    let from = (now - chrono::Duration::hours(1)).format("%Y-%m-%dT%H:%M:%SZ");
    let to = (now + chrono::Duration::hours(1)).format("%Y-%m-%dT%H:%M:%SZ");
    let uri = format!("/v1/ledger/accounts/{account}/statement?from={from}&to={to}");
    let response = app.oneshot(get(&uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let statement = body_json(response).await;
    assert_eq!(statement["items"][0]["direction"], "credit");
    assert_eq!(statement["items"][0]["amount"], "100.000000");
}

#[tokio::test]
async fn test_missing_window_is_bad_request() {
    let uri = format!("/v1/ledger/accounts/{}/journal-entries", AccountId::new());
    let response = app(Arc::new(AcceptAll), "dev")
        .oneshot(get(&uri))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], 400);
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let response = app(Arc::new(AcceptAll), "dev")
        .oneshot(get("/api-docs/openapi.json"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let doc = body_json(response).await;
    assert!(doc["paths"]["/v1/payments"].is_object());
}
