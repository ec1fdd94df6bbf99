//! # Ledger Client SDK
//!
//! A typed Rust client for the ledger and payments API.

use ledger_types::{
    CreditAccountRequest, JournalEntriesPage, JournalEntriesQuery, JournalPostedResponse,
    ManualJournalEntryRequest, PaymentId, PaymentResponse, PostPaymentRequest,
    PostPaymentResponse, StatementPage, StatementQuery,
};
use reqwest::Client;
use serde::de::DeserializeOwned;

const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Error type for client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api {
        status: u16,
        message: String,
        correlation_id: Option<String>,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// Server-side failures are worth retrying with the same idempotency key.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Http(e) => e.is_timeout() || e.is_connect(),
            ClientError::Api { status, .. } => *status >= 500,
            ClientError::Json(_) => false,
        }
    }
}

/// Ledger API client.
pub struct LedgerClient {
    base_url: String,
    correlation_id: Option<String>,
    http: Client,
}

impl LedgerClient {
    /// Creates a new client.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            correlation_id: None,
            http: Client::new(),
        }
    }

    /// Sends `correlation_id` with every request.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Checks if the API is healthy.
    pub async fn health(&self) -> Result<bool, ClientError> {
        let resp = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        Ok(resp.status().is_success())
    }

    /// Posts a payment. Safe to retry with the same idempotency key.
    pub async fn post_payment(
        &self,
        req: &PostPaymentRequest,
    ) -> Result<PostPaymentResponse, ClientError> {
        self.post("/v1/payments", req).await
    }

    pub async fn get_payment(&self, id: PaymentId) -> Result<PaymentResponse, ClientError> {
        let req = self.http.get(format!("{}/v1/payments/{id}", self.base_url));
        self.send(req).await
    }

    /// Tops up an account. Safe to retry with the same idempotency key.
    pub async fn credit_account(
        &self,
        req: &CreditAccountRequest,
    ) -> Result<JournalPostedResponse, ClientError> {
        self.post("/v1/ledger/credits", req).await
    }

    /// Posts a manual journal entry. Every call creates a new journal.
    pub async fn create_manual_journal_entry(
        &self,
        req: &ManualJournalEntryRequest,
    ) -> Result<JournalPostedResponse, ClientError> {
        self.post("/v1/ledger/journal-entries", req).await
    }

    pub async fn list_account_journal_entries(
        &self,
        account_id: &str,
        query: &JournalEntriesQuery,
    ) -> Result<JournalEntriesPage, ClientError> {
        self.get(
            &format!("/v1/ledger/accounts/{account_id}/journal-entries"),
            query,
        )
        .await
    }

    pub async fn list_account_statement(
        &self,
        account_id: &str,
        query: &StatementQuery,
    ) -> Result<StatementPage, ClientError> {
        self.get(&format!("/v1/ledger/accounts/{account_id}/statement"), query)
            .await
    }

    async fn get<T: DeserializeOwned, Q: serde::Serialize>(
        &self,
        path: &str,
        query: &Q,
    ) -> Result<T, ClientError> {
        let req = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .query(query);
        self.send(req).await
    }

    async fn post<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let req = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(body);
        self.send(req).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        mut req: reqwest::RequestBuilder,
    ) -> Result<T, ClientError> {
        if let Some(id) = &self.correlation_id {
            req = req.header(CORRELATION_ID_HEADER, id);
        }
        let resp = req.send().await?;
        self.handle_response(resp).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = resp.status();
        if status.is_success() {
            let body = resp.text().await?;
            Ok(serde_json::from_str(&body)?)
        } else {
            let correlation_id = resp
                .headers()
                .get(CORRELATION_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
                .unwrap_or(body);
            Err(ClientError::Api {
                status: status.as_u16(),
                message,
                correlation_id,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        Json, Router,
        http::{HeaderMap, StatusCode},
        routing::post,
    };
    use serde_json::json;

    use super::*;

    #[test]
    fn test_client_creation() {
        let client = LedgerClient::new("http://localhost:8082");
        assert_eq!(client.base_url, "http://localhost:8082");
    }

    #[test]
    fn test_client_with_trailing_slash() {
        let client = LedgerClient::new("http://localhost:8082/");
        assert_eq!(client.base_url, "http://localhost:8082");
    }

    #[test]
    fn test_client_with_correlation_id() {
        let client = LedgerClient::new("http://localhost:8082").with_correlation_id("run-42");
        assert_eq!(client.correlation_id, Some("run-42".to_string()));
    }

    async fn rejecting(headers: HeaderMap) -> (StatusCode, HeaderMap, Json<serde_json::Value>) {
        let mut out = HeaderMap::new();
        if let Some(id) = headers.get(CORRELATION_ID_HEADER) {
            out.insert(CORRELATION_ID_HEADER, id.clone());
        }
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            out,
            Json(json!({ "error": "accounts validation failed: frozen", "code": 422 })),
        )
    }

    #[tokio::test]
    async fn test_api_error_carries_message_and_correlation_id() {
        let app = Router::new().route("/v1/payments", post(rejecting));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = LedgerClient::new(base_url).with_correlation_id("corr-7");
        let req = PostPaymentRequest {
            idempotency_key: "client-key-0001".into(),
            source_account_id: "a".into(),
            destination_account_id: "b".into(),
            currency: "USD".into(),
            amount: "1.00".into(),
            initiated_by: "cli".into(),
            customer_id: None,
        };
        let err = client.post_payment(&req).await.unwrap_err();
        match &err {
            ClientError::Api {
                status,
                message,
                correlation_id,
            } => {
                assert_eq!(*status, 422);
                assert_eq!(message, "accounts validation failed: frozen");
                assert_eq!(correlation_id.as_deref(), Some("corr-7"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
        assert!(!err.is_retryable());
        server.abort();
    }
}
