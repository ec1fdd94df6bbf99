//! Accounts gateway over the accounts service's internal HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use ledger_types::ports::{
    AccountSummary, AccountsGateway, GatewayError, HoldOutcome, HoldRequest, ValidationOutcome,
};
use ledger_types::{AccountId, Currency};

use super::breaker::{BreakerConfig, CircuitBreaker};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);
const INTERNAL_TOKEN_HEADER: &str = "x-internal-token";
const IDEMPOTENCY_HEADER: &str = "idempotency-key";

#[derive(Serialize)]
struct ValidateBody<'a> {
    source_account_id: AccountId,
    destination_account_id: AccountId,
    currency: &'a Currency,
    amount: Decimal,
}

#[derive(Serialize)]
struct BatchSummariesBody<'a> {
    account_ids: &'a [AccountId],
}

#[derive(Deserialize)]
struct BatchSummariesResponse {
    #[serde(default)]
    accounts: Vec<AccountSummary>,
}

/// reqwest client for the accounts service, every call behind one
/// [`CircuitBreaker`].
pub struct HttpAccountsGateway {
    client: Client,
    base_url: String,
    internal_token: Option<String>,
    timeout: Duration,
    breaker: CircuitBreaker,
}

impl HttpAccountsGateway {
    pub fn new(
        base_url: &str,
        internal_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        Self::with_breaker(base_url, internal_token, timeout, BreakerConfig::default())
    }

    pub fn with_breaker(
        base_url: &str,
        internal_token: Option<String>,
        timeout: Duration,
        breaker: BreakerConfig,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            internal_token: internal_token.filter(|t| !t.is_empty()),
            timeout,
            breaker: CircuitBreaker::new("accounts-http", breaker),
        })
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    async fn post<B, T>(
        &self,
        path: &str,
        body: &B,
        idempotency_key: Option<&str>,
    ) -> Result<T, GatewayError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        self.breaker
            .call(|| async {
                let mut request = self.client.post(&url).json(body);
                if let Some(token) = &self.internal_token {
                    request = request.header(INTERNAL_TOKEN_HEADER, token);
                }
                if let Some(key) = idempotency_key {
                    request = request.header(IDEMPOTENCY_HEADER, key);
                }

                let response = request.send().await.map_err(|e| self.map_err(e))?;
                let status = response.status();
                if status.is_success() {
                    return response.json::<T>().await.map_err(|e| self.map_err(e));
                }

                let message = response.text().await.unwrap_or_default();
                if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                    Err(GatewayError::Unavailable(format!("{status}: {message}")))
                } else {
                    Err(GatewayError::Transport(format!("{status}: {message}")))
                }
            })
            .await
    }

    fn map_err(&self, e: reqwest::Error) -> GatewayError {
        if e.is_timeout() {
            GatewayError::Timeout(self.timeout)
        } else {
            GatewayError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl AccountsGateway for HttpAccountsGateway {
    #[tracing::instrument(skip(self, currency, amount))]
    async fn validate_accounts_and_limits(
        &self,
        source: AccountId,
        destination: AccountId,
        currency: &Currency,
        amount: Decimal,
    ) -> Result<ValidationOutcome, GatewayError> {
        let body = ValidateBody {
            source_account_id: source,
            destination_account_id: destination,
            currency,
            amount,
        };
        self.post("/internal/v1/accounts/validate", &body, None)
            .await
    }

    #[tracing::instrument(skip(self, req), fields(account_id = %req.account_id, hold_id = %req.hold_id))]
    async fn reserve_hold(&self, req: &HoldRequest) -> Result<HoldOutcome, GatewayError> {
        let path = format!("/internal/v1/accounts/{}/holds", req.account_id);
        self.post(&path, req, Some(&req.idempotency_key)).await
    }

    #[tracing::instrument(skip(self, req), fields(account_id = %req.account_id, hold_id = %req.hold_id))]
    async fn release_hold(&self, req: &HoldRequest) -> Result<HoldOutcome, GatewayError> {
        let path = format!(
            "/internal/v1/accounts/{}/holds/{}/release",
            req.account_id, req.hold_id
        );
        self.post(&path, req, Some(&req.idempotency_key)).await
    }

    #[tracing::instrument(skip(self, ids), fields(count = ids.len()))]
    async fn batch_get_account_summaries(
        &self,
        ids: &[AccountId],
    ) -> Result<Vec<AccountSummary>, GatewayError> {
        let body = BatchSummariesBody { account_ids: ids };
        let response: BatchSummariesResponse = self
            .post("/internal/v1/accounts/summaries:batchGet", &body, None)
            .await?;
        Ok(response.accounts)
    }
}
