//! Runtime-swappable accounts gateway.
//!
//! Services hold the switch, so the real client can be installed (or
//! replaced) after they are built without restarting anything.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use rust_decimal::Decimal;

use ledger_types::ports::{
    AccountSummary, AccountsGateway, GatewayError, HoldOutcome, HoldRequest, ValidationOutcome,
};
use ledger_types::{AccountId, Currency};

use super::UnavailableAccountsGateway;

pub struct AccountsGatewaySwitch {
    current: RwLock<Arc<dyn AccountsGateway>>,
}

impl AccountsGatewaySwitch {
    /// Starts with [`UnavailableAccountsGateway`] installed.
    pub fn new() -> Self {
        Self::with(Arc::new(UnavailableAccountsGateway))
    }

    pub fn with(gateway: Arc<dyn AccountsGateway>) -> Self {
        Self {
            current: RwLock::new(gateway),
        }
    }

    /// Installs `gateway` for every subsequent call.
    pub fn swap(&self, gateway: Arc<dyn AccountsGateway>) {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = gateway;
        tracing::info!("accounts gateway swapped");
    }

    fn current(&self) -> Arc<dyn AccountsGateway> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Default for AccountsGatewaySwitch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountsGateway for AccountsGatewaySwitch {
    async fn validate_accounts_and_limits(
        &self,
        source: AccountId,
        destination: AccountId,
        currency: &Currency,
        amount: Decimal,
    ) -> Result<ValidationOutcome, GatewayError> {
        self.current()
            .validate_accounts_and_limits(source, destination, currency, amount)
            .await
    }

    async fn reserve_hold(&self, req: &HoldRequest) -> Result<HoldOutcome, GatewayError> {
        self.current().reserve_hold(req).await
    }

    async fn release_hold(&self, req: &HoldRequest) -> Result<HoldOutcome, GatewayError> {
        self.current().release_hold(req).await
    }

    async fn batch_get_account_summaries(
        &self,
        ids: &[AccountId],
    ) -> Result<Vec<AccountSummary>, GatewayError> {
        self.current().batch_get_account_summaries(ids).await
    }
}
