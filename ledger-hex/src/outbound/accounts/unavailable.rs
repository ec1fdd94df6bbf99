use async_trait::async_trait;
use rust_decimal::Decimal;

use ledger_types::ports::{
    AccountSummary, AccountsGateway, GatewayError, HoldOutcome, HoldRequest, ValidationOutcome,
};
use ledger_types::{AccountId, Currency};

const REASON: &str = "accounts service not configured";

/// Placeholder used until a real client is installed. Every call fails
/// with [`GatewayError::Unavailable`].
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableAccountsGateway;

#[async_trait]
impl AccountsGateway for UnavailableAccountsGateway {
    async fn validate_accounts_and_limits(
        &self,
        _source: AccountId,
        _destination: AccountId,
        _currency: &Currency,
        _amount: Decimal,
    ) -> Result<ValidationOutcome, GatewayError> {
        Err(GatewayError::Unavailable(REASON.to_string()))
    }

    async fn reserve_hold(&self, _req: &HoldRequest) -> Result<HoldOutcome, GatewayError> {
        Err(GatewayError::Unavailable(REASON.to_string()))
    }

    async fn release_hold(&self, _req: &HoldRequest) -> Result<HoldOutcome, GatewayError> {
        Err(GatewayError::Unavailable(REASON.to_string()))
    }

    async fn batch_get_account_summaries(
        &self,
        _ids: &[AccountId],
    ) -> Result<Vec<AccountSummary>, GatewayError> {
        Err(GatewayError::Unavailable(REASON.to_string()))
    }
}
