//! Outbound adapters: accounts service client, event publishers, audit.

pub mod accounts;
pub mod audit;
pub mod publisher;
pub mod signing;

pub use accounts::{AccountsGatewaySwitch, HttpAccountsGateway, UnavailableAccountsGateway};
pub use audit::{LogAudit, PublisherAudit};
pub use publisher::{HttpEventPublisher, LogEventPublisher};
