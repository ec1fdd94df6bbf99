//! Accounts service adapters.

mod breaker;
mod http;
mod switch;
mod unavailable;

pub use breaker::{BreakerConfig, CircuitBreaker, CircuitState};
pub use http::{DEFAULT_TIMEOUT, HttpAccountsGateway};
pub use switch::AccountsGatewaySwitch;
pub use unavailable::UnavailableAccountsGateway;
