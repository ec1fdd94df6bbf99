//! Currency codes and fixed-scale decimal amounts.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::DomainError;

/// Scale used for every persisted and published amount (NUMERIC(20,6)).
pub const AMOUNT_SCALE: u32 = 6;

/// ISO-4217 alphabetic currency code, always upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
#[schema(example = "USD")]
pub struct Currency(String);

impl Currency {
    /// Parses a three-letter code, upper-casing it first.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let code = raw.trim().to_ascii_uppercase();
        if code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase()) {
            Ok(Self(code))
        } else {
            Err(DomainError::InvalidCurrency(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Currency {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Currency::parse(&value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

impl std::str::FromStr for Currency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::parse(s)
    }
}

/// Renders an amount with exactly six fractional digits, e.g. `50.000000`.
pub fn format_amount(amount: Decimal) -> String {
    let mut fixed = amount.round_dp(AMOUNT_SCALE);
    fixed.rescale(AMOUNT_SCALE);
    fixed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_currency_is_uppercased() {
        let c = Currency::parse("usd").unwrap();
        assert_eq!(c.as_str(), "USD");
    }

    #[test]
    fn test_currency_rejects_bad_codes() {
        assert!(Currency::parse("US").is_err());
        assert!(Currency::parse("USDT").is_err());
        assert!(Currency::parse("U5D").is_err());
        assert!(Currency::parse("").is_err());
    }

    #[test]
    fn test_format_amount_fixed_scale() {
        assert_eq!(format_amount(Decimal::from_str("50").unwrap()), "50.000000");
        assert_eq!(format_amount(Decimal::from_str("0.1").unwrap()), "0.100000");
        assert_eq!(
            format_amount(Decimal::from_str("12.3456789").unwrap()),
            "12.345679"
        );
    }

    #[test]
    fn test_currency_serde_validates() {
        let ok: Currency = serde_json::from_str("\"eur\"").unwrap();
        assert_eq!(ok.as_str(), "EUR");
        assert!(serde_json::from_str::<Currency>("\"euro\"").is_err());
    }
}
