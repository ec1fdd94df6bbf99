//! Error types for the ledger service.

use rust_decimal::Decimal;

/// Domain-level errors (business rule violations).
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid currency: {0}")]
    InvalidCurrency(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Unbalanced journal: debit {debit} != credit {credit}")]
    Unbalanced { debit: Decimal, credit: Decimal },

    #[error("Invalid journal line: {0}")]
    InvalidLine(String),

    #[error("Unknown GL account: {0}")]
    UnknownGlAccount(String),

    #[error("Idempotency key {key} already used for {operation}")]
    IdempotencyKeyReused { key: String, operation: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Repository-level errors (data access failures).
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Entity not found")]
    NotFound,

    /// A unique constraint was violated.
    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Application-level errors (for HTTP responses).
///
/// Each variant is one caller-facing class with its own status code.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Malformed input, rejected before any side effect.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Well-formed request refused by a business rule.
    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// A collaborator is down or the circuit is open; safe to retry.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Messages of these classes are safe to show outside development.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            AppError::BadRequest(_)
                | AppError::Rejected(_)
                | AppError::NotFound(_)
                | AppError::Conflict(_)
        )
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::IdempotencyKeyReused { .. } => AppError::Conflict(err.to_string()),
            DomainError::Serialization(msg) => AppError::Internal(msg),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Domain(e) => e.into(),
            RepoError::NotFound => AppError::NotFound("Resource not found".into()),
            RepoError::Database(e) => AppError::Internal(e),
            RepoError::Transaction(e) => AppError::Internal(e),
            RepoError::Conflict(e) => AppError::Conflict(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_error_mapping() {
        assert!(matches!(
            AppError::from(RepoError::Conflict("dup".into())),
            AppError::Conflict(_)
        ));
        assert!(matches!(
            AppError::from(RepoError::Database("boom".into())),
            AppError::Internal(_)
        ));
        assert!(matches!(
            AppError::from(RepoError::Domain(DomainError::InvalidLine("x".into()))),
            AppError::BadRequest(_)
        ));
    }

    #[test]
    fn test_unbalanced_is_bad_request() {
        let err: AppError = DomainError::Unbalanced {
            debit: Decimal::ONE_HUNDRED,
            credit: Decimal::TEN,
        }
        .into();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(err.is_expected());
    }
}
