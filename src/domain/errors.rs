//! Error taxonomy shared across every subsystem.
//!
//! Every public operation in `services`, `adapters::sqlite`, and `reliability`
//! returns `DomainResult<T>`. Callers distinguish failure categories by
//! matching on `DomainError` rather than string-sniffing messages.

use std::time::Duration;

use thiserror::Error;

/// The error categories of the control plane's failure taxonomy.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Missing entity by identifier.
    #[error("not found: {0}")]
    NotFound(String),

    /// Uniqueness violation on create.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Bad input: empty name, invalid rule operator, port out of range, etc.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Network / dial / transient-backend failure. Safe to retry.
    #[error("transient failure: {0}")]
    Transient(String),

    /// A circuit breaker rejected the call without invoking the wrapped fn.
    #[error("circuit '{name}' is open (opened at {opened_at_unix}s, retry after {retry_after:?})")]
    CircuitOpen {
        name: String,
        opened_at_unix: i64,
        retry_after: Duration,
    },

    /// The caller-supplied deadline elapsed.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The caller's cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,

    /// State corruption or unrecoverable backend error.
    #[error("fatal: {0}")]
    Fatal(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// True for categories the default retry predicate should retry.
    #[must_use]
    pub fn is_retryable_by_default(&self) -> bool {
        !matches!(self, DomainError::CircuitOpen { .. })
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DomainError::NotFound(err.to_string()),
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                DomainError::AlreadyExists(db_err.to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DomainError::Transient(err.to_string())
            }
            other => DomainError::Fatal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Validation(err.to_string())
    }
}

impl From<tonic::Status> for DomainError {
    fn from(status: tonic::Status) -> Self {
        use tonic::Code;
        match status.code() {
            Code::NotFound => DomainError::NotFound(status.message().to_string()),
            Code::AlreadyExists => DomainError::AlreadyExists(status.message().to_string()),
            Code::InvalidArgument => DomainError::Validation(status.message().to_string()),
            Code::DeadlineExceeded => DomainError::Timeout(Duration::from_secs(0)),
            Code::Cancelled => DomainError::Cancelled,
            Code::Unavailable | Code::ResourceExhausted | Code::Aborted => {
                DomainError::Transient(status.message().to_string())
            }
            _ => DomainError::Fatal(status.message().to_string()),
        }
    }
}
