use thiserror::Error;

use crate::report::RunReport;

/// Failure of a single request to a hosted model.
///
/// Variants are kept distinguishable so callers can decide between
/// retrying (transient) and giving up (permanent).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("authentication failed: {message}")]
    Auth { message: String },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("connection failed: {message}")]
    Connection { message: String },

    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("call cancelled before admission")]
    Cancelled,
}

impl ServiceError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Timeout { .. }
            | ServiceError::RateLimited { .. }
            | ServiceError::Connection { .. } => true,
            ServiceError::Http { status, .. } => *status >= 500,
            ServiceError::Auth { .. }
            | ServiceError::InvalidResponse { .. }
            | ServiceError::DimensionMismatch { .. }
            | ServiceError::Cancelled => false,
        }
    }

    /// Failures caused by the deployment setup rather than the item being processed.
    pub fn is_configuration(&self) -> bool {
        matches!(self, ServiceError::Auth { .. } | ServiceError::DimensionMismatch { .. })
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed document '{doc_id}': {reason}")]
    MalformedDocument { doc_id: String, reason: String },

    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    ExternalService {
        operation: String,
        attempts: u32,
        #[source]
        source: ServiceError,
    },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("child '{child_id}' references missing parent '{parent_id}'")]
    IndexConsistency { child_id: String, parent_id: String },

    #[error("strict mode aborted the run: {}", .0.headline())]
    StrictAbort(Box<RunReport>),

    #[error("run cancelled")]
    Cancelled,

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    pub fn malformed(doc_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MalformedDocument { doc_id: doc_id.into(), reason: reason.into() }
    }

    /// Promote service failures that stem from bad configuration
    /// (rejected credentials, wrong embedding dimension) to `Configuration`.
    pub fn escalate(self) -> Self {
        match self {
            Error::ExternalService { operation, source, .. } if source.is_configuration() => {
                Error::Configuration(format!("{operation}: {source}"))
            }
            other => other,
        }
    }

    /// Errors that end a run regardless of strict/lenient policy.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Configuration(_) | Error::StrictAbort(_) | Error::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
