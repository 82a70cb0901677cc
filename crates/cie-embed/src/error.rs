//! Embedding error types.
//!
//! The transient/permanent split drives retry behavior: transient errors are
//! retried with backoff, permanent errors are recorded against the affected
//! entities and the pipeline moves on.

use cie_core::error::{ErrorKind, ErrorReport, IntoReport};
use thiserror::Error;

/// Errors that can occur while generating embeddings.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// Connection-level failure (refused, reset, DNS)
    #[error("provider connection failed: {0}")]
    Connection(String),

    /// Request timed out
    #[error("provider request timed out")]
    Timeout,

    /// Provider rate limited the request (HTTP 429)
    #[error("provider rate limited, retry after {retry_after:?} seconds")]
    RateLimited { retry_after: Option<u64> },

    /// Provider-side failure (HTTP 5xx)
    #[error("provider unavailable: {status} - {message}")]
    Unavailable { status: u16, message: String },

    /// Authentication failed (HTTP 401/403)
    #[error("provider authentication failed: {0}")]
    Auth(String),

    /// Model not found (HTTP 404)
    #[error("model not found: {0}")]
    InvalidModel(String),

    /// Any other client-side rejection (HTTP 4xx)
    #[error("provider rejected request: {status} - {message}")]
    Rejected { status: u16, message: String },

    /// The response body could not be interpreted
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    /// A returned vector does not match the declared dimensionality
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Provider misconfiguration (missing key, bad URL)
    #[error("provider configuration error: {0}")]
    Config(String),
}

impl EmbedError {
    /// Map an HTTP error status onto the taxonomy.
    pub fn from_http(status: u16, message: String, retry_after: Option<u64>) -> Self {
        match status {
            429 => EmbedError::RateLimited { retry_after },
            401 | 403 => EmbedError::Auth(message),
            404 => EmbedError::InvalidModel(message),
            s if s >= 500 => EmbedError::Unavailable { status, message },
            _ => EmbedError::Rejected { status, message },
        }
    }

    /// Whether retrying with backoff may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EmbedError::Connection(_)
                | EmbedError::Timeout
                | EmbedError::RateLimited { .. }
                | EmbedError::Unavailable { .. }
        )
    }

    /// Classify for exit-code mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EmbedError::Config(_) => ErrorKind::Config,
            _ => ErrorKind::Network,
        }
    }
}

impl IntoReport for EmbedError {
    fn into_report(self) -> ErrorReport {
        let kind = self.kind();
        let report = ErrorReport::new(kind, "embedding provider error", self.to_string());
        match kind {
            ErrorKind::Config => {
                report.with_fix("check the embedding section of .cie/project.yaml")
            }
            _ => report.with_fix("check that the provider endpoint is reachable"),
        }
    }
}

impl From<reqwest::Error> for EmbedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EmbedError::Timeout
        } else if err.is_connect() {
            EmbedError::Connection(err.to_string())
        } else if err.is_decode() {
            EmbedError::MalformedResponse(err.to_string())
        } else {
            EmbedError::Connection(err.to_string())
        }
    }
}

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(EmbedError::Timeout.is_transient());
        assert!(EmbedError::RateLimited { retry_after: None }.is_transient());
        assert!(EmbedError::Unavailable {
            status: 503,
            message: "down".into()
        }
        .is_transient());

        assert!(!EmbedError::Auth("bad key".into()).is_transient());
        assert!(!EmbedError::Rejected {
            status: 400,
            message: "bad input".into()
        }
        .is_transient());
        assert!(!EmbedError::DimensionMismatch {
            expected: 768,
            actual: 384
        }
        .is_transient());
    }
}
