//! Store error types.

use std::path::PathBuf;

use cie_core::error::{ErrorKind, ErrorReport, IntoReport};
use thiserror::Error;

/// What went wrong inside a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// The script failed to parse
    Parse,
    /// The deadline elapsed before the query finished
    Timeout,
    /// The script failed during evaluation
    Runtime,
}

impl QueryErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryErrorKind::Parse => "parse",
            QueryErrorKind::Timeout => "timeout",
            QueryErrorKind::Runtime => "runtime",
        }
    }
}

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The data directory is already opened by another process
    #[error("store at {0} is locked by another process")]
    Locked(PathBuf),

    /// The embedded engine failed to open
    #[error("failed to open store at {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    /// Persisted schema disagrees with this binary
    #[error("schema mismatch: found {found}, expected {expected}")]
    SchemaMismatch { found: String, expected: String },

    /// A query failed
    #[error("query failed ({}): {message}", kind.as_str())]
    Query {
        kind: QueryErrorKind,
        message: String,
    },

    /// A write script or batch failed; the store keeps its pre-batch state
    #[error("write failed: {message}")]
    Write {
        message: String,
        /// Whether retrying the same write once is worthwhile
        transient: bool,
    },

    /// A returned row had an unexpected shape
    #[error("unexpected row shape: {0}")]
    RowShape(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Classify a write failure from the engine's error message.
    ///
    /// Engine-level hiccups (I/O stalls, busy locks) are worth one retry;
    /// script and validation failures are not.
    pub fn write(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        let transient = ["io error", "busy", "try again", "timed out", "temporarily"]
            .iter()
            .any(|marker| lower.contains(marker));
        StoreError::Write { message, transient }
    }

    /// Classify for exit-code mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                ErrorKind::Permission
            }
            _ => ErrorKind::Database,
        }
    }

    /// Whether retrying the same operation once is worthwhile.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Write { transient, .. } => *transient,
            StoreError::Query {
                kind: QueryErrorKind::Timeout,
                ..
            }
            | StoreError::Io(_) => true,
            _ => false,
        }
    }
}

impl IntoReport for StoreError {
    fn into_report(self) -> ErrorReport {
        let kind = self.kind();
        let report = ErrorReport::new(kind, "store error", self.to_string());
        match &self {
            StoreError::SchemaMismatch { .. } => {
                report.with_fix("run `cie reset` to drop the store and re-index from scratch")
            }
            StoreError::Locked(_) => {
                report.with_fix("wait for the other indexer to finish, or use `cie index --queue`")
            }
            _ => report,
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
