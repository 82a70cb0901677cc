//! Pipeline error types.

use std::path::PathBuf;

use cie_core::error::{ErrorKind, ErrorReport, IntoReport};
use thiserror::Error;

/// Errors that abort an indexing run.
///
/// File-level problems (parse failures, embedding failures) are not errors at
/// this level; they are recorded in the report and the pipeline continues.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Configuration problem
    #[error(transparent)]
    Config(#[from] cie_config::ConfigError),

    /// Store failure
    #[error(transparent)]
    Store(#[from] cie_store::StoreError),

    /// Discovery setup failure
    #[error(transparent)]
    Discovery(#[from] cie_core::discovery::DiscoveryError),

    /// Provider construction failure
    #[error(transparent)]
    Embed(#[from] cie_embed::EmbedError),

    /// The index lock is held by another live process
    #[error("index lock held by pid {pid:?}")]
    LockHeld { pid: Option<u32> },

    /// The lock could not be acquired before the deadline
    #[error("timed out waiting for the index lock")]
    LockTimeout,

    /// Bad invocation
    #[error("invalid usage: {0}")]
    Usage(String),

    /// Checkpoint journal could not be parsed
    #[error("corrupt checkpoint at {path}: {reason}")]
    CheckpointCorrupt { path: PathBuf, reason: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A pipeline stage died unexpectedly
    #[error("internal pipeline failure: {0}")]
    Internal(String),
}

impl IndexError {
    /// Classify for exit-code mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            IndexError::Config(e) => e.kind(),
            IndexError::Store(e) => e.kind(),
            IndexError::Discovery(cie_core::discovery::DiscoveryError::RootNotFound(_)) => {
                ErrorKind::NotFound
            }
            IndexError::Discovery(_) => ErrorKind::Config,
            IndexError::Embed(e) => e.kind(),
            IndexError::LockHeld { .. } | IndexError::LockTimeout | IndexError::Usage(_) => {
                ErrorKind::Input
            }
            IndexError::CheckpointCorrupt { .. } => ErrorKind::Database,
            IndexError::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                ErrorKind::Permission
            }
            IndexError::Io(_) => ErrorKind::Database,
            IndexError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl IntoReport for IndexError {
    fn into_report(self) -> ErrorReport {
        match self {
            IndexError::Store(e) => e.into_report(),
            IndexError::Config(e) => e.into_report(),
            IndexError::LockHeld { pid } => ErrorReport::new(
                ErrorKind::Input,
                "another indexer is running",
                format!("the index lock is held by pid {pid:?}"),
            )
            .with_fix("wait for it to finish, or enqueue this run with `cie index --queue`"),
            other => {
                let kind = other.kind();
                ErrorReport::new(kind, "indexing failed", other.to_string())
            }
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, IndexError>;
