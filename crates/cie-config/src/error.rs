//! Configuration error types.

use std::path::PathBuf;

use cie_core::error::{ErrorKind, ErrorReport, IntoReport};
use thiserror::Error;

/// Errors that can occur loading or saving project configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Project config file not found
    #[error("project config not found at {0}")]
    Missing(PathBuf),

    /// YAML parse failure
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Semantic validation failure
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// No home directory could be determined
    #[error("could not determine the home directory")]
    NoHomeDir,

    /// I/O error
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Classify for exit-code mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::Missing(_) => ErrorKind::NotFound,
            ConfigError::Parse { .. } | ConfigError::Invalid(_) | ConfigError::NoHomeDir => {
                ErrorKind::Config
            }
            ConfigError::Io { source, .. } => {
                if source.kind() == std::io::ErrorKind::PermissionDenied {
                    ErrorKind::Permission
                } else {
                    ErrorKind::Config
                }
            }
        }
    }
}

impl IntoReport for ConfigError {
    fn into_report(self) -> ErrorReport {
        let kind = self.kind();
        let report = ErrorReport::new(kind, "configuration error", self.to_string());
        match kind {
            ErrorKind::NotFound => {
                report.with_fix("run `cie init` in the repository root to create .cie/project.yaml")
            }
            _ => report.with_fix("check .cie/project.yaml against the documented keys"),
        }
    }
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
