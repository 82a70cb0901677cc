//! Shared error taxonomy.
//!
//! Every fatal error in the workspace maps onto one of these kinds, which in
//! turn maps onto a stable process exit code. Crate-local error enums stay
//! `thiserror`-typed; this module only provides the common classification and
//! the user-facing what/why/fix presentation.

use thiserror::Error;

// ============================================================================
// Error Kinds
// ============================================================================

/// Broad failure categories with stable exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or invalid configuration
    Config,
    /// A referenced resource does not exist
    NotFound,
    /// Filesystem or permission failure
    Permission,
    /// Embedding provider I/O failure
    Network,
    /// Store open/query/write failure
    Database,
    /// Bad argument or usage
    Input,
    /// A bug in CIE itself
    Internal,
}

impl ErrorKind {
    /// Stable exit code for this kind.
    pub const fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Config => 1,
            ErrorKind::Database => 2,
            ErrorKind::Network => 3,
            ErrorKind::Input => 4,
            ErrorKind::Permission => 5,
            ErrorKind::NotFound => 6,
            ErrorKind::Internal => 10,
        }
    }

    /// Kind name as shown in diagnostics.
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Config => "config",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Permission => "permission",
            ErrorKind::Network => "network",
            ErrorKind::Database => "database",
            ErrorKind::Input => "input",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Error Report
// ============================================================================

/// A user-facing error report: what went wrong, why, and a suggested fix.
#[derive(Debug, Error)]
#[error("{what}: {why}")]
pub struct ErrorReport {
    /// Classification, determines the exit code
    pub kind: ErrorKind,
    /// What went wrong
    pub what: String,
    /// Why it went wrong
    pub why: String,
    /// Suggested fix, if one is known
    pub fix: Option<String>,
}

impl ErrorReport {
    /// Create a report without a suggested fix.
    pub fn new(kind: ErrorKind, what: impl Into<String>, why: impl Into<String>) -> Self {
        Self {
            kind,
            what: what.into(),
            why: why.into(),
            fix: None,
        }
    }

    /// Attach a suggested fix.
    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.fix = Some(fix.into());
        self
    }

    /// Exit code for this report.
    pub fn exit_code(&self) -> i32 {
        self.kind.exit_code()
    }

    /// Multi-line rendering for stderr.
    pub fn render(&self) -> String {
        let mut out = format!("error[{}]: {}\n  why: {}", self.kind, self.what, self.why);
        if let Some(fix) = &self.fix {
            out.push_str(&format!("\n  fix: {}", fix));
        }
        out
    }
}

/// Conversion into an [`ErrorReport`], implemented by crate error enums.
pub trait IntoReport {
    /// Classify and present this error for the user.
    fn into_report(self) -> ErrorReport;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_stable() {
        assert_eq!(ErrorKind::Config.exit_code(), 1);
        assert_eq!(ErrorKind::Database.exit_code(), 2);
        assert_eq!(ErrorKind::Network.exit_code(), 3);
        assert_eq!(ErrorKind::Input.exit_code(), 4);
        assert_eq!(ErrorKind::Permission.exit_code(), 5);
        assert_eq!(ErrorKind::NotFound.exit_code(), 6);
        assert_eq!(ErrorKind::Internal.exit_code(), 10);
    }

    #[test]
    fn test_report_render() {
        let report = ErrorReport::new(
            ErrorKind::Database,
            "failed to open store",
            "schema version 3 found, expected 1",
        )
        .with_fix("run `cie reset` to rebuild the index");

        let rendered = report.render();
        assert!(rendered.contains("error[database]"));
        assert!(rendered.contains("schema version 3"));
        assert!(rendered.contains("cie reset"));
    }
}
