//! Project configuration for CIE.
//!
//! A project is declared by `<repo>/.cie/project.yaml`:
//!
//! ```yaml
//! project_id: my-service
//! indexing:
//!   parser_mode: treesitter
//!   exclude:
//!     - "*_generated.go"
//!   max_file_size: 1048576
//!   batch_target: 67108864
//! embedding:
//!   provider: ollama
//!   base_url: http://localhost:11434
//!   model: nomic-embed-text
//!   dimensions: 768
//! ```
//!
//! All sections are optional except `project_id`. `indexing.batch_target` can
//! be overridden with the `CIE_BATCH_TARGET` environment variable.

mod error;
mod loader;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use error::{ConfigError, Result};
pub use loader::{load_project_config, save_project_config};

/// Default embedding dimensionality.
pub const DEFAULT_DIMENSIONS: usize = 768;

/// Default transactional batch target in bytes (64 MiB).
pub const DEFAULT_BATCH_TARGET: u64 = 64 * 1024 * 1024;

/// Environment variable overriding `indexing.batch_target`.
pub const BATCH_TARGET_ENV: &str = "CIE_BATCH_TARGET";

// ============================================================================
// Config Types
// ============================================================================

/// Parser backend selector. Only tree-sitter is defined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParserMode {
    #[default]
    Treesitter,
}

/// Embedding provider selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ollama,
    Openai,
    Nomic,
    #[default]
    Mock,
}

impl ProviderKind {
    /// Provider tag as recorded in the store and checkpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::Openai => "openai",
            ProviderKind::Nomic => "nomic",
            ProviderKind::Mock => "mock",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(ProviderKind::Ollama),
            "openai" => Ok(ProviderKind::Openai),
            "nomic" => Ok(ProviderKind::Nomic),
            "mock" => Ok(ProviderKind::Mock),
            other => Err(ConfigError::Invalid(format!(
                "unknown embedding provider '{other}' (expected ollama|openai|nomic|mock)"
            ))),
        }
    }
}

/// `indexing:` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    pub parser_mode: ParserMode,
    /// Glob patterns excluded from discovery, unioned with built-in defaults
    pub exclude: Vec<String>,
    /// Maximum file size in bytes
    pub max_file_size: u64,
    /// Transactional batch target in bytes
    pub batch_target: u64,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            parser_mode: ParserMode::default(),
            exclude: Vec::new(),
            max_file_size: cie_core::discovery::DEFAULT_MAX_FILE_SIZE,
            batch_target: DEFAULT_BATCH_TARGET,
        }
    }
}

/// `embedding:` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: ProviderKind,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    /// Declared dimensionality; every stored vector must match
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            base_url: None,
            model: None,
            api_key: None,
            dimensions: DEFAULT_DIMENSIONS,
        }
    }
}

/// The full project configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Stable project identifier, also the data subdirectory name
    pub project_id: String,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

impl ProjectConfig {
    /// Create a default config for the given project ID.
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            indexing: IndexingConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }

    /// Validate semantic constraints.
    pub fn validate(&self) -> Result<()> {
        if self.project_id.is_empty() {
            return Err(ConfigError::Invalid("project_id must not be empty".into()));
        }
        if self
            .project_id
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '.' && self.project_id.starts_with('.'))
        {
            return Err(ConfigError::Invalid(format!(
                "project_id '{}' is not usable as a directory name",
                self.project_id
            )));
        }
        if self.embedding.dimensions == 0 {
            return Err(ConfigError::Invalid(
                "embedding.dimensions must be positive".into(),
            ));
        }
        if self.indexing.batch_target == 0 {
            return Err(ConfigError::Invalid(
                "indexing.batch_target must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Batch target, honoring the `CIE_BATCH_TARGET` override.
    pub fn effective_batch_target(&self) -> u64 {
        std::env::var(BATCH_TARGET_ENV)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.indexing.batch_target)
    }
}

// ============================================================================
// On-Disk Layout
// ============================================================================

/// Resolved filesystem layout for one project.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    /// Repository root
    pub repo_root: PathBuf,
    /// `<home>/.cie`
    pub cie_home: PathBuf,
    /// Project identifier
    pub project_id: String,
}

impl ProjectPaths {
    /// Resolve paths for a repo root and project ID using the real home dir.
    pub fn resolve(repo_root: impl Into<PathBuf>, project_id: impl Into<String>) -> Result<Self> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(Self::with_home(repo_root, home.join(".cie"), project_id))
    }

    /// Resolve with an explicit CIE home directory. Used by tests.
    pub fn with_home(
        repo_root: impl Into<PathBuf>,
        cie_home: impl Into<PathBuf>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            repo_root: repo_root.into(),
            cie_home: cie_home.into(),
            project_id: project_id.into(),
        }
    }

    /// `<repo>/.cie/project.yaml`
    pub fn config_file(&self) -> PathBuf {
        self.repo_root.join(".cie").join("project.yaml")
    }

    /// `<repo>/.cie/checkpoints/`
    pub fn checkpoints_dir(&self) -> PathBuf {
        self.repo_root.join(".cie").join("checkpoints")
    }

    /// `<repo>/.cie/checkpoints/<project-id>.json`
    pub fn checkpoint_file(&self) -> PathBuf {
        self.checkpoints_dir()
            .join(format!("{}.json", self.project_id))
    }

    /// `<home>/.cie/data/<project-id>/`
    pub fn data_dir(&self) -> PathBuf {
        self.cie_home.join("data").join(&self.project_id)
    }

    /// `<home>/.cie/<project-id>/`
    pub fn coordination_dir(&self) -> PathBuf {
        self.cie_home.join(&self.project_id)
    }

    /// `<home>/.cie/<project-id>/index.lock`
    pub fn lock_file(&self) -> PathBuf {
        self.coordination_dir().join("index.lock")
    }

    /// `<home>/.cie/<project-id>/index.queue`
    pub fn queue_file(&self) -> PathBuf {
        self.coordination_dir().join("index.queue")
    }
}

/// Find the repository root containing `.cie/project.yaml`, walking upward
/// from `start`.
pub fn find_repo_root(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        if dir.join(".cie").join("project.yaml").is_file() {
            return Some(dir.to_path_buf());
        }
        current = dir.parent();
    }
    None
}
