//! Repository discovery.
//!
//! Walks the repository root and yields candidate files with content hashes,
//! respecting `.gitignore`, a built-in exclusion list, user-provided globs and
//! a size cap. The walk streams: nothing is buffered beyond the file currently
//! being hashed, and a fresh walk always starts from scratch.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::entity::FileRecord;
use crate::language::SupportedLanguage;

/// Directories never worth walking into, regardless of gitignore state.
const DEFAULT_EXCLUDE_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    "target",
    "build",
    "dist",
    "vendor",
    "bin",
    "obj",
    ".idea",
    ".vscode",
    ".mypy_cache",
    ".pytest_cache",
    ".next",
    ".nuxt",
];

/// Default maximum file size in bytes (1 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

// ============================================================================
// Errors
// ============================================================================

/// Errors during discovery setup.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Repository root does not exist
    #[error("repository root does not exist: {0}")]
    RootNotFound(PathBuf),

    /// A user exclude glob failed to compile
    #[error("invalid exclude pattern '{pattern}': {reason}")]
    InvalidGlob { pattern: String, reason: String },
}

// ============================================================================
// Discovery
// ============================================================================

/// Why a file was skipped instead of yielded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// Larger than the configured size cap
    Oversize,
    /// No supported grammar for this file
    UnsupportedLanguage,
    /// The file could not be read
    Unreadable,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Oversize => "oversize",
            SkipReason::UnsupportedLanguage => "unsupported-language",
            SkipReason::Unreadable => "unreadable",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One discovery outcome: a candidate file or an accounted skip.
#[derive(Debug)]
pub enum Discovered {
    Source(FileRecord),
    Skipped { path: String, reason: SkipReason },
}

/// Configuration for a discovery walk.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Repository root
    pub root: PathBuf,
    /// User exclude globs, unioned with the built-in list
    pub exclude: Vec<String>,
    /// Maximum file size in bytes; larger files are skipped as `oversize`
    pub max_file_size: u64,
}

impl DiscoveryConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            exclude: Vec::new(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Streaming repository walker.
pub struct Discoverer {
    root: PathBuf,
    patterns: Vec<glob::Pattern>,
    max_file_size: u64,
}

impl Discoverer {
    /// Create a discoverer, compiling the user exclude globs.
    pub fn new(config: DiscoveryConfig) -> Result<Self, DiscoveryError> {
        let root = config
            .root
            .canonicalize()
            .map_err(|_| DiscoveryError::RootNotFound(config.root.clone()))?;

        let mut patterns = Vec::with_capacity(config.exclude.len());
        for pattern in &config.exclude {
            patterns.push(glob::Pattern::new(pattern).map_err(|e| {
                DiscoveryError::InvalidGlob {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                }
            })?);
        }

        Ok(Self {
            root,
            patterns,
            max_file_size: config.max_file_size,
        })
    }

    /// Walk the repository, yielding candidates and accounted skips.
    pub fn discover(&self) -> impl Iterator<Item = Discovered> + '_ {
        let walker = WalkBuilder::new(&self.root)
            .follow_links(false)
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .add_custom_ignore_filename(".cieignore")
            .filter_entry(|entry| {
                if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    return true;
                }
                let name = entry.file_name().to_string_lossy();
                !DEFAULT_EXCLUDE_DIRS.contains(&name.as_ref())
            })
            .build();

        walker.filter_map(move |entry| {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("error walking repository: {e}");
                    return None;
                }
            };
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                return None;
            }

            let abs_path = entry.path().to_path_buf();
            let rel_path = abs_path
                .strip_prefix(&self.root)
                .unwrap_or(&abs_path)
                .to_string_lossy()
                .replace('\\', "/");

            if self.is_excluded(&rel_path) {
                return None;
            }

            Some(self.inspect(abs_path, rel_path))
        })
    }

    /// Check a relative path against the user exclude globs.
    fn is_excluded(&self, rel_path: &str) -> bool {
        let file_name = Path::new(rel_path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.patterns
            .iter()
            .any(|p| p.matches(rel_path) || p.matches(&file_name))
    }

    /// Classify one file: size cap, language detection, content hash.
    fn inspect(&self, abs_path: PathBuf, rel_path: String) -> Discovered {
        let size = match std::fs::metadata(&abs_path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                debug!(path = %rel_path, "unreadable metadata: {e}");
                return Discovered::Skipped {
                    path: rel_path,
                    reason: SkipReason::Unreadable,
                };
            }
        };

        // Oversize files are never read
        if size > self.max_file_size {
            return Discovered::Skipped {
                path: rel_path,
                reason: SkipReason::Oversize,
            };
        }

        let language = match self.detect_language(&abs_path) {
            Some(lang) => lang,
            None => {
                return Discovered::Skipped {
                    path: rel_path,
                    reason: SkipReason::UnsupportedLanguage,
                };
            }
        };

        match hash_file(&abs_path) {
            Ok(hash) => Discovered::Source(FileRecord {
                path: rel_path,
                abs_path,
                hash,
                language,
                size,
            }),
            Err(e) => {
                debug!(path = %rel_path, "failed to hash: {e}");
                Discovered::Skipped {
                    path: rel_path,
                    reason: SkipReason::Unreadable,
                }
            }
        }
    }

    /// Extension first, shebang for extensionless scripts.
    fn detect_language(&self, path: &Path) -> Option<SupportedLanguage> {
        if let Some(lang) = SupportedLanguage::from_path(path) {
            return Some(lang);
        }
        if path.extension().is_some() {
            return None;
        }
        let file = File::open(path).ok()?;
        let mut first_line = String::new();
        BufReader::new(file.take(256))
            .read_line(&mut first_line)
            .ok()?;
        SupportedLanguage::from_shebang(first_line.trim_end())
    }
}

/// Streaming SHA-256 over file contents.
fn hash_file(path: &Path) -> std::io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn collect(discoverer: &Discoverer) -> (Vec<FileRecord>, HashMap<SkipReason, usize>) {
        let mut files = Vec::new();
        let mut skips = HashMap::new();
        for item in discoverer.discover() {
            match item {
                Discovered::Source(record) => files.push(record),
                Discovered::Skipped { reason, .. } => *skips.entry(reason).or_insert(0) += 1,
            }
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        (files, skips)
    }

    #[test]
    fn test_discovers_supported_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.go"), "package main\n").unwrap();
        fs::write(dir.path().join("b.rs"), "fn main() {}\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "hello\n").unwrap();

        let discoverer = Discoverer::new(DiscoveryConfig::new(dir.path())).unwrap();
        let (files, skips) = collect(&discoverer);

        assert_eq!(
            files.iter().map(|f| f.path.as_str()).collect::<Vec<_>>(),
            vec!["a.go", "b.rs"]
        );
        assert_eq!(skips.get(&SkipReason::UnsupportedLanguage), Some(&1));
        assert_eq!(files[0].language, SupportedLanguage::Go);
        assert_eq!(files[0].size, "package main\n".len() as u64);
    }

    #[test]
    fn test_oversize_boundary() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("at.py"), vec![b'#'; 100]).unwrap();
        fs::write(dir.path().join("over.py"), vec![b'#'; 101]).unwrap();

        let mut config = DiscoveryConfig::new(dir.path());
        config.max_file_size = 100;
        let discoverer = Discoverer::new(config).unwrap();
        let (files, skips) = collect(&discoverer);

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "at.py");
        assert_eq!(skips.get(&SkipReason::Oversize), Some(&1));
    }

    #[test]
    fn test_excluded_dirs_and_globs() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        fs::write(dir.path().join("node_modules/pkg/x.js"), "var a;\n").unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/keep.js"), "var a;\n").unwrap();
        fs::write(dir.path().join("src/skip_generated.js"), "var a;\n").unwrap();

        let mut config = DiscoveryConfig::new(dir.path());
        config.exclude = vec!["*_generated.js".to_string()];
        let discoverer = Discoverer::new(config).unwrap();
        let (files, _) = collect(&discoverer);

        assert_eq!(
            files.iter().map(|f| f.path.as_str()).collect::<Vec<_>>(),
            vec!["src/keep.js"]
        );
    }

    #[test]
    fn test_shebang_detection() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("tool"),
            "#!/usr/bin/env python3\nprint('x')\n",
        )
        .unwrap();

        let discoverer = Discoverer::new(DiscoveryConfig::new(dir.path())).unwrap();
        let (files, _) = collect(&discoverer);

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].language, SupportedLanguage::Python);
    }

    #[test]
    fn test_invalid_glob_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = DiscoveryConfig::new(dir.path());
        config.exclude = vec!["[".to_string()];
        assert!(matches!(
            Discoverer::new(config),
            Err(DiscoveryError::InvalidGlob { .. })
        ));
    }

    #[test]
    fn test_content_hash_is_sha256_of_bytes() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("h.py"), "x = 1\n").unwrap();

        let discoverer = Discoverer::new(DiscoveryConfig::new(dir.path())).unwrap();
        let (files, _) = collect(&discoverer);

        assert_eq!(
            files[0].hash,
            crate::entity::content_hash(b"x = 1\n")
        );
    }
}
