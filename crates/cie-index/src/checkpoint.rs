//! Checkpoint journal.
//!
//! A per-project JSON document recording, for every successfully indexed file,
//! its content hash, the entity and edge IDs it produced, and the embedding
//! source-hash of each function. Only the writer mutates it, and only after a
//! batch commits. The store is authoritative: entries that disagree with the
//! store on load are cleared, which marks those files dirty.

use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use cie_store::Store;

use crate::error::{IndexError, Result};

/// Per-file record of what the last successful index produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileCheckpoint {
    /// Content hash at last successful index
    pub content_hash: String,
    /// Function ID -> embedding source-hash (`None` when the function is
    /// stored without a vector)
    pub functions: BTreeMap<String, Option<String>>,
    /// Type entity IDs
    pub types: Vec<String>,
    /// Import entity IDs
    pub imports: Vec<String>,
    /// Defines and calls edge IDs
    pub edges: Vec<String>,
}

impl FileCheckpoint {
    /// All entity IDs (functions, types, imports) recorded for this file.
    pub fn entity_ids(&self) -> HashSet<String> {
        let mut ids: HashSet<String> = self.functions.keys().cloned().collect();
        ids.extend(self.types.iter().cloned());
        ids.extend(self.imports.iter().cloned());
        ids
    }
}

/// The whole journal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Store schema version this journal was written against
    pub schema_version: i64,
    /// Embedding provider tag at last index
    pub provider: String,
    /// Embedding dimensionality at last index
    pub dimensions: usize,
    /// Last indexed commit hash, if a run targeted one
    pub last_commit: Option<String>,
    /// Per-file records, keyed by project-relative path
    pub files: BTreeMap<String, FileCheckpoint>,
}

/// Journal with its on-disk location.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
    pub data: Checkpoint,
}

impl CheckpointStore {
    /// Load the journal, or start empty when absent.
    pub fn load(path: &Path) -> Result<Self> {
        let data = if path.is_file() {
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str(&raw).map_err(|e| IndexError::CheckpointCorrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        } else {
            Checkpoint::default()
        };

        Ok(Self {
            path: path.to_path_buf(),
            data,
        })
    }

    /// Persist atomically: write to a temp file in the same directory, then
    /// rename into place, so a crash never leaves a torn journal.
    pub fn save(&self) -> Result<()> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;

        let raw = serde_json::to_string_pretty(&self.data).map_err(|e| {
            IndexError::CheckpointCorrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            }
        })?;

        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(raw.as_bytes())?;
        tmp.persist(&self.path).map_err(|e| IndexError::Io(e.error))?;
        Ok(())
    }

    /// Reconcile against the store: any file whose recorded entity set is not
    /// exactly what the store holds gets its entry cleared, so the next run
    /// treats it as dirty. The store always wins.
    pub fn reconcile(&mut self, store: &Store) -> Result<usize> {
        let mut cleared = Vec::new();
        for (path, entry) in &self.data.files {
            let stored = store.entity_ids_for_file(path)?;
            if stored != entry.entity_ids() {
                warn!(path = %path, "checkpoint disagrees with store, marking dirty");
                cleared.push(path.clone());
            }
        }
        for path in &cleared {
            self.data.files.remove(path);
        }
        if !cleared.is_empty() {
            info!("cleared {} stale checkpoint entries", cleared.len());
        }
        Ok(cleared.len())
    }

    /// Invalidate embeddings when the provider tag or dimensionality changed.
    ///
    /// Content hashes are cleared too: every file must be re-parsed so its
    /// functions flow back through the embedder.
    pub fn apply_provider(&mut self, provider: &str, dimensions: usize) {
        let changed = (!self.data.provider.is_empty() && self.data.provider != provider)
            || (self.data.dimensions != 0 && self.data.dimensions != dimensions);
        if changed {
            info!(
                old_provider = %self.data.provider,
                new_provider = %provider,
                "embedding provider changed, invalidating all files"
            );
            for entry in self.data.files.values_mut() {
                entry.content_hash.clear();
                for hash in entry.functions.values_mut() {
                    *hash = None;
                }
            }
        }
        self.data.provider = provider.to_string();
        self.data.dimensions = dimensions;
    }

    /// Content hash recorded for a file, if any.
    pub fn content_hash(&self, path: &str) -> Option<&str> {
        self.data
            .files
            .get(path)
            .map(|entry| entry.content_hash.as_str())
    }

    /// Record a file's committed state.
    pub fn upsert_file(&mut self, path: String, entry: FileCheckpoint) {
        debug!(path = %path, "checkpoint updated");
        self.data.files.insert(path, entry);
    }

    /// Forget a removed file.
    pub fn remove_file(&mut self, path: &str) {
        self.data.files.remove(path);
    }
}
