//! Fingerprint filter.
//!
//! Classifies each parsed entity against the checkpoint snapshot taken at the
//! start of the run: unchanged functions bypass the embedder with their stored
//! vector reused, new or changed functions are queued for embedding, and
//! entities recorded for the file that the new parse no longer yields become
//! tombstones.

use std::collections::{BTreeMap, HashMap, HashSet};

use cie_core::entity::ParsedFile;

use crate::checkpoint::{Checkpoint, FileCheckpoint};

/// A function that could not be embedded; it is stored without a vector.
#[derive(Debug, Clone)]
pub struct EmbedFailure {
    pub function_id: String,
    pub reason: String,
    /// Whether the failure was a dimensionality mismatch
    pub dim_mismatch: bool,
}

/// One file's worth of classified work flowing to the writer.
#[derive(Debug)]
pub struct FileWork {
    pub parsed: ParsedFile,
    /// Indexes into `parsed.functions` that need a fresh embedding
    pub to_embed: Vec<usize>,
    /// Function ID -> carried-over source-hash for unchanged embeddings
    pub reused: BTreeMap<String, String>,
    /// Entities recorded for this file that the new parse no longer yields
    pub removed_functions: Vec<String>,
    pub removed_types: Vec<String>,
    pub removed_imports: Vec<String>,
    pub removed_edges: Vec<String>,
    /// Vectors produced by the embed stage, by function ID
    pub embedded: Vec<(String, Vec<f32>)>,
    /// Permanent embedding failures for this file
    pub embed_failures: Vec<EmbedFailure>,
}

impl FileWork {
    /// Whether the embed stage has anything to do for this file.
    pub fn needs_embedding(&self) -> bool {
        !self.to_embed.is_empty()
    }

    /// Checkpoint entry reflecting this file once its batch commits.
    pub fn to_checkpoint_entry(&self) -> FileCheckpoint {
        let embedded: HashMap<&str, &str> = self
            .embedded
            .iter()
            .filter_map(|(id, _)| {
                self.parsed
                    .functions
                    .iter()
                    .find(|f| &f.id == id)
                    .map(|f| (id.as_str(), f.source_hash.as_str()))
            })
            .collect();

        let mut functions = BTreeMap::new();
        for f in &self.parsed.functions {
            let hash = if let Some(h) = embedded.get(f.id.as_str()) {
                Some((*h).to_string())
            } else {
                self.reused.get(&f.id).cloned()
            };
            functions.insert(f.id.clone(), hash);
        }

        let mut edges: Vec<String> = self.parsed.defines.iter().map(|e| e.id.clone()).collect();
        edges.extend(self.parsed.calls.iter().map(|e| e.id.clone()));

        FileCheckpoint {
            content_hash: self.parsed.file.hash.clone(),
            functions,
            types: self.parsed.types.iter().map(|t| t.id.clone()).collect(),
            imports: self.parsed.imports.iter().map(|i| i.id.clone()).collect(),
            edges,
        }
    }
}

/// Classifier over the checkpoint snapshot taken at run start.
#[derive(Debug, Clone)]
pub struct FingerprintFilter {
    files: BTreeMap<String, FileCheckpoint>,
    /// Full mode ignores recorded content hashes entirely
    full: bool,
}

impl FingerprintFilter {
    pub fn new(checkpoint: &Checkpoint, full: bool) -> Self {
        Self {
            files: checkpoint.files.clone(),
            full,
        }
    }

    /// Whether a discovered file must be re-parsed.
    pub fn is_dirty(&self, path: &str, content_hash: &str) -> bool {
        if self.full {
            return true;
        }
        self.files
            .get(path)
            .map(|entry| entry.content_hash != content_hash)
            .unwrap_or(true)
    }

    /// Paths recorded in the checkpoint that discovery did not yield.
    pub fn removed_paths(&self, seen: &HashSet<String>) -> Vec<(String, FileCheckpoint)> {
        self.files
            .iter()
            .filter(|(path, _)| !seen.contains(*path))
            .map(|(path, entry)| (path.clone(), entry.clone()))
            .collect()
    }

    /// Classify a parse result into work for the embedder and writer.
    pub fn classify(&self, parsed: ParsedFile) -> FileWork {
        let prev = self.files.get(&parsed.file.path);

        let mut to_embed = Vec::new();
        let mut reused = BTreeMap::new();
        for (i, f) in parsed.functions.iter().enumerate() {
            match prev.and_then(|p| p.functions.get(&f.id)) {
                Some(Some(prev_hash)) if *prev_hash == f.source_hash => {
                    reused.insert(f.id.clone(), prev_hash.clone());
                }
                _ => to_embed.push(i),
            }
        }

        let new_functions: HashSet<&str> = parsed.functions.iter().map(|f| f.id.as_str()).collect();
        let new_types: HashSet<&str> = parsed.types.iter().map(|t| t.id.as_str()).collect();
        let new_imports: HashSet<&str> = parsed.imports.iter().map(|i| i.id.as_str()).collect();
        let new_edges: HashSet<&str> = parsed
            .defines
            .iter()
            .map(|e| e.id.as_str())
            .chain(parsed.calls.iter().map(|e| e.id.as_str()))
            .collect();

        let diff = |old: &[String], new: &HashSet<&str>| -> Vec<String> {
            old.iter()
                .filter(|id| !new.contains(id.as_str()))
                .cloned()
                .collect()
        };

        let (removed_functions, removed_types, removed_imports, removed_edges) = match prev {
            Some(p) => (
                p.functions
                    .keys()
                    .filter(|id| !new_functions.contains(id.as_str()))
                    .cloned()
                    .collect(),
                diff(&p.types, &new_types),
                diff(&p.imports, &new_imports),
                diff(&p.edges, &new_edges),
            ),
            None => (Vec::new(), Vec::new(), Vec::new(), Vec::new()),
        };

        FileWork {
            parsed,
            to_embed,
            reused,
            removed_functions,
            removed_types,
            removed_imports,
            removed_edges,
            embedded: Vec::new(),
            embed_failures: Vec::new(),
        }
    }
}
