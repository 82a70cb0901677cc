//! Entity and edge model with deterministic content fingerprints.
//!
//! Every entity ID is a SHA-256 digest over the tuple that defines the entity,
//! so identical source always produces identical IDs. Incremental change
//! detection and deduplication both fall out of this: an entity is "the same"
//! exactly when its ID is the same.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::language::SupportedLanguage;

/// Maximum stored function source size. Longer bodies are truncated at a
/// UTF-8 boundary and flagged.
pub const MAX_SOURCE_BYTES: usize = 64 * 1024;

// ============================================================================
// Fingerprints
// ============================================================================

/// SHA-256 over NUL-joined parts, hex-encoded.
fn digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([0u8]);
        }
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// SHA-256 of raw bytes, hex-encoded.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Stable file ID derived from the project-relative path.
pub fn file_id(rel_path: &str) -> String {
    digest(&["file", rel_path])
}

/// Function ID derived from its defining tuple.
pub fn function_id(file_id: &str, name: &str, start_line: usize, signature: &str) -> String {
    digest(&["fn", file_id, name, &start_line.to_string(), signature])
}

/// Type ID derived from its defining tuple.
pub fn type_id(file_id: &str, name: &str, start_line: usize, kind: &str) -> String {
    digest(&["ty", file_id, name, &start_line.to_string(), kind])
}

/// Import ID derived from (file, import path, line).
pub fn import_id(file_id: &str, import_path: &str, line: usize) -> String {
    digest(&["im", file_id, import_path, &line.to_string()])
}

/// Defines-edge ID.
pub fn defines_id(file_id: &str, function_id: &str) -> String {
    digest(&["def", file_id, function_id])
}

/// Calls-edge ID.
pub fn calls_id(caller_id: &str, callee_id: &str, line: usize) -> String {
    digest(&["call", caller_id, callee_id, &line.to_string()])
}

/// Truncate a string to at most `max` bytes at a UTF-8 boundary.
///
/// Returns the (possibly shortened) slice and whether truncation happened.
pub fn truncate_utf8(s: &str, max: usize) -> (&str, bool) {
    if s.len() <= max {
        return (s, false);
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    (&s[..end], true)
}

// ============================================================================
// Entities
// ============================================================================

/// Source span in 0-indexed lines and columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start_line: usize,
    pub end_line: usize,
    pub start_col: usize,
    pub end_col: usize,
}

/// A candidate file yielded by the discoverer.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Project-relative path with `/` separators
    pub path: String,
    /// Absolute path on disk
    pub abs_path: PathBuf,
    /// SHA-256 of the raw file bytes
    pub hash: String,
    /// Detected language
    pub language: SupportedLanguage,
    /// Size in bytes
    pub size: u64,
}

impl FileRecord {
    /// Stable file ID for this record.
    pub fn id(&self) -> String {
        file_id(&self.path)
    }
}

/// A function or method extracted from a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionEntity {
    pub id: String,
    pub name: String,
    /// First source line of the definition, whitespace-collapsed
    pub signature: String,
    pub file_path: String,
    pub span: Span,
    /// Stored source text (truncated to [`MAX_SOURCE_BYTES`])
    pub source: String,
    /// SHA-256 of the stored source text; embedding staleness key
    pub source_hash: String,
    /// Whether `source` was truncated
    pub truncated: bool,
}

/// Kind of a type-like entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Struct,
    Class,
    Interface,
    Enum,
    Trait,
    Union,
    TypeAlias,
}

impl TypeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeKind::Struct => "struct",
            TypeKind::Class => "class",
            TypeKind::Interface => "interface",
            TypeKind::Enum => "enum",
            TypeKind::Trait => "trait",
            TypeKind::Union => "union",
            TypeKind::TypeAlias => "type_alias",
        }
    }
}

impl std::fmt::Display for TypeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A type definition extracted from a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeEntity {
    pub id: String,
    pub name: String,
    pub kind: TypeKind,
    pub file_path: String,
    pub span: Span,
}

/// An import/use/include extracted from a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportEntity {
    pub id: String,
    pub file_path: String,
    pub import_path: String,
    pub alias: Option<String>,
    pub line: usize,
}

/// File-defines-function edge, derived from function entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefinesEdge {
    pub id: String,
    pub file_id: String,
    pub function_id: String,
}

/// Caller-calls-callee edge, resolved best-effort within a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEdge {
    pub id: String,
    pub caller_id: String,
    pub callee_id: String,
    pub line: usize,
}

/// A call site whose callee is not defined in the same file.
///
/// The writer resolves these against the whole store at the end of the run:
/// a bare name matching exactly one function repo-wide becomes a [`CallEdge`],
/// anything else is dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingCall {
    pub caller_id: String,
    pub callee_name: String,
    pub line: usize,
}

/// Everything extracted from one file in a single parse.
///
/// Entities appear in stable document order (by start byte).
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub file: FileRecord,
    pub file_id: String,
    pub functions: Vec<FunctionEntity>,
    pub types: Vec<TypeEntity>,
    pub imports: Vec<ImportEntity>,
    pub defines: Vec<DefinesEdge>,
    pub calls: Vec<CallEdge>,
    /// Call sites left for repo-wide resolution
    pub pending_calls: Vec<PendingCall>,
}

impl ParsedFile {
    /// All entity IDs this parse produced, in document order.
    ///
    /// This is the set the checkpoint records for removed-entity detection.
    pub fn entity_ids(&self) -> Vec<String> {
        let mut ids = Vec::with_capacity(
            self.functions.len() + self.types.len() + self.imports.len(),
        );
        ids.extend(self.functions.iter().map(|f| f.id.clone()));
        ids.extend(self.types.iter().map(|t| t.id.clone()));
        ids.extend(self.imports.iter().map(|i| i.id.clone()));
        ids
    }

    /// Total number of extracted entities.
    pub fn entity_count(&self) -> usize {
        self.functions.len() + self.types.len() + self.imports.len()
    }
}
