//! Core entity model and extraction for the Code Intelligence Engine.
//!
//! This crate owns everything that turns a source repository into
//! language-agnostic entities and edges:
//!
//! - [`language`] - supported languages and detection (extension + shebang)
//! - [`entity`] - the entity/edge model and deterministic content fingerprints
//! - [`parser`] - tree-sitter extraction of functions, types, imports and calls
//! - [`discovery`] - gitignore-aware repository walking with size caps
//! - [`error`] - the shared error taxonomy and exit-code mapping

pub mod discovery;
pub mod entity;
pub mod error;
pub mod language;
pub mod parser;
mod queries;

pub use discovery::{Discovered, Discoverer, DiscoveryConfig, SkipReason};
pub use entity::{
    CallEdge, DefinesEdge, FileRecord, FunctionEntity, ImportEntity, ParsedFile, PendingCall,
    Span, TypeEntity, TypeKind, MAX_SOURCE_BYTES,
};
pub use error::{ErrorKind, ErrorReport};
pub use language::SupportedLanguage;
pub use parser::{EntityExtractor, ParserError};
