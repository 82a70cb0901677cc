//! Relation definitions and schema versioning.
//!
//! The relation set is fixed. `ensure_schema` creates whatever is missing and
//! refuses to run against a store created by an incompatible binary; there is
//! no destructive migration path, the remedy is `cie reset`.

/// Current schema version, persisted under `meta/schema_version`.
pub const SCHEMA_VERSION: i64 = 1;

/// Name of the HNSW index over `function_embedding.embedding`.
pub const EMBEDDING_INDEX: &str = "embedding_idx";

/// Meta keys.
pub mod meta_keys {
    pub const SCHEMA_VERSION: &str = "schema_version";
    pub const EMBEDDING_DIM: &str = "embedding_dim";
    pub const PROVIDER: &str = "provider";
}

/// A stored relation: name, creation script, key column used for counting.
pub struct RelationDef {
    pub name: &'static str,
    pub create: &'static str,
    pub key_column: &'static str,
}

/// Relations with a fixed creation script.
pub const FIXED_RELATIONS: &[RelationDef] = &[
    RelationDef {
        name: "file",
        create: ":create file {id: String => path: String, hash: String, language: String, size: Int}",
        key_column: "id",
    },
    RelationDef {
        name: "function",
        create: ":create function {id: String => name: String, signature: String, file_path: String, \
                 start_line: Int, end_line: Int, start_col: Int, end_col: Int}",
        key_column: "id",
    },
    RelationDef {
        name: "function_code",
        create: ":create function_code {function_id: String => code_text: String}",
        key_column: "function_id",
    },
    RelationDef {
        name: "type",
        create: ":create type {id: String => name: String, kind: String, file_path: String, \
                 start_line: Int, end_line: Int, start_col: Int, end_col: Int}",
        key_column: "id",
    },
    RelationDef {
        name: "import",
        create: ":create import {id: String => file_path: String, import_path: String, \
                 alias: String?, start_line: Int}",
        key_column: "id",
    },
    RelationDef {
        name: "defines",
        create: ":create defines {id: String => file_id: String, function_id: String}",
        key_column: "id",
    },
    RelationDef {
        name: "calls",
        create: ":create calls {id: String => caller_id: String, callee_id: String}",
        key_column: "id",
    },
    RelationDef {
        name: "meta",
        create: ":create meta {key: String => value: String}",
        key_column: "key",
    },
];

/// Creation script for `function_embedding`, parameterized by dimensionality.
pub fn function_embedding_create(dim: usize) -> String {
    format!(":create function_embedding {{function_id: String => embedding: <F32; {dim}>}}")
}

/// Creation script for the HNSW index.
pub fn embedding_index_create(dim: usize) -> String {
    format!(
        "::hnsw create function_embedding:{EMBEDDING_INDEX} {{\
         dim: {dim}, m: 50, dtype: F32, fields: [embedding], \
         distance: Cosine, ef_construction: 200}}"
    )
}

/// Key column for any relation, including `function_embedding`.
pub fn key_column(relation: &str) -> &'static str {
    if relation == "function_embedding" {
        return "function_id";
    }
    FIXED_RELATIONS
        .iter()
        .find(|r| r.name == relation)
        .map(|r| r.key_column)
        .unwrap_or("id")
}
