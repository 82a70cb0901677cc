//! Tree-sitter entity extraction.
//!
//! The [`EntityExtractor`] turns one source file into the language-agnostic
//! entity set: functions, types, imports, defines edges and best-effort call
//! edges. Partial trees from tree-sitter error recovery are accepted; whatever
//! the grammar still recognizes is extracted.

use std::collections::HashMap;

use tree_sitter::{Node, Parser, Query, QueryCursor, StreamingIterator};

use thiserror::Error;
use tracing::debug;

use crate::entity::{
    self, truncate_utf8, CallEdge, DefinesEdge, FileRecord, FunctionEntity, ImportEntity,
    ParsedFile, PendingCall, Span, TypeEntity, TypeKind, MAX_SOURCE_BYTES,
};
use crate::language::SupportedLanguage;
use crate::queries;

// ============================================================================
// Parser Errors
// ============================================================================

/// Errors that can occur while setting up or running extraction.
#[derive(Debug, Error)]
pub enum ParserError {
    /// Failed to set language on the tree-sitter parser
    #[error("failed to set language: {0}")]
    LanguageSet(String),

    /// tree-sitter returned no tree at all
    #[error("failed to parse source code")]
    ParseFailed,

    /// Failed to compile the embedded extraction query
    #[error("failed to compile query for {language}: {reason}")]
    QueryCompile {
        language: SupportedLanguage,
        reason: String,
    },
}

// ============================================================================
// Entity Extractor
// ============================================================================

/// Extracts entities and edges from source files of one language.
///
/// An extractor owns a parser and a compiled query; workers keep one per
/// language they encounter.
pub struct EntityExtractor {
    parser: Parser,
    query: Query,
    language: SupportedLanguage,
    max_source_bytes: usize,
}

/// Capture indexes resolved once per query.
struct CaptureIndexes {
    function_def: Option<u32>,
    function_name: Option<u32>,
    type_def: Option<u32>,
    type_name: Option<u32>,
    import_def: Option<u32>,
    import_path: Option<u32>,
    import_alias: Option<u32>,
    call: Option<u32>,
    call_callee: Option<u32>,
}

impl CaptureIndexes {
    fn resolve(query: &Query) -> Self {
        Self {
            function_def: query.capture_index_for_name("function.def"),
            function_name: query.capture_index_for_name("function.name"),
            type_def: query.capture_index_for_name("type.def"),
            type_name: query.capture_index_for_name("type.name"),
            import_def: query.capture_index_for_name("import.def"),
            import_path: query.capture_index_for_name("import.path"),
            import_alias: query.capture_index_for_name("import.alias"),
            call: query.capture_index_for_name("call"),
            call_callee: query.capture_index_for_name("call.callee"),
        }
    }
}

/// A call site before resolution.
struct RawCall {
    callee_text: String,
    line: usize,
    start_byte: usize,
}

impl EntityExtractor {
    /// Create an extractor for the given language.
    pub fn new(language: SupportedLanguage) -> Result<Self, ParserError> {
        let mut parser = Parser::new();
        let ts_language = language.tree_sitter_language();
        parser
            .set_language(&ts_language)
            .map_err(|e| ParserError::LanguageSet(e.to_string()))?;

        let query = Query::new(&ts_language, queries::get_query(language)).map_err(|e| {
            ParserError::QueryCompile {
                language,
                reason: format!("{e:?}"),
            }
        })?;

        Ok(Self {
            parser,
            query,
            language,
            max_source_bytes: MAX_SOURCE_BYTES,
        })
    }

    /// Override the stored-source truncation limit.
    pub fn with_max_source_bytes(mut self, max: usize) -> Self {
        self.max_source_bytes = max;
        self
    }

    /// Get the language this extractor is configured for.
    pub fn language(&self) -> SupportedLanguage {
        self.language
    }

    /// Extract all entities and edges from one file.
    pub fn extract(
        &mut self,
        file: &FileRecord,
        source: &str,
    ) -> Result<ParsedFile, ParserError> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or(ParserError::ParseFailed)?;
        if tree.root_node().has_error() {
            debug!(path = %file.path, "accepting partial tree with parse errors");
        }

        let source_bytes = source.as_bytes();
        let file_id = file.id();
        let idx = CaptureIndexes::resolve(&self.query);

        // Keyed by entity ID; duplicate matches (e.g. overlapping import
        // patterns) collapse onto one record, preferring the richer one.
        let mut functions: HashMap<String, (usize, FunctionEntity, usize)> = HashMap::new();
        let mut types: HashMap<String, (usize, TypeEntity)> = HashMap::new();
        let mut imports: HashMap<String, (usize, ImportEntity)> = HashMap::new();
        let mut raw_calls: Vec<RawCall> = Vec::new();

        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&self.query, tree.root_node(), source_bytes);
        while let Some(m) = matches.next() {
            let node_for = |want: Option<u32>| capture_node(m, want);

            if let (Some(def), Some(name)) = (node_for(idx.function_def), node_for(idx.function_name))
            {
                let name = node_text(name, source_bytes);
                let entity = self.build_function(&file_id, &file.path, def, &name, source);
                functions
                    .entry(entity.id.clone())
                    .or_insert((def.start_byte(), entity, def.end_byte()));
            } else if let (Some(def), Some(name)) = (node_for(idx.type_def), node_for(idx.type_name))
            {
                let name = node_text(name, source_bytes);
                let entity = build_type(&file_id, &file.path, def, &name);
                types
                    .entry(entity.id.clone())
                    .or_insert((def.start_byte(), entity));
            } else if let Some(def) = node_for(idx.import_def) {
                if let Some(path_node) = node_for(idx.import_path) {
                    let alias = node_for(idx.import_alias).map(|n| node_text(n, source_bytes));
                    let raw_path = node_text(path_node, source_bytes);
                    let entity = build_import(&file_id, &file.path, def, &raw_path, alias);
                    let start = def.start_byte();
                    imports
                        .entry(entity.id.clone())
                        .and_modify(|(_, existing)| {
                            if existing.alias.is_none() {
                                existing.alias = entity.alias.clone();
                            }
                        })
                        .or_insert((start, entity));
                }
            } else if let Some(call_node) = node_for(idx.call) {
                if let Some(callee) = node_for(idx.call_callee) {
                    raw_calls.push(RawCall {
                        callee_text: node_text(callee, source_bytes),
                        line: call_node.start_position().row,
                        start_byte: call_node.start_byte(),
                    });
                }
            }
        }

        // Stable document order by start byte.
        let mut functions: Vec<(usize, FunctionEntity, usize)> = functions.into_values().collect();
        functions.sort_by_key(|(start, _, _)| *start);
        let mut types: Vec<(usize, TypeEntity)> = types.into_values().collect();
        types.sort_by_key(|(start, _)| *start);
        let mut imports: Vec<(usize, ImportEntity)> = imports.into_values().collect();
        imports.sort_by_key(|(start, _)| *start);

        let (calls, pending_calls) = resolve_calls(&functions, &raw_calls);

        let defines = functions
            .iter()
            .map(|(_, f, _)| DefinesEdge {
                id: entity::defines_id(&file_id, &f.id),
                file_id: file_id.clone(),
                function_id: f.id.clone(),
            })
            .collect();

        Ok(ParsedFile {
            file: file.clone(),
            file_id,
            functions: functions.into_iter().map(|(_, f, _)| f).collect(),
            types: types.into_iter().map(|(_, t)| t).collect(),
            imports: imports.into_iter().map(|(_, i)| i).collect(),
            defines,
            calls,
            pending_calls,
        })
    }

    fn build_function(
        &self,
        file_id: &str,
        file_path: &str,
        def: Node<'_>,
        name: &str,
        source: &str,
    ) -> FunctionEntity {
        let span = span_of(def);
        let raw = def.utf8_text(source.as_bytes()).unwrap_or("");
        let signature = first_line_signature(raw);
        let (stored, truncated) = truncate_utf8(raw, self.max_source_bytes);

        FunctionEntity {
            id: entity::function_id(file_id, name, span.start_line, &signature),
            name: name.to_string(),
            signature,
            file_path: file_path.to_string(),
            span,
            source: stored.to_string(),
            source_hash: entity::content_hash(stored.as_bytes()),
            truncated,
        }
    }
}

// ============================================================================
// Entity Builders
// ============================================================================

/// First capture with the given index in a match.
fn capture_node<'t>(
    m: &tree_sitter::QueryMatch<'_, 't>,
    want: Option<u32>,
) -> Option<Node<'t>> {
    let want = want?;
    m.captures
        .iter()
        .find(|c| c.index == want)
        .map(|c| c.node)
}

fn node_text(node: Node<'_>, source: &[u8]) -> String {
    node.utf8_text(source).unwrap_or("").to_string()
}

fn span_of(node: Node<'_>) -> Span {
    Span {
        start_line: node.start_position().row,
        end_line: node.end_position().row,
        start_col: node.start_position().column,
        end_col: node.end_position().column,
    }
}

/// First source line of a definition, whitespace-collapsed.
///
/// Serves as the identity-bearing signature: stable under body edits,
/// changed when the declaration changes.
fn first_line_signature(source: &str) -> String {
    source
        .lines()
        .next()
        .unwrap_or("")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn build_type(file_id: &str, file_path: &str, def: Node<'_>, name: &str) -> TypeEntity {
    let span = span_of(def);
    let kind = classify_type(def);
    TypeEntity {
        id: entity::type_id(file_id, name, span.start_line, kind.as_str()),
        name: name.to_string(),
        kind,
        file_path: file_path.to_string(),
        span,
    }
}

/// Map a grammar node kind onto a [`TypeKind`].
fn classify_type(def: Node<'_>) -> TypeKind {
    match def.kind() {
        "class_definition" | "class_declaration" | "class_specifier"
        | "abstract_class_declaration" => TypeKind::Class,
        "struct_item" | "struct_specifier" | "struct_declaration" => TypeKind::Struct,
        "interface_declaration" => TypeKind::Interface,
        "enum_item" | "enum_specifier" | "enum_declaration" => TypeKind::Enum,
        "trait_item" => TypeKind::Trait,
        "union_item" | "union_specifier" => TypeKind::Union,
        "type_item" | "type_alias_declaration" => TypeKind::TypeAlias,
        // Go `type_spec`: look at the declared type expression
        "type_spec" => match def.child_by_field_name("type").map(|n| n.kind()) {
            Some("struct_type") => TypeKind::Struct,
            Some("interface_type") => TypeKind::Interface,
            _ => TypeKind::TypeAlias,
        },
        _ => TypeKind::Struct,
    }
}

fn build_import(
    file_id: &str,
    file_path: &str,
    def: Node<'_>,
    raw_path: &str,
    alias: Option<String>,
) -> ImportEntity {
    let import_path = raw_path
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '<' || c == '>')
        .to_string();
    let line = def.start_position().row;
    ImportEntity {
        id: entity::import_id(file_id, &import_path, line),
        file_path: file_path.to_string(),
        import_path,
        alias,
        line,
    }
}

// ============================================================================
// Call Resolution
// ============================================================================

/// Resolve call sites against same-file functions by bare callee name.
///
/// The callee text keeps method receivers (`r.Foo`); resolution uses the last
/// path segment. Outcomes per call site:
///
/// - exactly one same-file function with that name: a [`CallEdge`];
/// - more than one: dropped (deterministic drop-on-ambiguity);
/// - none: a [`PendingCall`] for repo-wide resolution by the writer.
///
/// Call sites outside any function have no caller and are dropped.
fn resolve_calls(
    functions: &[(usize, FunctionEntity, usize)],
    raw_calls: &[RawCall],
) -> (Vec<CallEdge>, Vec<PendingCall>) {
    // name -> unique function ID, None marks an ambiguous name
    let mut by_name: HashMap<&str, Option<&str>> = HashMap::new();
    for (_, f, _) in functions {
        by_name
            .entry(f.name.as_str())
            .and_modify(|slot| *slot = None)
            .or_insert(Some(f.id.as_str()));
    }

    let mut edges: HashMap<String, CallEdge> = HashMap::new();
    let mut pending: Vec<PendingCall> = Vec::new();
    for call in raw_calls {
        // Innermost function whose byte range contains the call site
        let caller = functions
            .iter()
            .filter(|(start, _, end)| *start <= call.start_byte && call.start_byte < *end)
            .min_by_key(|(start, _, end)| end - start);
        let Some((_, caller_fn, _)) = caller else {
            continue;
        };

        let bare = bare_callee_name(&call.callee_text);
        match by_name.get(bare) {
            Some(Some(callee_id)) => {
                let id = entity::calls_id(&caller_fn.id, callee_id, call.line);
                edges.entry(id.clone()).or_insert(CallEdge {
                    id,
                    caller_id: caller_fn.id.clone(),
                    callee_id: (*callee_id).to_string(),
                    line: call.line,
                });
            }
            // Ambiguous within the file: dropped
            Some(None) => {}
            // Not defined here: defer to repo-wide resolution
            None => pending.push(PendingCall {
                caller_id: caller_fn.id.clone(),
                callee_name: bare.to_string(),
                line: call.line,
            }),
        }
    }

    let mut edges: Vec<CallEdge> = edges.into_values().collect();
    edges.sort_by(|a, b| a.line.cmp(&b.line).then_with(|| a.id.cmp(&b.id)));
    (edges, pending)
}

/// Last path segment of a call-site expression (`pkg.Foo` -> `Foo`,
/// `self.bar` -> `bar`, `a::b::c` -> `c`).
fn bare_callee_name(callee: &str) -> &str {
    let mut name = callee;
    for sep in [".", "::", "->"] {
        if let Some(idx) = name.rfind(sep) {
            name = &name[idx + sep.len()..];
        }
    }
    name.trim()
}
