//! Embedded extraction queries, compiled into the binary.
//!
//! One query per language, sharing a fixed capture vocabulary:
//!
//! - `function.def` / `function.name` - callable definitions
//! - `type.def` / `type.name` - type-like definitions
//! - `import.def` / `import.path` / `import.alias` - imports
//! - `call` / `call.callee` - call sites
//!
//! Kind classification (struct vs interface vs enum, ...) happens in the
//! extractor from the captured node's grammar kind, which keeps these queries
//! small and uniform.

use crate::language::SupportedLanguage;

const PYTHON: &str = r#"
(function_definition
    name: (identifier) @function.name) @function.def

(class_definition
    name: (identifier) @type.name) @type.def

(import_statement
    name: (dotted_name) @import.path) @import.def
(import_statement
    name: (aliased_import
        name: (dotted_name) @import.path
        alias: (identifier) @import.alias)) @import.def
(import_from_statement
    module_name: (dotted_name) @import.path) @import.def

(call
    function: (identifier) @call.callee) @call
(call
    function: (attribute) @call.callee) @call
"#;

const JAVASCRIPT: &str = r#"
(function_declaration
    name: (identifier) @function.name) @function.def
(generator_function_declaration
    name: (identifier) @function.name) @function.def
(method_definition
    name: (property_identifier) @function.name) @function.def
(variable_declarator
    name: (identifier) @function.name
    value: (arrow_function)) @function.def

(class_declaration
    name: (identifier) @type.name) @type.def

(import_statement
    source: (string) @import.path) @import.def

(call_expression
    function: (identifier) @call.callee) @call
(call_expression
    function: (member_expression) @call.callee) @call
"#;

const TYPESCRIPT: &str = r#"
(function_declaration
    name: (identifier) @function.name) @function.def
(generator_function_declaration
    name: (identifier) @function.name) @function.def
(method_definition
    name: (property_identifier) @function.name) @function.def
(variable_declarator
    name: (identifier) @function.name
    value: (arrow_function)) @function.def

(class_declaration
    name: (type_identifier) @type.name) @type.def
(abstract_class_declaration
    name: (type_identifier) @type.name) @type.def
(interface_declaration
    name: (type_identifier) @type.name) @type.def
(type_alias_declaration
    name: (type_identifier) @type.name) @type.def
(enum_declaration
    name: (identifier) @type.name) @type.def

(import_statement
    source: (string) @import.path) @import.def

(call_expression
    function: (identifier) @call.callee) @call
(call_expression
    function: (member_expression) @call.callee) @call
"#;

const RUST: &str = r#"
(function_item
    name: (identifier) @function.name) @function.def

(struct_item
    name: (type_identifier) @type.name) @type.def
(enum_item
    name: (type_identifier) @type.name) @type.def
(trait_item
    name: (type_identifier) @type.name) @type.def
(union_item
    name: (type_identifier) @type.name) @type.def
(type_item
    name: (type_identifier) @type.name) @type.def

(use_declaration
    argument: (_) @import.path) @import.def

(call_expression
    function: (identifier) @call.callee) @call
(call_expression
    function: (scoped_identifier) @call.callee) @call
(call_expression
    function: (field_expression) @call.callee) @call
"#;

const GO: &str = r#"
(function_declaration
    name: (identifier) @function.name) @function.def
(method_declaration
    name: (field_identifier) @function.name) @function.def

(type_declaration
    (type_spec
        name: (type_identifier) @type.name) @type.def)

(import_spec
    name: (package_identifier)? @import.alias
    path: (interpreted_string_literal) @import.path) @import.def

(call_expression
    function: (identifier) @call.callee) @call
(call_expression
    function: (selector_expression) @call.callee) @call
"#;

const C: &str = r#"
(function_definition
    declarator: (function_declarator
        declarator: (identifier) @function.name)) @function.def

(struct_specifier
    name: (type_identifier) @type.name
    body: (field_declaration_list)) @type.def
(enum_specifier
    name: (type_identifier) @type.name
    body: (enumerator_list)) @type.def
(union_specifier
    name: (type_identifier) @type.name
    body: (field_declaration_list)) @type.def

(preproc_include
    path: (_) @import.path) @import.def

(call_expression
    function: (identifier) @call.callee) @call
"#;

const CPP: &str = r#"
(function_definition
    declarator: (function_declarator
        declarator: (identifier) @function.name)) @function.def
(function_definition
    declarator: (function_declarator
        declarator: (field_identifier) @function.name)) @function.def
(function_definition
    declarator: (function_declarator
        declarator: (qualified_identifier) @function.name)) @function.def

(struct_specifier
    name: (type_identifier) @type.name
    body: (field_declaration_list)) @type.def
(class_specifier
    name: (type_identifier) @type.name
    body: (field_declaration_list)) @type.def
(enum_specifier
    name: (type_identifier) @type.name
    body: (enumerator_list)) @type.def
(union_specifier
    name: (type_identifier) @type.name
    body: (field_declaration_list)) @type.def

(preproc_include
    path: (_) @import.path) @import.def

(call_expression
    function: (identifier) @call.callee) @call
(call_expression
    function: (field_expression) @call.callee) @call
"#;

const CSHARP: &str = r#"
(method_declaration
    name: (identifier) @function.name) @function.def
(local_function_statement
    name: (identifier) @function.name) @function.def
(constructor_declaration
    name: (identifier) @function.name) @function.def

(class_declaration
    name: (identifier) @type.name) @type.def
(interface_declaration
    name: (identifier) @type.name) @type.def
(struct_declaration
    name: (identifier) @type.name) @type.def
(enum_declaration
    name: (identifier) @type.name) @type.def

(using_directive
    (qualified_name) @import.path) @import.def
(using_directive
    (identifier) @import.path) @import.def

(invocation_expression
    function: (identifier) @call.callee) @call
(invocation_expression
    function: (member_access_expression) @call.callee) @call
"#;

/// Get the embedded extraction query source for a language.
pub fn get_query(language: SupportedLanguage) -> &'static str {
    match language {
        SupportedLanguage::Python => PYTHON,
        SupportedLanguage::JavaScript => JAVASCRIPT,
        SupportedLanguage::TypeScript | SupportedLanguage::Tsx => TYPESCRIPT,
        SupportedLanguage::Rust => RUST,
        SupportedLanguage::Go => GO,
        SupportedLanguage::C => C,
        SupportedLanguage::Cpp => CPP,
        SupportedLanguage::CSharp => CSHARP,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_sitter::Query;

    #[test]
    fn test_all_queries_compile() {
        let languages = [
            SupportedLanguage::Python,
            SupportedLanguage::JavaScript,
            SupportedLanguage::TypeScript,
            SupportedLanguage::Tsx,
            SupportedLanguage::Rust,
            SupportedLanguage::Go,
            SupportedLanguage::C,
            SupportedLanguage::Cpp,
            SupportedLanguage::CSharp,
        ];

        for lang in languages {
            let query = Query::new(&lang.tree_sitter_language(), get_query(lang));
            assert!(query.is_ok(), "query for {lang} failed: {:?}", query.err());
        }
    }
}
