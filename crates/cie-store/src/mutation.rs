//! Transactional mutation batches.
//!
//! A [`MutationBatch`] collects row puts and removals across all relations and
//! compiles into a single multi-statement CozoScript, which the engine runs in
//! one transaction. Removing a function removes its code row and embedding row
//! in the same batch, so edges and index membership stay consistent at every
//! commit boundary.

use std::collections::BTreeMap;

use cozo::{DataValue, Vector};
use ndarray::Array1;

use cie_core::entity::{CallEdge, DefinesEdge, FileRecord, FunctionEntity, ImportEntity, TypeEntity};

/// Approximate fixed per-row overhead used for batch sizing.
const ROW_OVERHEAD: usize = 128;

/// A set of row puts and removals committed atomically.
#[derive(Debug, Default, Clone)]
pub struct MutationBatch {
    put_files: Vec<DataValue>,
    put_functions: Vec<DataValue>,
    put_function_code: Vec<DataValue>,
    put_embeddings: Vec<DataValue>,
    put_types: Vec<DataValue>,
    put_imports: Vec<DataValue>,
    put_defines: Vec<DataValue>,
    put_calls: Vec<DataValue>,

    rm_files: Vec<DataValue>,
    rm_functions: Vec<DataValue>,
    rm_function_code: Vec<DataValue>,
    rm_embeddings: Vec<DataValue>,
    rm_types: Vec<DataValue>,
    rm_imports: Vec<DataValue>,
    rm_defines: Vec<DataValue>,
    rm_calls: Vec<DataValue>,

    estimated_bytes: usize,
    mutation_count: usize,
}

fn str_value(s: &str) -> DataValue {
    DataValue::Str(s.into())
}

fn int_value(n: usize) -> DataValue {
    DataValue::from(n as i64)
}

impl MutationBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a file row.
    pub fn put_file(&mut self, file: &FileRecord) {
        self.put_files.push(DataValue::List(vec![
            str_value(&file.id()),
            str_value(&file.path),
            str_value(&file.hash),
            str_value(file.language.as_str()),
            DataValue::from(file.size as i64),
        ]));
        self.account(file.path.len() + file.hash.len());
    }

    /// Upsert a function row and its code row.
    pub fn put_function(&mut self, f: &FunctionEntity) {
        self.put_functions.push(DataValue::List(vec![
            str_value(&f.id),
            str_value(&f.name),
            str_value(&f.signature),
            str_value(&f.file_path),
            int_value(f.span.start_line),
            int_value(f.span.end_line),
            int_value(f.span.start_col),
            int_value(f.span.end_col),
        ]));
        self.put_function_code
            .push(DataValue::List(vec![str_value(&f.id), str_value(&f.source)]));
        self.account(f.signature.len() + f.source.len());
        // two rows
        self.mutation_count += 1;
        self.estimated_bytes += ROW_OVERHEAD;
    }

    /// Upsert an embedding row for a function.
    pub fn put_embedding(&mut self, function_id: &str, vector: Vec<f32>) {
        let bytes = vector.len() * 4;
        self.put_embeddings.push(DataValue::List(vec![
            str_value(function_id),
            DataValue::Vec(Vector::F32(Array1::from(vector))),
        ]));
        self.account(bytes);
    }

    /// Upsert a type row.
    pub fn put_type(&mut self, t: &TypeEntity) {
        self.put_types.push(DataValue::List(vec![
            str_value(&t.id),
            str_value(&t.name),
            str_value(t.kind.as_str()),
            str_value(&t.file_path),
            int_value(t.span.start_line),
            int_value(t.span.end_line),
            int_value(t.span.start_col),
            int_value(t.span.end_col),
        ]));
        self.account(t.name.len());
    }

    /// Upsert an import row.
    pub fn put_import(&mut self, i: &ImportEntity) {
        self.put_imports.push(DataValue::List(vec![
            str_value(&i.id),
            str_value(&i.file_path),
            str_value(&i.import_path),
            i.alias.as_deref().map(str_value).unwrap_or(DataValue::Null),
            int_value(i.line),
        ]));
        self.account(i.import_path.len());
    }

    /// Upsert a defines edge.
    pub fn put_defines(&mut self, e: &DefinesEdge) {
        self.put_defines.push(DataValue::List(vec![
            str_value(&e.id),
            str_value(&e.file_id),
            str_value(&e.function_id),
        ]));
        self.account(0);
    }

    /// Upsert a calls edge.
    pub fn put_calls(&mut self, e: &CallEdge) {
        self.put_calls.push(DataValue::List(vec![
            str_value(&e.id),
            str_value(&e.caller_id),
            str_value(&e.callee_id),
        ]));
        self.account(0);
    }

    /// Remove a file row.
    pub fn remove_file(&mut self, file_id: &str) {
        self.rm_files.push(DataValue::List(vec![str_value(file_id)]));
        self.account(0);
    }

    /// Remove a function with its code and embedding rows.
    pub fn remove_function(&mut self, function_id: &str) {
        let key = DataValue::List(vec![str_value(function_id)]);
        self.rm_functions.push(key.clone());
        self.rm_function_code.push(key.clone());
        self.rm_embeddings.push(key);
        self.mutation_count += 3;
        self.estimated_bytes += 3 * ROW_OVERHEAD;
    }

    /// Remove only the embedding row of a function.
    pub fn remove_embedding(&mut self, function_id: &str) {
        self.rm_embeddings
            .push(DataValue::List(vec![str_value(function_id)]));
        self.account(0);
    }

    /// Remove a type row.
    pub fn remove_type(&mut self, type_id: &str) {
        self.rm_types.push(DataValue::List(vec![str_value(type_id)]));
        self.account(0);
    }

    /// Remove an import row.
    pub fn remove_import(&mut self, import_id: &str) {
        self.rm_imports
            .push(DataValue::List(vec![str_value(import_id)]));
        self.account(0);
    }

    /// Remove a defines edge.
    pub fn remove_defines(&mut self, edge_id: &str) {
        self.rm_defines
            .push(DataValue::List(vec![str_value(edge_id)]));
        self.account(0);
    }

    /// Remove a calls edge.
    pub fn remove_calls(&mut self, edge_id: &str) {
        self.rm_calls.push(DataValue::List(vec![str_value(edge_id)]));
        self.account(0);
    }

    /// Fold another batch into this one.
    pub fn merge(&mut self, other: MutationBatch) {
        self.put_files.extend(other.put_files);
        self.put_functions.extend(other.put_functions);
        self.put_function_code.extend(other.put_function_code);
        self.put_embeddings.extend(other.put_embeddings);
        self.put_types.extend(other.put_types);
        self.put_imports.extend(other.put_imports);
        self.put_defines.extend(other.put_defines);
        self.put_calls.extend(other.put_calls);
        self.rm_files.extend(other.rm_files);
        self.rm_functions.extend(other.rm_functions);
        self.rm_function_code.extend(other.rm_function_code);
        self.rm_embeddings.extend(other.rm_embeddings);
        self.rm_types.extend(other.rm_types);
        self.rm_imports.extend(other.rm_imports);
        self.rm_defines.extend(other.rm_defines);
        self.rm_calls.extend(other.rm_calls);
        self.estimated_bytes += other.estimated_bytes;
        self.mutation_count += other.mutation_count;
    }

    pub fn is_empty(&self) -> bool {
        self.mutation_count == 0
    }

    /// Number of row mutations in this batch.
    pub fn mutation_count(&self) -> usize {
        self.mutation_count
    }

    /// Rough payload size used to trigger commits.
    pub fn estimated_bytes(&self) -> usize {
        self.estimated_bytes
    }

    fn account(&mut self, payload: usize) {
        self.mutation_count += 1;
        self.estimated_bytes += payload + ROW_OVERHEAD;
    }

    /// Compile into a single multi-statement script plus parameters.
    ///
    /// Removals run before puts so a key never transitions put -> removed
    /// within one transaction; callers keep the two key sets disjoint.
    pub(crate) fn to_script(&self) -> (String, BTreeMap<String, DataValue>) {
        let mut script = String::new();
        let mut params = BTreeMap::new();

        let mut section =
            |script: &mut String, name: &str, rows: &[DataValue], stmt: &str, cols: &str| {
                if rows.is_empty() {
                    return;
                }
                script.push_str(&format!("{{ ?[{cols}] <- ${name} {stmt} }}\n"));
                params.insert(name.to_string(), DataValue::List(rows.to_vec()));
            };

        // removals
        section(&mut script, "rm_calls", &self.rm_calls, ":rm calls {id}", "id");
        section(
            &mut script,
            "rm_defines",
            &self.rm_defines,
            ":rm defines {id}",
            "id",
        );
        section(
            &mut script,
            "rm_imports",
            &self.rm_imports,
            ":rm import {id}",
            "id",
        );
        section(&mut script, "rm_types", &self.rm_types, ":rm type {id}", "id");
        section(
            &mut script,
            "rm_embeddings",
            &self.rm_embeddings,
            ":rm function_embedding {function_id}",
            "function_id",
        );
        section(
            &mut script,
            "rm_function_code",
            &self.rm_function_code,
            ":rm function_code {function_id}",
            "function_id",
        );
        section(
            &mut script,
            "rm_functions",
            &self.rm_functions,
            ":rm function {id}",
            "id",
        );
        section(&mut script, "rm_files", &self.rm_files, ":rm file {id}", "id");

        // puts
        section(
            &mut script,
            "put_files",
            &self.put_files,
            ":put file {id => path, hash, language, size}",
            "id, path, hash, language, size",
        );
        section(
            &mut script,
            "put_functions",
            &self.put_functions,
            ":put function {id => name, signature, file_path, start_line, end_line, start_col, end_col}",
            "id, name, signature, file_path, start_line, end_line, start_col, end_col",
        );
        section(
            &mut script,
            "put_function_code",
            &self.put_function_code,
            ":put function_code {function_id => code_text}",
            "function_id, code_text",
        );
        section(
            &mut script,
            "put_embeddings",
            &self.put_embeddings,
            ":put function_embedding {function_id => embedding}",
            "function_id, embedding",
        );
        section(
            &mut script,
            "put_types",
            &self.put_types,
            ":put type {id => name, kind, file_path, start_line, end_line, start_col, end_col}",
            "id, name, kind, file_path, start_line, end_line, start_col, end_col",
        );
        section(
            &mut script,
            "put_imports",
            &self.put_imports,
            ":put import {id => file_path, import_path, alias, start_line}",
            "id, file_path, import_path, alias, start_line",
        );
        section(
            &mut script,
            "put_defines",
            &self.put_defines,
            ":put defines {id => file_id, function_id}",
            "id, file_id, function_id",
        );
        section(
            &mut script,
            "put_calls",
            &self.put_calls,
            ":put calls {id => caller_id, callee_id}",
            "id, caller_id, callee_id",
        );

        (script, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cie_core::entity::Span;
    use std::path::PathBuf;

    fn sample_function() -> FunctionEntity {
        FunctionEntity {
            id: "f1".into(),
            name: "foo".into(),
            signature: "fn foo()".into(),
            file_path: "src/a.rs".into(),
            span: Span::default(),
            source: "fn foo() {}".into(),
            source_hash: "h".into(),
            truncated: false,
        }
    }

    #[test]
    fn test_empty_batch() {
        let batch = MutationBatch::new();
        assert!(batch.is_empty());
        let (script, params) = batch.to_script();
        assert!(script.is_empty());
        assert!(params.is_empty());
    }

    #[test]
    fn test_put_function_adds_code_row() {
        let mut batch = MutationBatch::new();
        batch.put_function(&sample_function());

        let (script, params) = batch.to_script();
        assert!(script.contains(":put function {"));
        assert!(script.contains(":put function_code {"));
        assert!(params.contains_key("put_functions"));
        assert!(params.contains_key("put_function_code"));
        assert_eq!(batch.mutation_count(), 2);
    }

    #[test]
    fn test_remove_function_cascades() {
        let mut batch = MutationBatch::new();
        batch.remove_function("f1");

        let (script, _) = batch.to_script();
        assert!(script.contains(":rm function {"));
        assert!(script.contains(":rm function_code {"));
        assert!(script.contains(":rm function_embedding {"));
        assert_eq!(batch.mutation_count(), 3);
    }

    #[test]
    fn test_removals_precede_puts() {
        let mut batch = MutationBatch::new();
        batch.put_function(&sample_function());
        batch.remove_function("old");

        let (script, _) = batch.to_script();
        let rm_at = script.find(":rm function {").unwrap();
        let put_at = script.find(":put function {").unwrap();
        assert!(rm_at < put_at);
    }

    #[test]
    fn test_estimated_bytes_tracks_vectors() {
        let mut batch = MutationBatch::new();
        let before = batch.estimated_bytes();
        batch.put_embedding("f1", vec![0.0; 768]);
        assert!(batch.estimated_bytes() >= before + 768 * 4);
    }

    #[test]
    fn test_merge() {
        let mut a = MutationBatch::new();
        a.put_file(&FileRecord {
            path: "a.rs".into(),
            abs_path: PathBuf::from("a.rs"),
            hash: "h".into(),
            language: cie_core::SupportedLanguage::Rust,
            size: 1,
        });
        let mut b = MutationBatch::new();
        b.remove_calls("c1");

        let count = a.mutation_count() + b.mutation_count();
        a.merge(b);
        assert_eq!(a.mutation_count(), count);
    }
}
