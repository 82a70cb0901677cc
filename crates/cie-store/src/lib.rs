//! Embedded Datalog store with vector search.
//!
//! One [`Store`] wraps a CozoDB instance (RocksDB-backed in production,
//! in-memory for tests) hosting the fixed relation set plus an HNSW index over
//! `function_embedding.embedding`. The engine runs every script in a single
//! transaction, which is what makes [`Store::batch_write`] atomic: relational
//! rows and index entries move together or not at all.
//!
//! Concurrency: readers never block each other; writes serialize inside the
//! engine. Opening the same data directory twice is rejected with an exclusive
//! file lock at open time.

mod error;
mod mutation;
pub mod schema;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use cozo::{DataValue, DbInstance, ScriptMutability};
use fs2::FileExt;
use tracing::{debug, info};

pub use error::{QueryErrorKind, Result, StoreError};
pub use mutation::MutationBatch;
pub use schema::SCHEMA_VERSION;

/// Result of a read query: column headers plus rows.
#[derive(Debug, Clone)]
pub struct QueryRows {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<DataValue>>,
}

impl QueryRows {
    /// Collect the first column as strings, skipping non-string values.
    pub fn first_column_strings(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| row.first().and_then(|v| v.get_str()).map(String::from))
            .collect()
    }
}

/// One hit from a vector search.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub function_id: String,
    pub name: String,
    pub file_path: String,
    pub start_line: usize,
    pub distance: f64,
}

/// Process-local embedded store for one project.
#[derive(Clone)]
pub struct Store {
    db: DbInstance,
    dir: PathBuf,
    _lock: Option<Arc<std::fs::File>>,
}

impl Store {
    /// Open (creating if needed) the store in a data directory.
    ///
    /// Takes an exclusive advisory lock on `<dir>/cie.lock`; a second opener,
    /// in this or any other process, gets [`StoreError::Locked`].
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;

        let lock_path = dir.join("cie.lock");
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked(dir.to_path_buf()))?;

        let db = DbInstance::new("rocksdb", dir.join("db"), "").map_err(|e| StoreError::Open {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;

        info!("opened store at {:?}", dir);
        Ok(Self {
            db,
            dir: dir.to_path_buf(),
            _lock: Some(Arc::new(lock_file)),
        })
    }

    /// Open an in-memory store. Used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let db = DbInstance::new("mem", "", "").map_err(|e| StoreError::Open {
            path: PathBuf::from("<mem>"),
            reason: e.to_string(),
        })?;
        Ok(Self {
            db,
            dir: PathBuf::from("<mem>"),
            _lock: None,
        })
    }

    /// Data directory this store lives in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Run a read-only script with a deadline.
    ///
    /// The script runs on a blocking thread; if the deadline elapses the call
    /// returns `Query{kind: timeout}` and the result is discarded.
    pub async fn query(&self, script: &str, timeout: Duration) -> Result<QueryRows> {
        let db = self.db.clone();
        let script = script.to_string();
        let task = tokio::task::spawn_blocking(move || {
            run(&db, &script, BTreeMap::new(), ScriptMutability::Immutable)
        });

        match tokio::time::timeout(timeout, task).await {
            Ok(joined) => joined.map_err(|e| StoreError::Query {
                kind: QueryErrorKind::Runtime,
                message: format!("query task failed: {e}"),
            })?,
            Err(_) => Err(StoreError::Query {
                kind: QueryErrorKind::Timeout,
                message: format!("query exceeded deadline of {timeout:?}"),
            }),
        }
    }

    /// Run a read-only script synchronously, without a deadline.
    pub fn query_sync(&self, script: &str) -> Result<QueryRows> {
        run(&self.db, script, BTreeMap::new(), ScriptMutability::Immutable)
    }

    /// Run a read-only script with parameters.
    pub fn query_with_params(
        &self,
        script: &str,
        params: BTreeMap<String, DataValue>,
    ) -> Result<QueryRows> {
        run(&self.db, script, params, ScriptMutability::Immutable)
    }

    /// Run a write script; atomic per call.
    pub fn execute(&self, script: &str) -> Result<()> {
        run(&self.db, script, BTreeMap::new(), ScriptMutability::Mutable).map(|_| ())
    }

    // ========================================================================
    // Schema
    // ========================================================================

    /// Idempotently create the relation set and record the schema version.
    ///
    /// Fails with [`StoreError::SchemaMismatch`] when the store was written by
    /// an incompatible schema or with a different embedding dimensionality;
    /// there is no destructive migration.
    pub fn ensure_schema(&self, dim: usize) -> Result<()> {
        let existing = self.relation_names()?;

        if existing.contains("meta") {
            if let Some(found) = self.meta_get(schema::meta_keys::SCHEMA_VERSION)? {
                if found != SCHEMA_VERSION.to_string() {
                    return Err(StoreError::SchemaMismatch {
                        found: format!("schema_version {found}"),
                        expected: format!("schema_version {SCHEMA_VERSION}"),
                    });
                }
            }
            if let Some(found) = self.meta_get(schema::meta_keys::EMBEDDING_DIM)? {
                if found != dim.to_string() {
                    return Err(StoreError::SchemaMismatch {
                        found: format!("embedding_dim {found}"),
                        expected: format!("embedding_dim {dim}"),
                    });
                }
            }
        }

        for rel in schema::FIXED_RELATIONS {
            if !existing.contains(rel.name) {
                debug!("creating relation {}", rel.name);
                self.execute(rel.create)
                    .map_err(|e| StoreError::write(format!("creating {}: {e}", rel.name)))?;
            }
        }
        if !existing.contains("function_embedding") {
            debug!("creating relation function_embedding (dim={dim})");
            self.execute(&schema::function_embedding_create(dim))
                .map_err(|e| StoreError::write(format!("creating function_embedding: {e}")))?;
        }

        self.meta_put_if_changed(schema::meta_keys::SCHEMA_VERSION, &SCHEMA_VERSION.to_string())?;
        self.meta_put_if_changed(schema::meta_keys::EMBEDDING_DIM, &dim.to_string())?;
        Ok(())
    }

    /// Idempotently create the HNSW index over `function_embedding`.
    pub fn ensure_vector_index(&self, dim: usize) -> Result<()> {
        let indices = self.query_sync("::indices function_embedding")?;
        let already = indices
            .rows
            .iter()
            .flat_map(|row| row.iter())
            .filter_map(|v| v.get_str())
            .any(|name| name.contains(schema::EMBEDDING_INDEX));
        if already {
            return Ok(());
        }

        debug!("creating HNSW index (dim={dim})");
        self.execute(&schema::embedding_index_create(dim))
            .map_err(|e| StoreError::write(format!("creating vector index: {e}")))
    }

    /// Record the embedding provider tag.
    pub fn record_provider(&self, tag: &str) -> Result<()> {
        self.meta_put_if_changed(schema::meta_keys::PROVIDER, tag)
    }

    /// Write a meta value only when it differs from what is stored.
    fn meta_put_if_changed(&self, key: &str, value: &str) -> Result<()> {
        if self.meta_get(key)?.as_deref() == Some(value) {
            return Ok(());
        }
        self.meta_put(key, value)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Commit a mutation batch in one transaction.
    ///
    /// Partial application is impossible: a failure anywhere rolls back every
    /// row and every index entry of the batch.
    pub fn batch_write(&self, batch: &MutationBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let (script, params) = batch.to_script();
        run(&self.db, &script, params, ScriptMutability::Mutable)
            .map(|_| ())
            .map_err(|e| StoreError::write(e.to_string()))
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Nearest functions to a query vector.
    pub fn vector_search(&self, vector: &[f32], k: usize, ef: usize) -> Result<Vec<SearchHit>> {
        let script = format!(
            "?[function_id, name, file_path, start_line, dist] := \
             ~function_embedding:{idx}{{function_id | query: q, k: {k}, ef: {ef}, bind_distance: dist}}, \
             q = vec($query), \
             *function{{id: function_id, name, file_path, start_line}}\n\
             :order dist\n\
             :limit {k}",
            idx = schema::EMBEDDING_INDEX,
        );
        let query_param = DataValue::List(
            vector
                .iter()
                .map(|f| DataValue::from(*f as f64))
                .collect::<Vec<_>>(),
        );
        let mut params = BTreeMap::new();
        params.insert("query".to_string(), query_param);

        let rows = self.query_with_params(&script, params)?;
        rows.rows
            .iter()
            .map(|row| {
                let get_str = |i: usize| {
                    row.get(i)
                        .and_then(|v| v.get_str())
                        .map(String::from)
                        .ok_or_else(|| StoreError::RowShape(format!("column {i} not a string")))
                };
                Ok(SearchHit {
                    function_id: get_str(0)?,
                    name: get_str(1)?,
                    file_path: get_str(2)?,
                    start_line: row
                        .get(3)
                        .and_then(|v| v.get_int())
                        .unwrap_or_default() as usize,
                    distance: row.get(4).and_then(|v| v.get_float()).unwrap_or_default(),
                })
            })
            .collect()
    }

    /// Number of rows in a relation.
    pub fn count_rows(&self, relation: &str) -> Result<usize> {
        let key = schema::key_column(relation);
        let script = format!("?[count(k)] := *{relation}{{{key}: k}}");
        let rows = self.query_sync(&script)?;
        Ok(rows
            .rows
            .first()
            .and_then(|row| row.first())
            .and_then(|v| v.get_int())
            .unwrap_or(0) as usize)
    }

    /// All entity IDs (functions, types, imports) stored for a file path.
    pub fn entity_ids_for_file(&self, file_path: &str) -> Result<HashSet<String>> {
        let mut ids = HashSet::new();
        for relation in ["function", "type", "import"] {
            let script =
                format!("?[id] := *{relation}{{id, file_path}}, file_path == $path");
            let mut params = BTreeMap::new();
            params.insert("path".to_string(), DataValue::Str(file_path.into()));
            let rows = self.query_with_params(&script, params)?;
            ids.extend(rows.first_column_strings());
        }
        Ok(ids)
    }

    /// Function IDs that currently have an embedding row.
    pub fn embedded_function_ids(&self) -> Result<HashSet<String>> {
        let rows = self.query_sync("?[function_id] := *function_embedding{function_id}")?;
        Ok(rows.first_column_strings().into_iter().collect())
    }

    /// Map of function name to the IDs bearing it, over the whole store.
    ///
    /// Used for repo-wide call resolution: only names with exactly one ID
    /// resolve.
    pub fn function_name_index(&self) -> Result<HashMap<String, Vec<String>>> {
        let rows = self.query_sync("?[name, id] := *function{id, name}")?;
        let mut index: HashMap<String, Vec<String>> = HashMap::new();
        for row in &rows.rows {
            if let (Some(name), Some(id)) = (
                row.first().and_then(|v| v.get_str()),
                row.get(1).and_then(|v| v.get_str()),
            ) {
                index.entry(name.to_string()).or_default().push(id.to_string());
            }
        }
        Ok(index)
    }

    /// IDs of calls edges with an endpoint in the given function set.
    ///
    /// Removing a function must take these out in the same batch so no commit
    /// boundary exposes a dangling edge.
    pub fn calls_touching(&self, function_ids: &[String]) -> Result<Vec<String>> {
        if function_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = DataValue::List(
            function_ids
                .iter()
                .map(|id| DataValue::Str(id.as_str().into()))
                .collect(),
        );
        let mut params = BTreeMap::new();
        params.insert("ids".to_string(), ids);
        let rows = self.query_with_params(
            "?[id] := *calls{id, caller_id}, is_in(caller_id, $ids)\n\
             ?[id] := *calls{id, callee_id}, is_in(callee_id, $ids)",
            params,
        )?;
        Ok(rows.first_column_strings())
    }

    /// Read one meta value.
    pub fn meta_get(&self, key: &str) -> Result<Option<String>> {
        let mut params = BTreeMap::new();
        params.insert("key".to_string(), DataValue::Str(key.into()));
        let rows =
            self.query_with_params("?[value] := *meta{key, value}, key == $key", params)?;
        Ok(rows.first_column_strings().into_iter().next())
    }

    /// Write one meta value.
    pub fn meta_put(&self, key: &str, value: &str) -> Result<()> {
        let mut params = BTreeMap::new();
        params.insert("key".to_string(), DataValue::Str(key.into()));
        params.insert("value".to_string(), DataValue::Str(value.into()));
        run(
            &self.db,
            "?[key, value] <- [[$key, $value]] :put meta {key => value}",
            params,
            ScriptMutability::Mutable,
        )
        .map(|_| ())
        .map_err(|e| StoreError::write(e.to_string()))
    }

    /// Names of all stored relations.
    fn relation_names(&self) -> Result<HashSet<String>> {
        let rows = self.query_sync("::relations")?;
        Ok(rows.first_column_strings().into_iter().collect())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("dir", &self.dir).finish()
    }
}

/// Run one script and normalize errors.
fn run(
    db: &DbInstance,
    script: &str,
    params: BTreeMap<String, DataValue>,
    mutability: ScriptMutability,
) -> Result<QueryRows> {
    match db.run_script(script, params, mutability) {
        Ok(named) => Ok(QueryRows {
            headers: named.headers,
            rows: named.rows,
        }),
        Err(e) => {
            let message = e.to_string();
            let kind = if message.contains("pars") {
                QueryErrorKind::Parse
            } else {
                QueryErrorKind::Runtime
            };
            Err(StoreError::Query { kind, message })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cie_core::entity::{FunctionEntity, Span};

    const DIM: usize = 4;

    fn fresh_store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store.ensure_schema(DIM).unwrap();
        store.ensure_vector_index(DIM).unwrap();
        store
    }

    fn function(id: &str, name: &str) -> FunctionEntity {
        FunctionEntity {
            id: id.into(),
            name: name.into(),
            signature: format!("fn {name}()"),
            file_path: "src/lib.rs".into(),
            span: Span::default(),
            source: format!("fn {name}() {{}}"),
            source_hash: "h".into(),
            truncated: false,
        }
    }

    #[test]
    fn test_ensure_schema_is_idempotent() {
        let store = fresh_store();
        store.ensure_schema(DIM).unwrap();
        store.ensure_vector_index(DIM).unwrap();
        assert_eq!(store.count_rows("file").unwrap(), 0);
    }

    #[test]
    fn test_schema_version_mismatch() {
        let store = fresh_store();
        store
            .meta_put(schema::meta_keys::SCHEMA_VERSION, "99")
            .unwrap();
        assert!(matches!(
            store.ensure_schema(DIM),
            Err(StoreError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_dimension_mismatch_is_schema_mismatch() {
        let store = fresh_store();
        assert!(matches!(
            store.ensure_schema(DIM + 1),
            Err(StoreError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_batch_write_and_counts() {
        let store = fresh_store();

        let mut batch = MutationBatch::new();
        batch.put_function(&function("f1", "foo"));
        batch.put_function(&function("f2", "bar"));
        batch.put_embedding("f1", vec![1.0, 0.0, 0.0, 0.0]);
        store.batch_write(&batch).unwrap();

        assert_eq!(store.count_rows("function").unwrap(), 2);
        assert_eq!(store.count_rows("function_code").unwrap(), 2);
        assert_eq!(store.count_rows("function_embedding").unwrap(), 1);
    }

    #[test]
    fn test_batch_write_is_atomic() {
        let store = fresh_store();

        // Second row's vector has the wrong dimensionality; the whole batch
        // must roll back, including the valid first row.
        let mut batch = MutationBatch::new();
        batch.put_function(&function("f1", "foo"));
        batch.put_embedding("f1", vec![1.0, 0.0, 0.0, 0.0]);
        batch.put_embedding("f2", vec![1.0, 0.0]);
        assert!(store.batch_write(&batch).is_err());

        assert_eq!(store.count_rows("function").unwrap(), 0);
        assert_eq!(store.count_rows("function_embedding").unwrap(), 0);
    }

    #[test]
    fn test_vector_search_tracks_membership() {
        let store = fresh_store();

        let mut batch = MutationBatch::new();
        batch.put_function(&function("f1", "foo"));
        batch.put_function(&function("f2", "bar"));
        batch.put_embedding("f1", vec![1.0, 0.0, 0.0, 0.0]);
        batch.put_embedding("f2", vec![0.0, 1.0, 0.0, 0.0]);
        store.batch_write(&batch).unwrap();

        let hits = store.vector_search(&[1.0, 0.0, 0.0, 0.0], 10, 50).unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.function_id.as_str()).collect();
        assert_eq!(hits.len(), 2);
        assert_eq!(ids[0], "f1");

        // Removing a function removes its embedding and index entry in the
        // same transaction.
        let mut batch = MutationBatch::new();
        batch.remove_function("f1");
        store.batch_write(&batch).unwrap();

        let hits = store.vector_search(&[1.0, 0.0, 0.0, 0.0], 10, 50).unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.function_id.as_str()).collect();
        assert_eq!(ids, vec!["f2"]);
        assert_eq!(
            store.embedded_function_ids().unwrap(),
            ["f2".to_string()].into_iter().collect()
        );
    }

    #[test]
    fn test_entity_ids_for_file() {
        let store = fresh_store();
        let mut batch = MutationBatch::new();
        batch.put_function(&function("f1", "foo"));
        store.batch_write(&batch).unwrap();

        let ids = store.entity_ids_for_file("src/lib.rs").unwrap();
        assert!(ids.contains("f1"));
        assert!(store.entity_ids_for_file("other.rs").unwrap().is_empty());
    }

    #[test]
    fn test_function_name_index_and_calls_touching() {
        let store = fresh_store();
        let mut batch = MutationBatch::new();
        batch.put_function(&function("f1", "foo"));
        batch.put_function(&function("f2", "bar"));
        batch.put_calls(&cie_core::entity::CallEdge {
            id: "c1".into(),
            caller_id: "f1".into(),
            callee_id: "f2".into(),
            line: 3,
        });
        store.batch_write(&batch).unwrap();

        let index = store.function_name_index().unwrap();
        assert_eq!(index["foo"], vec!["f1".to_string()]);
        assert_eq!(index["bar"], vec!["f2".to_string()]);

        assert_eq!(
            store.calls_touching(&["f2".to_string()]).unwrap(),
            vec!["c1".to_string()]
        );
        assert_eq!(
            store.calls_touching(&["f1".to_string()]).unwrap(),
            vec!["c1".to_string()]
        );
        assert!(store.calls_touching(&["zz".to_string()]).unwrap().is_empty());
        assert!(store.calls_touching(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_query_parse_error_kind() {
        let store = fresh_store();
        let err = store.query_sync("this is not a script").unwrap_err();
        match err {
            StoreError::Query { kind, .. } => assert_eq!(kind, QueryErrorKind::Parse),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_query_with_deadline_returns_rows() {
        let store = fresh_store();
        let rows = store
            .query("?[x] <- [[1], [2]]", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(rows.rows.len(), 2);
    }

    #[test]
    fn test_rocksdb_open_is_exclusive() {
        let dir = tempfile::TempDir::new().unwrap();
        let first = Store::open(dir.path()).unwrap();
        assert!(matches!(
            Store::open(dir.path()),
            Err(StoreError::Locked(_))
        ));
        drop(first);
        // Lock released with the handle; reopening now succeeds.
        let _second = Store::open(dir.path()).unwrap();
    }

    #[test]
    fn test_meta_round_trip() {
        let store = fresh_store();
        assert_eq!(store.meta_get("provider").unwrap(), None);
        store.record_provider("mock").unwrap();
        assert_eq!(store.meta_get("provider").unwrap(), Some("mock".into()));
    }
}
