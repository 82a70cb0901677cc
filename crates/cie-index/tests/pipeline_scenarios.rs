//! End-to-end pipeline scenarios over temporary repositories, using the mock
//! embedding provider.

use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use cie_config::{ProjectConfig, ProjectPaths, ProviderKind};
use cie_index::coordination::{IndexLock, LockState};
use cie_index::{run_index, IndexOptions, IndexOutcome, IndexReport};
use cie_store::Store;

const DIM: usize = 8;

struct TestProject {
    repo: TempDir,
    home: TempDir,
}

impl TestProject {
    fn new() -> Self {
        Self {
            repo: TempDir::new().unwrap(),
            home: TempDir::new().unwrap(),
        }
    }

    fn config(&self) -> ProjectConfig {
        let mut config = ProjectConfig::new("demo");
        config.embedding.provider = ProviderKind::Mock;
        config.embedding.dimensions = DIM;
        config
    }

    fn paths(&self) -> ProjectPaths {
        ProjectPaths::with_home(self.repo.path(), self.home.path().join(".cie"), "demo")
    }

    fn write(&self, rel: &str, content: &str) {
        let path = self.repo.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    fn remove(&self, rel: &str) {
        std::fs::remove_file(self.repo.path().join(rel)).unwrap();
    }

    async fn index(&self) -> IndexReport {
        self.index_with(IndexOptions::default())
            .await
            .pop()
            .expect("at least one run")
    }

    async fn index_with(&self, options: IndexOptions) -> Vec<IndexReport> {
        let cancel = CancellationToken::new();
        match run_index(&self.config(), &self.paths(), options, &cancel)
            .await
            .unwrap()
        {
            IndexOutcome::Ran(reports) => reports,
            IndexOutcome::Queued { .. } => panic!("unexpected queue outcome"),
        }
    }

    fn open_store(&self) -> Store {
        Store::open(&self.paths().data_dir()).unwrap()
    }

    fn write_go_pair(&self) {
        self.write(
            "a.go",
            "package main\n\nfunc Foo() {\n\tBar()\n}\n",
        );
        self.write("b.go", "package main\n\nfunc Bar() {\n}\n");
    }
}

/// No calls edge may reference a function that is not stored.
fn assert_no_dangling_edges(store: &Store) {
    let dangling_callers = store
        .query_sync("?[id] := *calls{id, caller_id}, not *function{id: caller_id}")
        .unwrap();
    assert!(dangling_callers.rows.is_empty(), "dangling caller endpoints");
    let dangling_callees = store
        .query_sync("?[id] := *calls{id, callee_id}, not *function{id: callee_id}")
        .unwrap();
    assert!(dangling_callees.rows.is_empty(), "dangling callee endpoints");
    let dangling_defines = store
        .query_sync("?[id] := *defines{id, function_id}, not *function{id: function_id}")
        .unwrap();
    assert!(dangling_defines.rows.is_empty(), "dangling defines endpoints");
}

#[tokio::test]
async fn scenario_cold_full_index() {
    let t = TestProject::new();
    t.write_go_pair();

    let report = t.index().await;

    assert_eq!(report.files_discovered, 2);
    assert_eq!(report.files_indexed, 2);
    assert_eq!(report.functions, 2);
    assert_eq!(report.defines_edges, 2);
    assert_eq!(report.calls_edges, 1, "Foo -> Bar resolved across files");
    assert!(report.embedding_calls >= 1);
    assert!(!report.cancelled);
    assert!(report.parse_errors.is_empty());

    let store = t.open_store();
    assert_eq!(store.count_rows("file").unwrap(), 2);
    assert_eq!(store.count_rows("function").unwrap(), 2);
    assert_eq!(store.count_rows("function_code").unwrap(), 2);
    assert_eq!(store.count_rows("function_embedding").unwrap(), 2);
    assert_eq!(store.count_rows("defines").unwrap(), 2);
    assert_eq!(store.count_rows("calls").unwrap(), 1);
    assert_no_dangling_edges(&store);

    // HNSW membership equals function_embedding membership
    let hits = store.vector_search(&[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0], 10, 50);
    assert_eq!(hits.unwrap().len(), 2);
}

#[tokio::test]
async fn scenario_incremental_no_change() {
    let t = TestProject::new();
    t.write_go_pair();
    t.index().await;

    let report = t.index().await;

    assert_eq!(report.files_discovered, 2);
    assert_eq!(report.files_unchanged, 2);
    assert_eq!(report.files_indexed, 0);
    assert_eq!(report.embedding_calls, 0, "unchanged repo embeds nothing");
    assert_eq!(report.store_mutations, 0, "unchanged repo writes nothing");
}

#[tokio::test]
async fn scenario_modify_one_function() {
    let t = TestProject::new();
    t.write_go_pair();
    t.index().await;

    // Body-only edit to Foo; Bar untouched.
    t.write(
        "a.go",
        "package main\n\nfunc Foo() {\n\tBar()\n\t_ = 1\n}\n",
    );
    let report = t.index().await;

    assert_eq!(report.files_indexed, 1);
    assert_eq!(report.files_unchanged, 1);
    assert_eq!(report.embedding_calls, 1, "only Foo re-embeds");

    let store = t.open_store();
    assert_eq!(store.count_rows("function").unwrap(), 2);
    assert_eq!(store.count_rows("function_embedding").unwrap(), 2);
    assert_eq!(store.count_rows("calls").unwrap(), 1);
    assert_no_dangling_edges(&store);
}

#[tokio::test]
async fn scenario_delete_file() {
    let t = TestProject::new();
    t.write_go_pair();
    t.index().await;

    t.remove("b.go");
    let report = t.index().await;

    assert_eq!(report.files_removed, 1);
    assert!(report.tombstones > 0);

    let store = t.open_store();
    assert_eq!(store.count_rows("file").unwrap(), 1);
    assert_eq!(store.count_rows("function").unwrap(), 1, "only Foo remains");
    assert_eq!(store.count_rows("function_embedding").unwrap(), 1);
    assert_eq!(
        store.count_rows("calls").unwrap(),
        0,
        "Foo -> Bar removed with its callee"
    );
    assert_no_dangling_edges(&store);
}

#[tokio::test]
async fn scenario_oversize_transition() {
    let t = TestProject::new();
    t.write_go_pair();

    let mut config = t.config();
    config.indexing.max_file_size = 256;
    let cancel = CancellationToken::new();
    let IndexOutcome::Ran(_) = run_index(&config, &t.paths(), IndexOptions::default(), &cancel)
        .await
        .unwrap()
    else {
        panic!("expected a run");
    };

    // Grow a.go past the cap.
    let filler: String = std::iter::repeat("// padding line\n").take(64).collect();
    t.write(
        "a.go",
        &format!("package main\n\nfunc Foo() {{\n\tBar()\n}}\n{filler}"),
    );
    let IndexOutcome::Ran(reports) =
        run_index(&config, &t.paths(), IndexOptions::default(), &cancel)
            .await
            .unwrap()
    else {
        panic!("expected a run");
    };
    let report = reports.last().unwrap();

    assert_eq!(report.skipped.get("oversize"), Some(&1));
    assert_eq!(report.files_removed, 1, "previously indexed a.go tombstoned");

    let store = t.open_store();
    assert_eq!(store.count_rows("file").unwrap(), 1);
    assert_eq!(store.count_rows("function").unwrap(), 1, "only Bar remains");
    assert_eq!(store.count_rows("calls").unwrap(), 0);
    assert_no_dangling_edges(&store);
}

#[tokio::test]
async fn scenario_queued_commits_coalesce() {
    let t = TestProject::new();
    t.write_go_pair();
    let paths = t.paths();

    // "Process A" holds the lock.
    let lock = match IndexLock::try_acquire(&paths.lock_file()).unwrap() {
        LockState::Acquired(lock) => lock,
        LockState::Held(_) => panic!("fresh lock"),
    };

    // "Process B" queues two commits and exits successfully.
    let cancel = CancellationToken::new();
    for commit in ["C1", "C2"] {
        let outcome = run_index(
            &t.config(),
            &paths,
            IndexOptions {
                queue: true,
                until: Some(commit.to_string()),
                ..Default::default()
            },
            &cancel,
        )
        .await
        .unwrap();
        match outcome {
            IndexOutcome::Queued { commit: queued } => assert_eq!(queued, commit),
            IndexOutcome::Ran(_) => panic!("should have queued while locked"),
        }
    }

    drop(lock);

    // A finishes; the next invocation drains the queue and runs exactly once
    // more, for the newest commit.
    let reports = t.index_with(IndexOptions::default()).await;
    assert_eq!(reports.len(), 2, "initial run plus one coalesced queue run");
    assert_eq!(reports[1].indexed_commit.as_deref(), Some("C2"));

    // Queue is empty afterwards.
    let queue = cie_index::CommitQueue::new(paths.queue_file());
    assert!(queue.drain().unwrap().is_empty());
}

#[tokio::test]
async fn full_then_incremental_matches_single_full() {
    let t = TestProject::new();
    t.write_go_pair();

    t.index_with(IndexOptions {
        full: true,
        ..Default::default()
    })
    .await;
    let report = t.index().await;

    assert_eq!(report.store_mutations, 0);
    assert_eq!(report.embedding_calls, 0);

    let store = t.open_store();
    assert_eq!(store.count_rows("function").unwrap(), 2);
    assert_eq!(store.count_rows("calls").unwrap(), 1);
}

#[tokio::test]
async fn parse_failure_does_not_poison_the_run() {
    let t = TestProject::new();
    t.write_go_pair();
    // Invalid UTF-8 in a supported extension.
    std::fs::write(t.repo.path().join("bad.go"), [0xff, 0xfe, 0x00]).unwrap();

    let report = t.index().await;

    assert_eq!(report.parse_errors.len(), 1);
    assert_eq!(report.parse_errors[0].file, "bad.go");
    assert_eq!(report.functions, 2, "good files still indexed");
}

#[tokio::test]
async fn cancelled_run_reports_partial() {
    let t = TestProject::new();
    t.write_go_pair();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = run_index(&t.config(), &t.paths(), IndexOptions::default(), &cancel)
        .await
        .unwrap();

    let IndexOutcome::Ran(reports) = outcome else {
        panic!("expected a run");
    };
    assert_eq!(reports.len(), 1);
    assert!(reports[0].cancelled);
    assert_eq!(reports[0].store_mutations, 0);
}

#[tokio::test]
async fn lock_contention_without_queue_fails_fast() {
    let t = TestProject::new();
    t.write_go_pair();
    let paths = t.paths();

    let _lock = match IndexLock::try_acquire(&paths.lock_file()).unwrap() {
        LockState::Acquired(lock) => lock,
        LockState::Held(_) => panic!("fresh lock"),
    };

    let cancel = CancellationToken::new();
    let err = run_index(&t.config(), &paths, IndexOptions::default(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, cie_index::IndexError::LockHeld { .. }));

    // With a wait deadline it times out instead.
    let err = run_index(
        &t.config(),
        &paths,
        IndexOptions {
            wait: Some(Duration::from_millis(50)),
            ..Default::default()
        },
        &cancel,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, cie_index::IndexError::LockTimeout));
}
