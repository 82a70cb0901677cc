//! Run metrics and the final report.
//!
//! Stages share one [`PipelineMetrics`] behind an `Arc` and bump atomic
//! counters as work flows through; the orchestrator folds it into an
//! [`IndexReport`] when the run ends.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

use cie_core::discovery::SkipReason;

/// A file that failed to parse; recorded, never fatal.
#[derive(Debug, Clone, Serialize)]
pub struct ParseFailure {
    pub file: String,
    pub reason: String,
}

/// Counters shared across pipeline stages.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    pub files_discovered: AtomicU64,
    pub files_unchanged: AtomicU64,
    pub files_indexed: AtomicU64,
    pub files_removed: AtomicU64,
    pub functions: AtomicU64,
    pub types: AtomicU64,
    pub imports: AtomicU64,
    pub defines_edges: AtomicU64,
    pub calls_edges: AtomicU64,
    pub truncated_functions: AtomicU64,
    pub embedding_calls: AtomicU64,
    pub embeddings_reused: AtomicU64,
    pub embedding_errors: AtomicU64,
    pub dimension_mismatches: AtomicU64,
    pub tombstones: AtomicU64,
    pub store_mutations: AtomicU64,
    pub batches_committed: AtomicU64,
    parse_failures: Mutex<Vec<ParseFailure>>,
    skips: Mutex<BTreeMap<String, u64>>,
    stage_durations: Mutex<BTreeMap<String, Duration>>,
}

impl PipelineMetrics {
    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn incr(&self, counter: &AtomicU64) {
        self.add(counter, 1);
    }

    pub fn record_parse_failure(&self, file: impl Into<String>, reason: impl Into<String>) {
        self.parse_failures
            .lock()
            .expect("metrics mutex poisoned")
            .push(ParseFailure {
                file: file.into(),
                reason: reason.into(),
            });
    }

    pub fn record_skip(&self, reason: SkipReason) {
        *self
            .skips
            .lock()
            .expect("metrics mutex poisoned")
            .entry(reason.as_str().to_string())
            .or_insert(0) += 1;
    }

    pub fn record_stage(&self, stage: &str, elapsed: Duration) {
        self.stage_durations
            .lock()
            .expect("metrics mutex poisoned")
            .insert(stage.to_string(), elapsed);
    }

    /// Fold into the final report.
    pub fn into_report(
        self,
        cancelled: bool,
        duration: Duration,
        dataset_dir: PathBuf,
        indexed_commit: Option<String>,
    ) -> IndexReport {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let parse_errors = self
            .parse_failures
            .lock()
            .expect("metrics mutex poisoned")
            .clone();
        let skipped = self.skips.lock().expect("metrics mutex poisoned").clone();
        let stage_durations_ms = self
            .stage_durations
            .lock()
            .expect("metrics mutex poisoned")
            .iter()
            .map(|(stage, d)| (stage.clone(), d.as_millis() as u64))
            .collect();

        IndexReport {
            files_discovered: load(&self.files_discovered),
            files_unchanged: load(&self.files_unchanged),
            files_indexed: load(&self.files_indexed),
            files_removed: load(&self.files_removed),
            parse_errors,
            functions: load(&self.functions),
            types: load(&self.types),
            imports: load(&self.imports),
            defines_edges: load(&self.defines_edges),
            calls_edges: load(&self.calls_edges),
            truncated_functions: load(&self.truncated_functions),
            embedding_calls: load(&self.embedding_calls),
            embeddings_reused: load(&self.embeddings_reused),
            embedding_errors: load(&self.embedding_errors),
            dimension_mismatches: load(&self.dimension_mismatches),
            tombstones: load(&self.tombstones),
            store_mutations: load(&self.store_mutations),
            batches_committed: load(&self.batches_committed),
            skipped,
            stage_durations_ms,
            duration_ms: duration.as_millis() as u64,
            cancelled,
            dataset_dir,
            indexed_commit,
        }
    }
}

/// Final report for one `index` run.
#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub files_discovered: u64,
    pub files_unchanged: u64,
    pub files_indexed: u64,
    pub files_removed: u64,
    pub parse_errors: Vec<ParseFailure>,
    pub functions: u64,
    pub types: u64,
    pub imports: u64,
    pub defines_edges: u64,
    pub calls_edges: u64,
    pub truncated_functions: u64,
    pub embedding_calls: u64,
    pub embeddings_reused: u64,
    pub embedding_errors: u64,
    pub dimension_mismatches: u64,
    pub tombstones: u64,
    pub store_mutations: u64,
    pub batches_committed: u64,
    /// Skip reason -> count
    pub skipped: BTreeMap<String, u64>,
    pub stage_durations_ms: BTreeMap<String, u64>,
    pub duration_ms: u64,
    pub cancelled: bool,
    /// Store data directory
    pub dataset_dir: PathBuf,
    /// Commit this run was scheduled for, when one was given
    pub indexed_commit: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_fold_into_report() {
        let metrics = PipelineMetrics::default();
        metrics.add(&metrics.files_discovered, 3);
        metrics.incr(&metrics.files_indexed);
        metrics.record_skip(SkipReason::Oversize);
        metrics.record_skip(SkipReason::Oversize);
        metrics.record_parse_failure("bad.py", "invalid utf-8");
        metrics.record_stage("discover", Duration::from_millis(12));

        let report = metrics.into_report(false, Duration::from_secs(1), PathBuf::from("/d"), None);
        assert_eq!(report.files_discovered, 3);
        assert_eq!(report.files_indexed, 1);
        assert_eq!(report.skipped["oversize"], 2);
        assert_eq!(report.parse_errors.len(), 1);
        assert_eq!(report.stage_durations_ms["discover"], 12);
        assert!(!report.cancelled);
    }
}
