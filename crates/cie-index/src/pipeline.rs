//! Pipeline orchestrator.
//!
//! Wires discoverer, parser pool, fingerprint filter, embedder pool and
//! writer together with bounded channels, threads one cancellation token
//! through every stage, and folds the shared metrics into the final report.
//!
//! Stage lifecycle is driven by channel closure: when discovery finishes its
//! sender drops, the parser pool drains and drops its senders, and so on down
//! to the writer, which commits the tail batch when its channel closes. On
//! cancellation every stage stops at its next channel or I/O operation,
//! in-flight work is discarded, and the writer finalizes only the batch it has
//! already begun.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use cie_config::{ProjectConfig, ProjectPaths};
use cie_core::discovery::{Discovered, Discoverer, DiscoveryConfig};
use cie_core::entity::FileRecord;
use cie_core::parser::EntityExtractor;
use cie_core::SupportedLanguage;
use cie_embed::EmbeddingProvider;
use cie_store::Store;

use crate::checkpoint::CheckpointStore;
use crate::embed_stage::embed_file;
use crate::error::{IndexError, Result};
use crate::filter::{FileWork, FingerprintFilter};
use crate::report::{IndexReport, PipelineMetrics};
use crate::writer::{WriteItem, WriterBatcher, WriterConfig, DEFAULT_MAX_BATCH_ENTITIES};

/// Default parser pool size.
pub const DEFAULT_PARSER_WORKERS: usize = 4;

/// Default embedder pool size.
pub const DEFAULT_EMBED_WORKERS: usize = 8;

/// Default inter-stage channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 128;

/// Everything one pipeline run needs to know.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub repo_root: PathBuf,
    pub checkpoint_path: PathBuf,
    pub exclude: Vec<String>,
    pub max_file_size: u64,
    pub batch_target_bytes: u64,
    pub parser_workers: usize,
    pub embed_workers: usize,
    pub channel_capacity: usize,
    /// Ignore the checkpoint and re-parse everything
    pub full: bool,
    /// Commit hash this run is scheduled for
    pub until: Option<String>,
}

impl PipelineConfig {
    /// Derive a run config from the project configuration.
    pub fn from_project(
        config: &ProjectConfig,
        paths: &ProjectPaths,
        full: bool,
        until: Option<String>,
    ) -> Self {
        Self {
            repo_root: paths.repo_root.clone(),
            checkpoint_path: paths.checkpoint_file(),
            exclude: config.indexing.exclude.clone(),
            max_file_size: config.indexing.max_file_size,
            batch_target_bytes: config.effective_batch_target(),
            parser_workers: DEFAULT_PARSER_WORKERS,
            embed_workers: DEFAULT_EMBED_WORKERS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            full,
            until,
        }
    }
}

/// One wired-up ingestion pipeline.
pub struct IndexPipeline {
    config: PipelineConfig,
    store: Store,
    provider: Arc<dyn EmbeddingProvider>,
}

impl IndexPipeline {
    pub fn new(
        config: PipelineConfig,
        store: Store,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            config,
            store,
            provider,
        }
    }

    /// Run one full pass: discover, parse, filter, embed, write.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<IndexReport> {
        let start = Instant::now();
        let metrics = Arc::new(PipelineMetrics::default());
        let dim = self.provider.dimensions();
        let tag = self.provider.provider_tag().as_str();

        self.store.ensure_schema(dim)?;
        self.store.ensure_vector_index(dim)?;
        self.store.record_provider(tag)?;

        let mut checkpoint = CheckpointStore::load(&self.config.checkpoint_path)?;
        checkpoint.data.schema_version = cie_store::SCHEMA_VERSION;
        checkpoint.apply_provider(tag, dim);
        checkpoint.reconcile(&self.store)?;

        let filter = Arc::new(FingerprintFilter::new(&checkpoint.data, self.config.full));

        let mut discovery_config = DiscoveryConfig::new(&self.config.repo_root);
        discovery_config.exclude = self.config.exclude.clone();
        discovery_config.max_file_size = self.config.max_file_size;
        let discoverer = Discoverer::new(discovery_config)?;

        info!(
            root = %self.config.repo_root.display(),
            full = self.config.full,
            until = ?self.config.until,
            "starting index run"
        );

        let (parse_tx, parse_rx) = mpsc::channel::<FileRecord>(self.config.channel_capacity);
        let (embed_tx, embed_rx) = mpsc::channel::<FileWork>(self.config.channel_capacity);
        let (write_tx, write_rx) = mpsc::channel::<WriteItem>(self.config.channel_capacity);
        let parse_rx = Arc::new(Mutex::new(parse_rx));
        let embed_rx = Arc::new(Mutex::new(embed_rx));

        // Writer
        let writer = WriterBatcher::new(
            self.store.clone(),
            checkpoint,
            WriterConfig {
                batch_target_bytes: self.config.batch_target_bytes,
                max_batch_entities: DEFAULT_MAX_BATCH_ENTITIES,
                record_commit: self.config.until.clone(),
            },
            metrics.clone(),
        );
        let writer_handle = tokio::spawn(writer.run(write_rx, cancel.clone()));

        // Discoverer
        let discovery_handle = {
            let filter = filter.clone();
            let metrics = metrics.clone();
            let cancel = cancel.clone();
            let write_tx = write_tx.clone();
            tokio::task::spawn_blocking(move || {
                discovery_task(discoverer, filter, parse_tx, write_tx, metrics, cancel)
            })
        };

        // Parser pool
        let parser_handles: Vec<_> = (0..self.config.parser_workers.max(1))
            .map(|_| {
                let parse_rx = parse_rx.clone();
                let filter = filter.clone();
                let embed_tx = embed_tx.clone();
                let write_tx = write_tx.clone();
                let metrics = metrics.clone();
                let cancel = cancel.clone();
                tokio::task::spawn_blocking(move || {
                    parser_worker(parse_rx, filter, embed_tx, write_tx, metrics, cancel)
                })
            })
            .collect();

        // Embedder pool
        let embed_handles: Vec<_> = (0..self.config.embed_workers.max(1))
            .map(|_| {
                let embed_rx = embed_rx.clone();
                let provider = self.provider.clone();
                let write_tx = write_tx.clone();
                let metrics = metrics.clone();
                let cancel = cancel.clone();
                tokio::spawn(embed_worker(
                    embed_rx, provider, write_tx, metrics, cancel,
                ))
            })
            .collect();

        // The stages own the only remaining senders; dropping ours lets the
        // channels close in sequence as each stage drains.
        drop(embed_tx);
        drop(write_tx);

        discovery_handle
            .await
            .map_err(|e| IndexError::Internal(format!("discovery task panicked: {e}")))?;
        metrics.record_stage("discover", start.elapsed());

        for handle in parser_handles {
            handle
                .await
                .map_err(|e| IndexError::Internal(format!("parser worker panicked: {e}")))?;
        }
        metrics.record_stage("parse", start.elapsed());

        for handle in embed_handles {
            handle
                .await
                .map_err(|e| IndexError::Internal(format!("embed worker panicked: {e}")))?;
        }
        metrics.record_stage("embed", start.elapsed());

        writer_handle
            .await
            .map_err(|e| IndexError::Internal(format!("writer task panicked: {e}")))??;
        metrics.record_stage("write", start.elapsed());

        let cancelled = cancel.is_cancelled();
        let indexed_commit = if cancelled {
            None
        } else {
            self.config.until.clone()
        };

        let metrics = Arc::try_unwrap(metrics)
            .map_err(|_| IndexError::Internal("metrics still shared after join".into()))?;
        let report = metrics.into_report(
            cancelled,
            start.elapsed(),
            self.store.dir().to_path_buf(),
            indexed_commit,
        );

        info!(
            files = report.files_indexed,
            unchanged = report.files_unchanged,
            removed = report.files_removed,
            embedding_calls = report.embedding_calls,
            mutations = report.store_mutations,
            cancelled = report.cancelled,
            "index run finished"
        );
        Ok(report)
    }
}

// ============================================================================
// Stage Tasks
// ============================================================================

/// Walk the repository, forwarding dirty files to the parser pool and
/// checkpoint-only files to the writer as removals.
fn discovery_task(
    discoverer: Discoverer,
    filter: Arc<FingerprintFilter>,
    parse_tx: mpsc::Sender<FileRecord>,
    write_tx: mpsc::Sender<WriteItem>,
    metrics: Arc<PipelineMetrics>,
    cancel: CancellationToken,
) {
    let mut seen: HashSet<String> = HashSet::new();

    for item in discoverer.discover() {
        if cancel.is_cancelled() {
            return;
        }
        match item {
            Discovered::Source(record) => {
                metrics.incr(&metrics.files_discovered);
                seen.insert(record.path.clone());
                if filter.is_dirty(&record.path, &record.hash) {
                    if parse_tx.blocking_send(record).is_err() {
                        return;
                    }
                } else {
                    metrics.incr(&metrics.files_unchanged);
                }
            }
            Discovered::Skipped { path, reason } => {
                debug!(path = %path, reason = %reason, "skipped");
                metrics.record_skip(reason);
            }
        }
    }

    // Everything the checkpoint knows that discovery no longer yields
    // (deleted, newly oversize, newly excluded) becomes tombstones.
    for (path, entry) in filter.removed_paths(&seen) {
        if cancel.is_cancelled() {
            return;
        }
        if write_tx
            .blocking_send(WriteItem::RemoveFile { path, entry })
            .is_err()
        {
            return;
        }
    }
}

/// One parser-pool worker: read, extract, classify, forward.
fn parser_worker(
    parse_rx: Arc<Mutex<mpsc::Receiver<FileRecord>>>,
    filter: Arc<FingerprintFilter>,
    embed_tx: mpsc::Sender<FileWork>,
    write_tx: mpsc::Sender<WriteItem>,
    metrics: Arc<PipelineMetrics>,
    cancel: CancellationToken,
) {
    let mut extractors: HashMap<SupportedLanguage, EntityExtractor> = HashMap::new();

    loop {
        if cancel.is_cancelled() {
            return;
        }
        let record = {
            let mut rx = parse_rx.blocking_lock();
            rx.blocking_recv()
        };
        let Some(record) = record else { return };

        let source = match std::fs::read(&record.abs_path) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(s) => s,
                Err(_) => {
                    metrics.record_parse_failure(&record.path, "invalid utf-8");
                    continue;
                }
            },
            Err(e) => {
                metrics.record_parse_failure(&record.path, format!("read failed: {e}"));
                continue;
            }
        };

        if !extractors.contains_key(&record.language) {
            match EntityExtractor::new(record.language) {
                Ok(extractor) => {
                    extractors.insert(record.language, extractor);
                }
                Err(e) => {
                    metrics.record_parse_failure(&record.path, e.to_string());
                    continue;
                }
            }
        }
        let extractor = extractors
            .get_mut(&record.language)
            .expect("extractor inserted above");

        let parsed = match extractor.extract(&record, &source) {
            Ok(parsed) => parsed,
            Err(e) => {
                metrics.record_parse_failure(&record.path, e.to_string());
                continue;
            }
        };

        let work = filter.classify(parsed);
        let sent = if work.needs_embedding() {
            embed_tx.blocking_send(work).is_ok()
        } else {
            write_tx
                .blocking_send(WriteItem::File(Box::new(work)))
                .is_ok()
        };
        if !sent {
            return;
        }
    }
}

/// One embedder-pool worker.
async fn embed_worker(
    embed_rx: Arc<Mutex<mpsc::Receiver<FileWork>>>,
    provider: Arc<dyn EmbeddingProvider>,
    write_tx: mpsc::Sender<WriteItem>,
    metrics: Arc<PipelineMetrics>,
    cancel: CancellationToken,
) {
    loop {
        let work = {
            let mut rx = embed_rx.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                work = rx.recv() => work,
            }
        };
        let Some(mut work) = work else { return };

        tokio::select! {
            biased;
            // In-flight work is discarded on cancellation
            _ = cancel.cancelled() => return,
            _ = embed_file(&provider, &mut work, &metrics) => {}
        }

        if write_tx
            .send(WriteItem::File(Box::new(work)))
            .await
            .is_err()
        {
            return;
        }
    }
}
