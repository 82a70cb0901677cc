//! Writer batcher.
//!
//! The single consumer at the end of the pipeline. Work arrives as whole
//! files, so a file's mutations always land in one batch (or a contiguous run
//! of batches), never interleaved with unrelated files in a way that could
//! leave dangling edges at a commit boundary. A batch commits when it reaches
//! the byte target, the entity cap, or the channel closes. The checkpoint is
//! updated only after its batch commits.
//!
//! Two edge-consistency duties live here:
//!
//! - every batch that removes functions also removes the calls edges touching
//!   them, in the same transaction, so no commit exposes a dangling endpoint;
//! - after the channel closes, a link pass resolves the parsers' pending
//!   calls repo-wide (a bare name matching exactly one stored function) and
//!   commits the resulting edges.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cie_core::entity::{self, CallEdge, PendingCall};
use cie_store::{MutationBatch, Store};

use crate::checkpoint::{CheckpointStore, FileCheckpoint};
use crate::error::Result;
use crate::filter::FileWork;
use crate::report::PipelineMetrics;

/// Upper bound on entities queued into one batch, independent of bytes.
pub const DEFAULT_MAX_BATCH_ENTITIES: usize = 5000;

/// One unit of work for the writer.
#[derive(Debug)]
pub enum WriteItem {
    /// A parsed, classified, embedded file
    File(Box<FileWork>),
    /// A file that vanished from the repository (deleted or newly skipped);
    /// everything it produced becomes tombstones
    RemoveFile { path: String, entry: FileCheckpoint },
}

/// Writer configuration.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Commit when the accumulated batch reaches this size
    pub batch_target_bytes: u64,
    /// Commit when this many entities are queued regardless of bytes
    pub max_batch_entities: usize,
    /// Commit hash to record in the checkpoint on successful completion
    pub record_commit: Option<String>,
}

/// Aggregates file work into transactional batches.
pub struct WriterBatcher {
    store: Store,
    checkpoint: CheckpointStore,
    config: WriterConfig,
    metrics: Arc<PipelineMetrics>,
    batch: MutationBatch,
    pending: Vec<PendingCheckpoint>,
    batch_entities: usize,
    /// Function IDs removed in the current batch; their edges are cascaded
    batch_removed_functions: Vec<String>,
    /// Call sites awaiting repo-wide resolution, with their caller's file
    pending_links: Vec<(String, PendingCall)>,
}

enum PendingCheckpoint {
    Upsert(String, FileCheckpoint),
    Remove(String),
}

impl WriterBatcher {
    pub fn new(
        store: Store,
        checkpoint: CheckpointStore,
        config: WriterConfig,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            store,
            checkpoint,
            config,
            metrics,
            batch: MutationBatch::new(),
            pending: Vec::new(),
            batch_entities: 0,
            batch_removed_functions: Vec::new(),
            pending_links: Vec::new(),
        }
    }

    /// Consume the write channel until it closes or the run is cancelled.
    ///
    /// On cancellation the batch already begun is finalized and no new one is
    /// started; files whose calls were never linked are marked dirty so the
    /// next run converges to the same state an uninterrupted run reaches. The
    /// `record_commit` hash is only written after an uncancelled, fully
    /// drained run.
    pub async fn run(
        mut self,
        mut rx: Receiver<WriteItem>,
        cancel: CancellationToken,
    ) -> Result<()> {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("writer cancelled, finalizing current batch");
                    self.flush()?;
                    self.mark_unlinked_dirty();
                    self.checkpoint.save()?;
                    return Ok(());
                }
                item = rx.recv() => {
                    match item {
                        Some(item) => {
                            self.stage(item);
                            if self.should_flush() {
                                self.flush()?;
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        self.flush()?;
        self.link_pending_calls()?;
        if let Some(commit) = self.config.record_commit.take() {
            self.checkpoint.data.last_commit = Some(commit);
        }
        self.checkpoint.save()?;
        Ok(())
    }

    /// Queue one item's mutations into the current batch.
    fn stage(&mut self, item: WriteItem) {
        match item {
            WriteItem::File(work) => self.stage_file(*work),
            WriteItem::RemoveFile { path, entry } => self.stage_removal(path, entry),
        }
    }

    fn stage_file(&mut self, work: FileWork) {
        let parsed = &work.parsed;
        let m = &self.metrics;

        self.batch.put_file(&parsed.file);
        for f in &parsed.functions {
            self.batch.put_function(f);
            if f.truncated {
                m.incr(&m.truncated_functions);
            }
        }
        for (function_id, vector) in &work.embedded {
            self.batch.put_embedding(function_id, vector.clone());
        }
        for t in &parsed.types {
            self.batch.put_type(t);
        }
        for i in &parsed.imports {
            self.batch.put_import(i);
        }
        for e in &parsed.defines {
            self.batch.put_defines(e);
        }
        for e in &parsed.calls {
            self.batch.put_calls(e);
        }

        for id in &work.removed_functions {
            self.batch.remove_function(id);
            self.batch_removed_functions.push(id.clone());
        }
        for id in &work.removed_types {
            self.batch.remove_type(id);
        }
        for id in &work.removed_imports {
            self.batch.remove_import(id);
        }
        // Edge IDs are not typed in the checkpoint; removal against both edge
        // relations is a no-op on the one that does not hold the key.
        for id in &work.removed_edges {
            self.batch.remove_defines(id);
            self.batch.remove_calls(id);
        }

        for call in &parsed.pending_calls {
            self.pending_links
                .push((parsed.file.path.clone(), call.clone()));
        }

        m.add(&m.functions, parsed.functions.len() as u64);
        m.add(&m.types, parsed.types.len() as u64);
        m.add(&m.imports, parsed.imports.len() as u64);
        m.add(&m.defines_edges, parsed.defines.len() as u64);
        m.add(&m.calls_edges, parsed.calls.len() as u64);
        m.add(&m.embeddings_reused, work.reused.len() as u64);
        m.add(
            &m.tombstones,
            (work.removed_functions.len()
                + work.removed_types.len()
                + work.removed_imports.len()
                + work.removed_edges.len()) as u64,
        );
        m.incr(&m.files_indexed);

        self.batch_entities += parsed.entity_count();
        self.pending.push(PendingCheckpoint::Upsert(
            parsed.file.path.clone(),
            work.to_checkpoint_entry(),
        ));
    }

    fn stage_removal(&mut self, path: String, entry: FileCheckpoint) {
        debug!(path = %path, "tombstoning removed file");
        let m = &self.metrics;

        self.batch.remove_file(&entity::file_id(&path));
        for id in entry.functions.keys() {
            self.batch.remove_function(id);
            self.batch_removed_functions.push(id.clone());
        }
        for id in &entry.types {
            self.batch.remove_type(id);
        }
        for id in &entry.imports {
            self.batch.remove_import(id);
        }
        for id in &entry.edges {
            self.batch.remove_defines(id);
            self.batch.remove_calls(id);
        }

        m.add(
            &m.tombstones,
            (entry.functions.len() + entry.types.len() + entry.imports.len() + entry.edges.len())
                as u64,
        );
        m.incr(&m.files_removed);
        self.pending.push(PendingCheckpoint::Remove(path));
    }

    fn should_flush(&self) -> bool {
        self.batch.estimated_bytes() as u64 >= self.config.batch_target_bytes
            || self.batch_entities >= self.config.max_batch_entities
    }

    /// Commit the current batch, then reflect it in the checkpoint.
    ///
    /// A transient store failure is retried once; any other failure aborts the
    /// pipeline with the store left in its pre-batch state.
    fn flush(&mut self) -> Result<()> {
        if self.batch.is_empty() && self.pending.is_empty() {
            return Ok(());
        }

        // Edges whose endpoint is removed in this batch go with it.
        if !self.batch_removed_functions.is_empty() {
            let touching = self.store.calls_touching(&self.batch_removed_functions)?;
            self.metrics
                .add(&self.metrics.tombstones, touching.len() as u64);
            for id in touching {
                self.batch.remove_calls(&id);
            }
            self.batch_removed_functions.clear();
        }

        let mutations = self.batch.mutation_count() as u64;
        if let Err(err) = self.store.batch_write(&self.batch) {
            if err.is_transient() {
                warn!(mutations, "transient store failure, retrying batch once: {err}");
                self.store.batch_write(&self.batch)?;
            } else {
                return Err(err.into());
            }
        }

        for update in self.pending.drain(..) {
            match update {
                PendingCheckpoint::Upsert(path, entry) => self.checkpoint.upsert_file(path, entry),
                PendingCheckpoint::Remove(path) => self.checkpoint.remove_file(&path),
            }
        }
        self.checkpoint.save()?;

        let m = &self.metrics;
        m.add(&m.store_mutations, mutations);
        m.incr(&m.batches_committed);
        debug!(mutations, "batch committed");

        self.batch = MutationBatch::new();
        self.batch_entities = 0;
        Ok(())
    }

    /// Resolve pending calls against the whole store and commit the edges.
    ///
    /// A bare callee name matching exactly one stored function resolves;
    /// zero or multiple matches drop the call site. Runs after every file of
    /// the run is committed, so resolution sees the run's final function set.
    fn link_pending_calls(&mut self) -> Result<()> {
        if self.pending_links.is_empty() {
            return Ok(());
        }

        let index = self.store.function_name_index()?;
        let mut batch = MutationBatch::new();
        let mut linked = 0u64;
        let mut seen: HashSet<String> = HashSet::new();

        for (path, call) in std::mem::take(&mut self.pending_links) {
            let Some(ids) = index.get(&call.callee_name) else {
                continue;
            };
            let [callee_id] = ids.as_slice() else {
                // Ambiguous repo-wide: dropped deterministically
                continue;
            };

            let id = entity::calls_id(&call.caller_id, callee_id, call.line);
            if !seen.insert(id.clone()) {
                continue;
            }
            batch.put_calls(&CallEdge {
                id: id.clone(),
                caller_id: call.caller_id.clone(),
                callee_id: callee_id.clone(),
                line: call.line,
            });
            linked += 1;

            // The caller's file owns the edge for future tombstoning.
            if let Some(entry) = self.checkpoint.data.files.get_mut(&path) {
                if !entry.edges.contains(&id) {
                    entry.edges.push(id);
                }
            }
        }

        if batch.is_empty() {
            return Ok(());
        }
        let mutations = batch.mutation_count() as u64;
        self.store.batch_write(&batch)?;
        self.checkpoint.save()?;

        let m = &self.metrics;
        m.add(&m.calls_edges, linked);
        m.add(&m.store_mutations, mutations);
        m.incr(&m.batches_committed);
        debug!(linked, "pending calls resolved");
        Ok(())
    }

    /// On cancellation, files whose pending calls never linked are marked
    /// dirty (hash cleared, embeddings kept) so the next run re-links them.
    fn mark_unlinked_dirty(&mut self) {
        let paths: HashSet<String> = self
            .pending_links
            .drain(..)
            .map(|(path, _)| path)
            .collect();
        for path in paths {
            if let Some(entry) = self.checkpoint.data.files.get_mut(&path) {
                entry.content_hash.clear();
            }
        }
    }
}
