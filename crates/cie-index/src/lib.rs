//! Ingestion pipeline and incremental index manager.
//!
//! The high-level entry point is [`run_index`], which handles cross-process
//! coordination (lock + commit queue) around one or more [`IndexPipeline`]
//! runs:
//!
//! - the index lock is taken, or with `queue` the commit is appended to the
//!   queue and the call returns successfully;
//! - each run discovers, parses, filters, embeds and writes;
//! - after a run completes, the queue is drained and a single follow-up run is
//!   scheduled for the newest queued commit.

pub mod checkpoint;
pub mod coordination;
pub mod embed_stage;
mod error;
pub mod filter;
pub mod pipeline;
pub mod report;
pub mod writer;

use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use cie_config::{ProjectConfig, ProjectPaths};
use cie_store::Store;

pub use checkpoint::{Checkpoint, CheckpointStore, FileCheckpoint};
pub use coordination::{CommitQueue, IndexLock, LockHolder, LockState};
pub use error::{IndexError, Result};
pub use filter::{FileWork, FingerprintFilter};
pub use pipeline::{IndexPipeline, PipelineConfig};
pub use report::{IndexReport, ParseFailure, PipelineMetrics};

/// Options for one `index` invocation.
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// Ignore the checkpoint and re-index everything
    pub full: bool,
    /// When the lock is held, enqueue instead of failing
    pub queue: bool,
    /// Commit hash this invocation targets
    pub until: Option<String>,
    /// Poll for the lock up to this long instead of failing immediately
    pub wait: Option<Duration>,
}

/// What an `index` invocation did.
#[derive(Debug)]
pub enum IndexOutcome {
    /// One or more pipeline runs completed; reports in run order
    Ran(Vec<IndexReport>),
    /// The lock was held and the commit was queued for the holder
    Queued { commit: String },
}

/// Run `index` end to end: lock, pipeline run(s), queue drain.
pub async fn run_index(
    config: &ProjectConfig,
    paths: &ProjectPaths,
    options: IndexOptions,
    cancel: &CancellationToken,
) -> Result<IndexOutcome> {
    let _lock = match IndexLock::try_acquire(&paths.lock_file())? {
        LockState::Acquired(lock) => lock,
        LockState::Held(holder) => {
            if options.queue {
                let commit = match options.until.clone() {
                    Some(commit) => commit,
                    None => git_head(&paths.repo_root).ok_or_else(|| {
                        IndexError::Usage(
                            "--queue needs --until or a git repository to resolve HEAD".into(),
                        )
                    })?,
                };
                CommitQueue::new(paths.queue_file()).enqueue(&commit)?;
                info!(commit = %commit, "indexer busy, commit queued");
                return Ok(IndexOutcome::Queued { commit });
            }
            match options.wait {
                Some(deadline) => IndexLock::wait_for_lock(&paths.lock_file(), deadline)?
                    .ok_or(IndexError::LockTimeout)?,
                None => return Err(IndexError::LockHeld { pid: holder.pid }),
            }
        }
    };

    let store = Store::open(&paths.data_dir())?;
    let provider = cie_embed::create_provider(&config.embedding)?;
    let queue = CommitQueue::new(paths.queue_file());

    let mut reports = Vec::new();
    let mut until = options.until.clone();
    let mut full = options.full;

    loop {
        let pipeline_config = PipelineConfig::from_project(config, paths, full, until.clone());
        let pipeline = IndexPipeline::new(pipeline_config, store.clone(), provider.clone());
        let report = pipeline.run(cancel).await?;
        let cancelled = report.cancelled;
        reports.push(report);

        if cancelled {
            break;
        }
        full = false;

        // One follow-up run for the newest queued commit, if any arrived
        // while we were indexing.
        let queued = queue.drain()?;
        match queued.into_iter().last() {
            Some(newest) => {
                info!(commit = %newest, "draining commit queue");
                until = Some(newest);
            }
            None => break,
        }
    }

    Ok(IndexOutcome::Ran(reports))
}

/// Resolve the repository's current HEAD commit, if it is a git repository.
pub fn git_head(repo_root: &Path) -> Option<String> {
    std::process::Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(repo_root)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .filter(|s| !s.is_empty())
}
