//! `cie status` - project, store and queue state.

use clap::Args;

use cie_core::error::{ErrorKind, ErrorReport, IntoReport};
use cie_index::{CheckpointStore, IndexLock, LockState};
use cie_store::Store;

use crate::GlobalOptions;

#[derive(Args, Debug)]
pub struct StatusArgs {}

pub async fn execute(_args: StatusArgs, global: &GlobalOptions) -> Result<(), ErrorReport> {
    let ctx = super::load_context(global)?;

    println!("project: {}", ctx.config.project_id);
    println!("repository: {}", ctx.repo_root.display());
    println!(
        "embedding: {} (dim {})",
        ctx.config.embedding.provider, ctx.config.embedding.dimensions
    );

    let checkpoint =
        CheckpointStore::load(&ctx.paths.checkpoint_file()).map_err(IntoReport::into_report)?;
    println!(
        "checkpoint: {} files, last commit {}",
        checkpoint.data.files.len(),
        checkpoint.data.last_commit.as_deref().unwrap_or("-")
    );

    // Lock state, without disturbing a holder: an immediately released
    // acquisition means it was free.
    let lock_state = IndexLock::try_acquire(&ctx.paths.lock_file()).map_err(|e| {
        ErrorReport::new(
            ErrorKind::Permission,
            "cannot access the index lock",
            e.to_string(),
        )
    })?;
    match lock_state {
        LockState::Acquired(lock) => {
            drop(lock);
            println!("indexer: idle");
        }
        LockState::Held(holder) => {
            println!(
                "indexer: running (pid {})",
                holder
                    .pid
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "unknown".into())
            );
        }
    }

    let queued = std::fs::read_to_string(ctx.paths.queue_file())
        .map(|content| content.lines().filter(|l| !l.trim().is_empty()).count())
        .unwrap_or(0);
    println!("queued commits: {queued}");

    let data_dir = ctx.paths.data_dir();
    if !data_dir.exists() {
        println!("store: not created (run `cie index`)");
        return Ok(());
    }
    match Store::open(&data_dir) {
        Ok(store) => {
            println!("store: {}", data_dir.display());
            for relation in [
                "file",
                "function",
                "function_code",
                "function_embedding",
                "type",
                "import",
                "defines",
                "calls",
            ] {
                let count = store.count_rows(relation).map_err(IntoReport::into_report)?;
                println!("  {relation}: {count}");
            }
        }
        Err(cie_store::StoreError::Locked(_)) => {
            println!("store: {} (locked by the running indexer)", data_dir.display());
        }
        Err(e) => return Err(e.into_report()),
    }
    Ok(())
}
