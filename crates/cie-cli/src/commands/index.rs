//! `cie index` - run the ingestion pipeline.

use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use cie_core::error::{ErrorReport, IntoReport};
use cie_index::{run_index, IndexOptions, IndexOutcome, IndexReport};

use crate::GlobalOptions;

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Re-index everything, ignoring the checkpoint
    #[arg(long)]
    full: bool,

    /// If another indexer holds the lock, enqueue and exit successfully
    #[arg(long)]
    queue: bool,

    /// Commit hash this run is for (recorded in the checkpoint)
    #[arg(long)]
    until: Option<String>,

    /// Wait up to this many seconds for the index lock
    #[arg(long)]
    wait_secs: Option<u64>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

pub async fn execute(args: IndexArgs, global: &GlobalOptions) -> Result<(), ErrorReport> {
    let ctx = super::load_context(global)?;

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, draining pipeline");
            signal_cancel.cancel();
        }
    });

    let options = IndexOptions {
        full: args.full,
        queue: args.queue,
        until: args.until,
        wait: args.wait_secs.map(std::time::Duration::from_secs),
    };

    match run_index(&ctx.config, &ctx.paths, options, &cancel)
        .await
        .map_err(IntoReport::into_report)?
    {
        IndexOutcome::Queued { commit } => {
            println!("indexer busy; queued commit {commit}");
        }
        IndexOutcome::Ran(reports) => {
            for report in &reports {
                if args.json {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(report).unwrap_or_default()
                    );
                } else {
                    print_summary(report);
                }
            }
        }
    }
    Ok(())
}

fn print_summary(report: &IndexReport) {
    if let Some(commit) = &report.indexed_commit {
        println!("indexed commit {commit}");
    }
    println!(
        "files: {} discovered, {} indexed, {} unchanged, {} removed",
        report.files_discovered,
        report.files_indexed,
        report.files_unchanged,
        report.files_removed
    );
    println!(
        "entities: {} functions, {} types, {} imports ({} truncated)",
        report.functions, report.types, report.imports, report.truncated_functions
    );
    println!(
        "edges: {} defines, {} calls",
        report.defines_edges, report.calls_edges
    );
    println!(
        "embeddings: {} calls, {} reused, {} errors",
        report.embedding_calls, report.embeddings_reused, report.embedding_errors
    );
    println!(
        "store: {} mutations in {} batches at {}",
        report.store_mutations,
        report.batches_committed,
        report.dataset_dir.display()
    );
    if !report.skipped.is_empty() {
        let skips: Vec<String> = report
            .skipped
            .iter()
            .map(|(reason, count)| format!("{reason}={count}"))
            .collect();
        println!("skipped: {}", skips.join(", "));
    }
    if !report.parse_errors.is_empty() {
        println!("parse errors: {}", report.parse_errors.len());
        for failure in &report.parse_errors {
            println!("  {}: {}", failure.file, failure.reason);
        }
    }
    if report.cancelled {
        println!("cancelled: true (partial index; re-run to finish)");
    }
    println!("done in {} ms", report.duration_ms);
}
