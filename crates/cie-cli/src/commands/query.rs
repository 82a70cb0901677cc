//! `cie query` - semantic function search, or raw Datalog.

use std::time::Duration;

use clap::Args;

use cie_core::error::{ErrorReport, IntoReport};
use cie_store::Store;

use crate::GlobalOptions;

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Natural-language query, or a Datalog script with --script
    text: String,

    /// Maximum number of hits
    #[arg(long, short = 'n', default_value_t = 10)]
    limit: usize,

    /// Query deadline in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Treat the input as a raw read-only Datalog script
    #[arg(long)]
    script: bool,
}

pub async fn execute(args: QueryArgs, global: &GlobalOptions) -> Result<(), ErrorReport> {
    let ctx = super::load_context(global)?;
    let store = Store::open(&ctx.paths.data_dir()).map_err(IntoReport::into_report)?;

    if args.script {
        let rows = store
            .query(&args.text, Duration::from_secs(args.timeout_secs))
            .await
            .map_err(IntoReport::into_report)?;
        println!("{}", rows.headers.join("\t"));
        for row in rows.rows {
            let cells: Vec<String> = row.iter().map(|v| format!("{v}")).collect();
            println!("{}", cells.join("\t"));
        }
        return Ok(());
    }

    let provider =
        cie_embed::create_provider(&ctx.config.embedding).map_err(IntoReport::into_report)?;
    let vectors = provider
        .embed(vec![args.text.clone()])
        .await
        .map_err(IntoReport::into_report)?;
    let query_vector = vectors.into_iter().next().unwrap_or_default();

    let ef = (args.limit * 4).max(64);
    let hits = store
        .vector_search(&query_vector, args.limit, ef)
        .map_err(IntoReport::into_report)?;

    if hits.is_empty() {
        println!("no matches (is the project indexed? try `cie index`)");
        return Ok(());
    }
    for hit in hits {
        println!(
            "{:.4}  {}  {}:{}",
            1.0 - hit.distance,
            hit.name,
            hit.file_path,
            hit.start_line + 1
        );
    }
    Ok(())
}
