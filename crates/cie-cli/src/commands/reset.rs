//! `cie reset` - drop the store and checkpoints.
//!
//! The remedy for a schema mismatch, and the way to start an index over.

use clap::Args;

use cie_core::error::{ErrorKind, ErrorReport};

use crate::GlobalOptions;

#[derive(Args, Debug)]
pub struct ResetArgs {
    /// Actually delete; without this the command refuses
    #[arg(long)]
    yes: bool,
}

pub async fn execute(args: ResetArgs, global: &GlobalOptions) -> Result<(), ErrorReport> {
    let ctx = super::load_context(global)?;

    if !args.yes {
        return Err(ErrorReport::new(
            ErrorKind::Input,
            "refusing to delete index data",
            format!(
                "this would remove {} and {}",
                ctx.paths.data_dir().display(),
                ctx.paths.checkpoints_dir().display()
            ),
        )
        .with_fix("re-run with --yes to confirm"));
    }

    let remove_dir = |path: std::path::PathBuf| -> Result<(), ErrorReport> {
        if path.exists() {
            std::fs::remove_dir_all(&path).map_err(|e| {
                ErrorReport::new(
                    ErrorKind::Permission,
                    format!("failed to remove {}", path.display()),
                    e.to_string(),
                )
            })?;
            println!("removed {}", path.display());
        }
        Ok(())
    };

    remove_dir(ctx.paths.data_dir())?;
    remove_dir(ctx.paths.checkpoints_dir())?;
    remove_dir(ctx.paths.coordination_dir())?;

    println!("reset complete; run `cie index --full` to rebuild");
    Ok(())
}
