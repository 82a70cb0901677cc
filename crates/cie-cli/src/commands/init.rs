//! `cie init` - create a default project configuration.

use clap::Args;

use cie_config::{save_project_config, ProjectConfig, ProviderKind};
use cie_core::error::{ErrorKind, ErrorReport, IntoReport};

use crate::GlobalOptions;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Project identifier (defaults to the repository directory name)
    #[arg(long)]
    project_id: Option<String>,

    /// Embedding provider tag
    #[arg(long, default_value = "mock")]
    provider: String,
}

pub async fn execute(args: InitArgs, global: &GlobalOptions) -> Result<(), ErrorReport> {
    let repo_root = match &global.repo {
        Some(repo) => repo.clone(),
        None => std::env::current_dir().map_err(|e| {
            ErrorReport::new(
                ErrorKind::Permission,
                "cannot determine working directory",
                e.to_string(),
            )
        })?,
    };

    let config_path = repo_root.join(".cie").join("project.yaml");
    if config_path.exists() {
        return Err(ErrorReport::new(
            ErrorKind::Input,
            "project already initialized",
            format!("{} exists", config_path.display()),
        )
        .with_fix("edit the file directly, or `cie reset --yes` to start over"));
    }

    let project_id = args.project_id.unwrap_or_else(|| {
        repo_root
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase().replace(' ', "-"))
            .unwrap_or_else(|| "project".to_string())
    });
    let provider: ProviderKind = args
        .provider
        .parse()
        .map_err(IntoReport::into_report)?;

    let mut config = ProjectConfig::new(project_id);
    config.embedding.provider = provider;
    save_project_config(&repo_root, &config).map_err(IntoReport::into_report)?;

    println!("initialized {}", config_path.display());
    println!("project_id: {}", config.project_id);
    println!("embedding provider: {}", config.embedding.provider);
    Ok(())
}
