//! Command implementations.

pub mod index;
pub mod init;
pub mod query;
pub mod reset;
pub mod status;

use std::path::PathBuf;

use cie_config::{find_repo_root, load_project_config, ProjectConfig, ProjectPaths};
use cie_core::error::{ErrorKind, ErrorReport, IntoReport};

use crate::GlobalOptions;

/// Resolved project context shared by most commands.
pub(crate) struct ProjectContext {
    pub repo_root: PathBuf,
    pub config: ProjectConfig,
    pub paths: ProjectPaths,
}

/// Locate the repository, load and validate its configuration.
pub(crate) fn load_context(global: &GlobalOptions) -> Result<ProjectContext, ErrorReport> {
    let repo_root = resolve_repo_root(global)?;
    let config = load_project_config(&repo_root).map_err(IntoReport::into_report)?;
    let paths = ProjectPaths::resolve(&repo_root, &config.project_id)
        .map_err(IntoReport::into_report)?;
    Ok(ProjectContext {
        repo_root,
        config,
        paths,
    })
}

/// The repository root: `--repo`, or the nearest ancestor of the working
/// directory containing `.cie/project.yaml`.
pub(crate) fn resolve_repo_root(global: &GlobalOptions) -> Result<PathBuf, ErrorReport> {
    if let Some(repo) = &global.repo {
        return Ok(repo.clone());
    }
    let cwd = std::env::current_dir().map_err(|e| {
        ErrorReport::new(
            ErrorKind::Permission,
            "cannot determine working directory",
            e.to_string(),
        )
    })?;
    find_repo_root(&cwd).ok_or_else(|| {
        ErrorReport::new(
            ErrorKind::NotFound,
            "no CIE project found",
            format!(
                "no .cie/project.yaml in {} or any parent directory",
                cwd.display()
            ),
        )
        .with_fix("run `cie init` in the repository root, or pass --repo")
    })
}
