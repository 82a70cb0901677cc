//! Loading and saving `.cie/project.yaml`.

use std::path::Path;

use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::ProjectConfig;

/// Load and validate the project configuration from a repository root.
pub fn load_project_config(repo_root: &Path) -> Result<ProjectConfig> {
    let path = repo_root.join(".cie").join("project.yaml");
    if !path.is_file() {
        return Err(ConfigError::Missing(path));
    }

    debug!("loading project config from {:?}", path);
    let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    let config: ProjectConfig =
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })?;

    config.validate()?;
    Ok(config)
}

/// Save a project configuration to `<repo>/.cie/project.yaml`.
///
/// Creates the `.cie` directory when missing. Refuses to write an invalid
/// configuration.
pub fn save_project_config(repo_root: &Path, config: &ProjectConfig) -> Result<()> {
    config.validate()?;

    let dir = repo_root.join(".cie");
    std::fs::create_dir_all(&dir).map_err(|source| ConfigError::Io {
        path: dir.clone(),
        source,
    })?;

    let path = dir.join("project.yaml");
    let yaml = serde_yaml::to_string(config).map_err(|source| ConfigError::Parse {
        path: path.clone(),
        source,
    })?;
    std::fs::write(&path, yaml).map_err(|source| ConfigError::Io { path, source })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProviderKind;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_config() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            load_project_config(dir.path()),
            Err(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let mut config = ProjectConfig::new("demo");
        config.embedding.provider = ProviderKind::Ollama;
        config.embedding.model = Some("nomic-embed-text".into());

        save_project_config(dir.path(), &config).unwrap();
        let loaded = load_project_config(dir.path()).unwrap();

        assert_eq!(loaded.project_id, "demo");
        assert_eq!(loaded.embedding.provider, ProviderKind::Ollama);
        assert_eq!(loaded.embedding.model.as_deref(), Some("nomic-embed-text"));
    }

    #[test]
    fn test_load_rejects_malformed_yaml() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".cie")).unwrap();
        std::fs::write(dir.path().join(".cie/project.yaml"), "project_id: [").unwrap();
        assert!(matches!(
            load_project_config(dir.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_rejects_invalid_semantics() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".cie")).unwrap();
        std::fs::write(dir.path().join(".cie/project.yaml"), "project_id: \"\"").unwrap();
        assert!(matches!(
            load_project_config(dir.path()),
            Err(ConfigError::Invalid(_))
        ));
    }
}
