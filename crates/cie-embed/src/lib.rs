//! Embedding providers for CIE.
//!
//! One [`EmbeddingProvider`] trait with four implementations selected by
//! configuration tag: [`ollama`], [`openai`], [`nomic`] and [`mock`]. There is
//! no open plugin surface; [`create_provider`] is the only construction path
//! the pipeline uses.

mod error;
pub mod mock;
pub mod nomic;
pub mod ollama;
pub mod openai;
mod provider;
pub mod retry;

use std::sync::Arc;

use cie_config::{EmbeddingConfig, ProviderKind};

pub use error::{EmbedError, Result};
pub use mock::MockProvider;
pub use nomic::{NomicConfig, NomicProvider};
pub use ollama::{OllamaConfig, OllamaProvider};
pub use openai::{OpenAiConfig, OpenAiProvider};
pub use provider::{validate_batch, EmbeddingProvider};

/// Construct the provider selected by the project configuration.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let dimensions = config.dimensions;
    match config.provider {
        ProviderKind::Ollama => {
            let mut c = OllamaConfig::new(dimensions);
            if let Some(url) = &config.base_url {
                c = c.with_base_url(url);
            }
            if let Some(model) = &config.model {
                c = c.with_model(model);
            }
            Ok(Arc::new(OllamaProvider::new(c)?))
        }
        ProviderKind::Openai => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                EmbedError::Config("openai provider requires embedding.api_key".into())
            })?;
            let mut c = OpenAiConfig::new(api_key, dimensions);
            if let Some(url) = &config.base_url {
                c = c.with_base_url(url);
            }
            if let Some(model) = &config.model {
                c = c.with_model(model);
            }
            Ok(Arc::new(OpenAiProvider::new(c)?))
        }
        ProviderKind::Nomic => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                EmbedError::Config("nomic provider requires embedding.api_key".into())
            })?;
            let mut c = NomicConfig::new(api_key, dimensions);
            if let Some(url) = &config.base_url {
                c = c.with_base_url(url);
            }
            if let Some(model) = &config.model {
                c = c.with_model(model);
            }
            Ok(Arc::new(NomicProvider::new(c)?))
        }
        ProviderKind::Mock => Ok(Arc::new(MockProvider::new(dimensions))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_selects_by_tag() {
        let mut config = EmbeddingConfig::default();
        config.provider = ProviderKind::Mock;
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.provider_tag(), ProviderKind::Mock);
        assert_eq!(provider.dimensions(), cie_config::DEFAULT_DIMENSIONS);
    }

    #[test]
    fn test_factory_requires_api_key_for_remote() {
        let mut config = EmbeddingConfig::default();
        config.provider = ProviderKind::Openai;
        assert!(matches!(
            create_provider(&config),
            Err(EmbedError::Config(_))
        ));

        config.provider = ProviderKind::Nomic;
        assert!(matches!(
            create_provider(&config),
            Err(EmbedError::Config(_))
        ));
    }
}
