//! Ollama embedding provider.
//!
//! Uses the native batch endpoint:
//!
//! - POST `{base_url}/api/embed`
//! - Request: `{"model": "...", "input": ["text1", ...]}`
//! - Response: `{"embeddings": [[...], ...]}`
//!
//! Health checks go through `/api/tags`, which also verifies the configured
//! model is pulled.

use std::time::Duration;

use async_trait::async_trait;
use cie_config::ProviderKind;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{EmbedError, Result};
use crate::provider::{validate_batch, EmbeddingProvider};
use crate::retry::{with_retries, DEFAULT_MAX_ATTEMPTS};

/// Default local endpoint.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Default embedding model.
pub const DEFAULT_MODEL: &str = "nomic-embed-text";

/// Ollama processes batches serially; keep requests small.
const MAX_BATCH_LEN: usize = 32;

const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Configuration for the Ollama provider.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    pub dimensions: usize,
    pub timeout_secs: u64,
    pub max_attempts: u32,
}

impl OllamaConfig {
    pub fn new(dimensions: usize) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_MODEL.into(),
            dimensions,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct ModelInfo {
    name: String,
}

/// Ollama embedding provider.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    config: OllamaConfig,
}

impl OllamaProvider {
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbedError::Config(format!("HTTP client error: {e}")))?;
        Ok(Self { client, config })
    }

    fn embed_url(&self) -> String {
        format!("{}/api/embed", self.config.base_url.trim_end_matches('/'))
    }

    fn tags_url(&self) -> String {
        format!("{}/api/tags", self.config.base_url.trim_end_matches('/'))
    }

    async fn send_request(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let body = EmbedRequest {
            model: self.config.model.clone(),
            input: inputs,
        };

        let response = self.client.post(self.embed_url()).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmbedError::from_http(status.as_u16(), message, None));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::MalformedResponse(e.to_string()))?;
        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    async fn embed(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(vec![]);
        }
        let count = inputs.len();
        let vectors = with_retries(self.config.max_attempts, || {
            self.send_request(inputs.clone())
        })
        .await?;
        validate_batch(&vectors, count, self.config.dimensions)?;
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn max_batch_len(&self) -> usize {
        MAX_BATCH_LEN
    }

    fn provider_tag(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    async fn check_status(&self) -> Result<()> {
        let response = self.client.get(self.tags_url()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EmbedError::from_http(
                status.as_u16(),
                "tags endpoint failed".into(),
                None,
            ));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::MalformedResponse(e.to_string()))?;
        let model_present = tags
            .models
            .iter()
            .any(|m| m.name.starts_with(&self.config.model));
        if !model_present {
            warn!(
                model = %self.config.model,
                "model not reported by ollama; `ollama pull` may be needed"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer, dim: usize) -> OllamaProvider {
        let config = OllamaConfig::new(dim)
            .with_base_url(server.uri())
            .with_model("test-embed");
        OllamaProvider::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_embed_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .and(body_partial_json(serde_json::json!({"model": "test-embed"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"embeddings": [[0.1, 0.2], [0.3, 0.4]]}),
            ))
            .mount(&server)
            .await;

        let provider = provider(&server, 2);
        let vectors = provider.embed(vec!["a".into(), "b".into()]).await.unwrap();
        assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
    }

    #[tokio::test]
    async fn test_server_error_retries_then_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let config = OllamaConfig {
            max_attempts: 2,
            ..OllamaConfig::new(2).with_base_url(server.uri())
        };
        let provider = OllamaProvider::new(config).unwrap();
        let err = provider.embed(vec!["a".into()]).await.unwrap_err();
        assert!(matches!(err, EmbedError::Unavailable { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_short_batch_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"embeddings": [[0.1, 0.2]]})),
            )
            .mount(&server)
            .await;

        let provider = provider(&server, 2);
        let err = provider
            .embed(vec!["a".into(), "b".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, EmbedError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_check_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"models": [{"name": "test-embed:latest"}]}),
            ))
            .mount(&server)
            .await;

        let provider = provider(&server, 2);
        assert!(provider.check_status().await.is_ok());
    }
}
