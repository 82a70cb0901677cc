//! Nomic Atlas embedding provider.
//!
//! - POST `{base_url}/embedding/text`
//! - Request: `{"model": "...", "texts": ["text1", ...]}`
//! - Response: `{"embeddings": [[...], ...]}`

use std::time::Duration;

use async_trait::async_trait;
use cie_config::ProviderKind;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{EmbedError, Result};
use crate::provider::{validate_batch, EmbeddingProvider};
use crate::retry::{with_retries, DEFAULT_MAX_ATTEMPTS};

/// Default Atlas API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api-atlas.nomic.ai/v1";

/// Default embedding model.
pub const DEFAULT_MODEL: &str = "nomic-embed-text-v1.5";

/// Documented request ceiling.
const MAX_BATCH_LEN: usize = 128;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration for the Nomic provider.
#[derive(Debug, Clone)]
pub struct NomicConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub dimensions: usize,
    pub timeout_secs: u64,
    pub max_attempts: u32,
}

impl NomicConfig {
    pub fn new(api_key: impl Into<String>, dimensions: usize) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
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
    texts: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Nomic Atlas embedding provider.
#[derive(Debug, Clone)]
pub struct NomicProvider {
    client: Client,
    config: NomicConfig,
}

impl NomicProvider {
    pub fn new(config: NomicConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(EmbedError::Config(
                "nomic provider requires embedding.api_key".into(),
            ));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbedError::Config(format!("HTTP client error: {e}")))?;
        Ok(Self { client, config })
    }

    fn embed_url(&self) -> String {
        format!(
            "{}/embedding/text",
            self.config.base_url.trim_end_matches('/')
        )
    }

    async fn send_request(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let body = EmbedRequest {
            model: self.config.model.clone(),
            texts,
        };

        let response = self
            .client
            .post(self.embed_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            let message = response.text().await.unwrap_or_default();
            return Err(EmbedError::from_http(status.as_u16(), message, retry_after));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::MalformedResponse(e.to_string()))?;
        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for NomicProvider {
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
        ProviderKind::Nomic
    }

    async fn check_status(&self) -> Result<()> {
        self.send_request(vec!["ping".into()]).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_embed_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embedding/text"))
            .and(header("Authorization", "Bearer nk-test"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"embeddings": [[0.1, 0.2, 0.3]]})),
            )
            .mount(&server)
            .await;

        let config = NomicConfig::new("nk-test", 3).with_base_url(server.uri());
        let provider = NomicProvider::new(config).unwrap();
        let vectors = provider.embed(vec!["a".into()]).await.unwrap();
        assert_eq!(vectors, vec![vec![0.1, 0.2, 0.3]]);
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        assert!(matches!(
            NomicProvider::new(NomicConfig::new("", 768)),
            Err(EmbedError::Config(_))
        ));
    }
}
