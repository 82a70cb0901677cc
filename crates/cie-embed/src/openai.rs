//! OpenAI-compatible embedding provider.
//!
//! Speaks the `/v1/embeddings` protocol:
//!
//! - POST `{base_url}/embeddings`
//! - Request: `{"model": "...", "input": ["text1", ...]}`
//! - Response: `{"data": [{"embedding": [...], "index": 0}, ...]}`

use std::time::Duration;

use async_trait::async_trait;
use cie_config::ProviderKind;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{EmbedError, Result};
use crate::provider::{validate_batch, EmbeddingProvider};
use crate::retry::{with_retries, DEFAULT_MAX_ATTEMPTS};

/// Default API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default embedding model.
pub const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// Documented request ceiling for the embeddings endpoint.
const MAX_BATCH_LEN: usize = 512;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration for the OpenAI-compatible provider.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub dimensions: usize,
    pub timeout_secs: u64,
    pub max_attempts: u32,
}

impl OpenAiConfig {
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
struct EmbeddingsRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

/// OpenAI-compatible embedding provider.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(EmbedError::Config(
                "openai provider requires embedding.api_key".into(),
            ));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbedError::Config(format!("HTTP client error: {e}")))?;
        Ok(Self { client, config })
    }

    fn embeddings_url(&self) -> String {
        format!("{}/embeddings", self.config.base_url.trim_end_matches('/'))
    }

    async fn send_request(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let body = EmbeddingsRequest {
            model: self.config.model.clone(),
            input: inputs,
        };

        let response = self
            .client
            .post(self.embeddings_url())
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

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::MalformedResponse(e.to_string()))?;

        // The protocol allows out-of-order data entries; restore input order.
        let mut ordered = parsed.data;
        ordered.sort_by_key(|d| d.index);
        Ok(ordered.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
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
        ProviderKind::Openai
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

    fn response_json(dim: usize, count: usize) -> serde_json::Value {
        let data: Vec<serde_json::Value> = (0..count)
            .map(|i| {
                serde_json::json!({
                    "object": "embedding",
                    "embedding": vec![0.5_f32; dim],
                    "index": i
                })
            })
            .collect();
        serde_json::json!({"object": "list", "data": data, "model": "test"})
    }

    fn provider(server: &MockServer, dim: usize) -> OpenAiProvider {
        let config = OpenAiConfig::new("test-key", dim)
            .with_base_url(server.uri())
            .with_model("test");
        OpenAiProvider::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_embed_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(response_json(8, 2)))
            .mount(&server)
            .await;

        let provider = provider(&server, 8);
        let vectors = provider
            .embed(vec!["a".into(), "b".into()])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].len(), 8);
    }

    #[tokio::test]
    async fn test_retries_on_429_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(response_json(4, 1)))
            .mount(&server)
            .await;

        let provider = provider(&server, 4);
        let vectors = provider.embed(vec!["a".into()]).await.unwrap();
        assert_eq!(vectors.len(), 1);
    }

    #[tokio::test]
    async fn test_auth_failure_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&server, 4);
        let err = provider.embed(vec!["a".into()]).await.unwrap_err();
        assert!(matches!(err, EmbedError::Auth(_)));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_fails_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(response_json(4, 1)))
            .mount(&server)
            .await;

        let provider = provider(&server, 768);
        let err = provider.embed(vec!["a".into()]).await.unwrap_err();
        assert!(matches!(
            err,
            EmbedError::DimensionMismatch {
                expected: 768,
                actual: 4
            }
        ));
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let config = OpenAiConfig::new("", 768);
        assert!(matches!(
            OpenAiProvider::new(config),
            Err(EmbedError::Config(_))
        ));
    }
}
