//! Deterministic mock provider.
//!
//! Derives a unit vector from the SHA-256 of each input, so equal inputs
//! always embed identically and similarity is stable across runs. No I/O;
//! used by tests and offline runs.

use async_trait::async_trait;
use cie_config::ProviderKind;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;
use crate::provider::EmbeddingProvider;

const MAX_BATCH_LEN: usize = 1024;

/// Deterministic, hash-derived embedding provider.
#[derive(Debug, Default)]
pub struct MockProvider {
    dimensions: usize,
    /// Number of `embed` calls served, for test assertions
    calls: AtomicU64,
}

impl MockProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            calls: AtomicU64::new(0),
        }
    }

    /// How many `embed` calls this instance has served.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector_for(&self, input: &str) -> Vec<f32> {
        // Stretch the digest over the whole vector by re-hashing a counter.
        let mut values = Vec::with_capacity(self.dimensions);
        let mut block = 0u32;
        while values.len() < self.dimensions {
            let mut hasher = Sha256::new();
            hasher.update(input.as_bytes());
            hasher.update(block.to_le_bytes());
            let digest = hasher.finalize();
            for chunk in digest.chunks_exact(4) {
                if values.len() == self.dimensions {
                    break;
                }
                let raw = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                // Map onto [-1, 1]
                values.push((raw as f32 / u32::MAX as f32) * 2.0 - 1.0);
            }
            block += 1;
        }

        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut values {
                *v /= norm;
            }
        }
        values
    }
}

#[async_trait]
impl EmbeddingProvider for MockProvider {
    async fn embed(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(inputs.iter().map(|i| self.vector_for(i)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_batch_len(&self) -> usize {
        MAX_BATCH_LEN
    }

    fn provider_tag(&self) -> ProviderKind {
        ProviderKind::Mock
    }

    async fn check_status(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deterministic_and_normalized() {
        let provider = MockProvider::new(16);
        let a = provider.embed(vec!["hello".into()]).await.unwrap();
        let b = provider.embed(vec!["hello".into()]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 16);

        let norm: f32 = a[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);

        let c = provider.embed(vec!["other".into()]).await.unwrap();
        assert_ne!(a, c);
        assert_eq!(provider.call_count(), 3);
    }
}
