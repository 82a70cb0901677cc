//! Embedding provider trait.

use async_trait::async_trait;
use cie_config::ProviderKind;

use crate::error::{EmbedError, Result};

/// A source of dense vectors for text inputs.
///
/// Implementations are HTTP clients (`ollama`, `openai`, `nomic`) or the
/// deterministic `mock`. All are `Send + Sync` so worker pools can share one
/// instance behind an `Arc`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a micro-batch of inputs, one vector per input, in order.
    ///
    /// Callers keep batches at or below [`max_batch_len`](Self::max_batch_len).
    async fn embed(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Declared dimensionality; every returned vector must have this length.
    fn dimensions(&self) -> usize;

    /// Largest batch a single request may carry.
    fn max_batch_len(&self) -> usize;

    /// Which provider this is, as recorded in store and checkpoint.
    fn provider_tag(&self) -> ProviderKind;

    /// Cheap connectivity/health probe.
    async fn check_status(&self) -> Result<()>;
}

/// Validate a provider response against the batch it answers.
///
/// Any shortfall in count or dimensionality fails the whole batch; partial
/// batches are never accepted.
pub fn validate_batch(
    vectors: &[Vec<f32>],
    expected_count: usize,
    expected_dim: usize,
) -> Result<()> {
    if vectors.len() != expected_count {
        return Err(EmbedError::MalformedResponse(format!(
            "expected {expected_count} vectors, got {}",
            vectors.len()
        )));
    }
    for v in vectors {
        if v.len() != expected_dim {
            return Err(EmbedError::DimensionMismatch {
                expected: expected_dim,
                actual: v.len(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_batch() {
        let ok = vec![vec![0.0; 4], vec![0.0; 4]];
        assert!(validate_batch(&ok, 2, 4).is_ok());

        assert!(matches!(
            validate_batch(&ok, 3, 4),
            Err(EmbedError::MalformedResponse(_))
        ));
        assert!(matches!(
            validate_batch(&ok, 2, 8),
            Err(EmbedError::DimensionMismatch {
                expected: 8,
                actual: 4
            })
        ));
    }
}
