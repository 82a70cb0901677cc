//! Embedder stage.
//!
//! Fills in vectors for the functions the filter marked dirty. Requests are
//! micro-batched below the provider's request ceiling; retry/backoff for
//! transient errors lives inside the provider. Whatever still fails here is
//! permanent for this run: the affected functions are recorded as failures and
//! flow on to the writer vector-less.

use std::sync::Arc;

use tracing::warn;

use cie_core::entity::FunctionEntity;
use cie_embed::{EmbedError, EmbeddingProvider};

use crate::filter::{EmbedFailure, FileWork};
use crate::report::PipelineMetrics;

/// Text handed to the provider for one function: signature plus (already
/// truncated) source.
pub fn embedding_input(function: &FunctionEntity) -> String {
    format!("{}\n{}", function.signature, function.source)
}

/// Embed every dirty function of one file, in micro-batches.
pub async fn embed_file(
    provider: &Arc<dyn EmbeddingProvider>,
    work: &mut FileWork,
    metrics: &PipelineMetrics,
) {
    let batch_len = provider.max_batch_len().max(1);
    let indices = work.to_embed.clone();

    for chunk in indices.chunks(batch_len) {
        let inputs: Vec<String> = chunk
            .iter()
            .map(|&i| embedding_input(&work.parsed.functions[i]))
            .collect();

        metrics.incr(&metrics.embedding_calls);
        match provider.embed(inputs).await {
            Ok(vectors) => {
                for (&i, vector) in chunk.iter().zip(vectors) {
                    work.embedded
                        .push((work.parsed.functions[i].id.clone(), vector));
                }
            }
            Err(err) => {
                let dim_mismatch = matches!(err, EmbedError::DimensionMismatch { .. });
                if dim_mismatch {
                    metrics.add(&metrics.dimension_mismatches, chunk.len() as u64);
                }
                metrics.add(&metrics.embedding_errors, chunk.len() as u64);
                warn!(
                    file = %work.parsed.file.path,
                    affected = chunk.len(),
                    "embedding batch failed permanently: {err}"
                );
                for &i in chunk {
                    work.embed_failures.push(EmbedFailure {
                        function_id: work.parsed.functions[i].id.clone(),
                        reason: err.to_string(),
                        dim_mismatch,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::Checkpoint;
    use crate::filter::FingerprintFilter;
    use cie_core::entity::{self, FileRecord, ParsedFile, Span};
    use cie_core::SupportedLanguage;
    use cie_embed::MockProvider;
    use std::path::PathBuf;

    fn work_with_functions(names: &[&str]) -> FileWork {
        let functions = names
            .iter()
            .map(|name| FunctionEntity {
                id: format!("id-{name}"),
                name: (*name).to_string(),
                signature: format!("fn {name}()"),
                file_path: "a.rs".into(),
                span: Span::default(),
                source: format!("fn {name}() {{}}"),
                source_hash: entity::content_hash(name.as_bytes()),
                truncated: false,
            })
            .collect();
        let parsed = ParsedFile {
            file: FileRecord {
                path: "a.rs".into(),
                abs_path: PathBuf::from("a.rs"),
                hash: "h".into(),
                language: SupportedLanguage::Rust,
                size: 1,
            },
            file_id: entity::file_id("a.rs"),
            functions,
            types: vec![],
            imports: vec![],
            defines: vec![],
            calls: vec![],
            pending_calls: vec![],
        };
        FingerprintFilter::new(&Checkpoint::default(), false).classify(parsed)
    }

    #[tokio::test]
    async fn test_embed_file_fills_vectors() {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(MockProvider::new(8));
        let metrics = PipelineMetrics::default();
        let mut work = work_with_functions(&["foo", "bar"]);
        assert_eq!(work.to_embed.len(), 2);

        embed_file(&provider, &mut work, &metrics).await;

        assert_eq!(work.embedded.len(), 2);
        assert!(work.embed_failures.is_empty());
        assert_eq!(work.embedded[0].1.len(), 8);
        assert_eq!(
            metrics
                .embedding_calls
                .load(std::sync::atomic::Ordering::Relaxed),
            1
        );
    }

    #[tokio::test]
    async fn test_embedding_input_shape() {
        let work = work_with_functions(&["foo"]);
        let input = embedding_input(&work.parsed.functions[0]);
        assert!(input.starts_with("fn foo()\n"));
        assert!(input.contains("fn foo() {}"));
    }
}
