use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Task type passed to the embedding endpoint. Document and query texts are
/// embedded with different task hints but share one vector space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmbeddingTask {
    RetrievalDocument,
    RetrievalQuery,
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(
        &self,
        texts: &[String],
        task: EmbeddingTask,
    ) -> Result<Vec<Vec<f32>>, ProviderError>;

    fn dimension(&self) -> usize;
}

/// Content-addressed pseudo-embedding: the same text always maps to the same
/// vector, so retrieval and cache behavior stay reproducible offline.
pub fn deterministic_embedding(text: &str, dims: usize) -> Vec<f32> {
    let dims = dims.max(1);

    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();

    let mut out = Vec::with_capacity(dims);
    for i in 0..dims {
        let byte = digest[i % digest.len()];
        let value = (byte as f32 / 127.5) - 1.0;
        out.push(value);
    }

    out
}

/// Reference embedding provider used in local wiring and tests.
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(768)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(
        &self,
        texts: &[String],
        _task: EmbeddingTask,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts
            .iter()
            .map(|text| deterministic_embedding(text, self.dims))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dims
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_embedding_is_reproducible_for_same_inputs() {
        let a = deterministic_embedding("hello", 8);
        let b = deterministic_embedding("hello", 8);
        assert_eq!(a, b);
    }

    #[test]
    fn deterministic_embedding_changes_with_text() {
        let a = deterministic_embedding("hello", 8);
        let b = deterministic_embedding("world", 8);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn hash_embedder_matches_across_task_types() {
        let embedder = HashEmbedder::new(16);
        let texts = vec!["shared text".to_string()];
        let doc = embedder
            .embed(&texts, EmbeddingTask::RetrievalDocument)
            .await
            .unwrap();
        let query = embedder
            .embed(&texts, EmbeddingTask::RetrievalQuery)
            .await
            .unwrap();
        assert_eq!(doc, query);
        assert_eq!(doc[0].len(), 16);
    }
}
