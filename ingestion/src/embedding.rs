use corpora_core::model::{content_hash, Chunk};
use providers::{retry_transient, EmbeddingProvider, EmbeddingTask, ProviderError, RetryPolicy};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use storage::KeyValueStore;
use thiserror::Error;
use tracing::{debug, info, warn};

const CACHE_PREFIX: &str = "embedding";

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding provider failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("no embedding produced for content hash {0}")]
    Missing(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// Embedding with cross-request deduplication: at most one provider call per
/// distinct content hash, cache shared through the key-value store. A
/// post-retry provider failure fails the whole batch; partial results are
/// never persisted.
pub struct EmbeddingService {
    provider: Arc<dyn EmbeddingProvider>,
    cache: Arc<dyn KeyValueStore>,
    cache_ttl: Duration,
    retry: RetryPolicy,
    metrics: Option<Arc<corpora_core::metrics::MetricsCollector>>,
}

impl EmbeddingService {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        cache: Arc<dyn KeyValueStore>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            provider,
            cache,
            cache_ttl,
            retry: RetryPolicy::default(),
            metrics: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<corpora_core::metrics::MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    pub async fn embed_chunks(
        &self,
        chunks: &[Chunk],
        task: EmbeddingTask,
    ) -> Result<Vec<EmbeddedChunk>, EmbedError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        // Deduplicate by content hash, keeping the first occurrence's text.
        let mut unique: Vec<(&str, &str)> = Vec::new();
        let mut seen: HashMap<&str, ()> = HashMap::new();
        for chunk in chunks {
            if seen.insert(chunk.content_hash.as_str(), ()).is_none() {
                unique.push((chunk.content_hash.as_str(), chunk.content.as_str()));
            }
        }

        let mut vectors: HashMap<String, Vec<f32>> = HashMap::new();
        let mut missing: Vec<(&str, &str)> = Vec::new();
        for (hash, content) in unique.iter().copied() {
            match self.cache_get(hash).await {
                Some(vector) => {
                    vectors.insert(hash.to_string(), vector);
                }
                None => missing.push((hash, content)),
            }
        }

        let cache_hits = unique.len() - missing.len();
        if let Some(metrics) = &self.metrics {
            metrics.record_cache_lookup(cache_hits as u64, missing.len() as u64);
        }
        debug!(
            chunks = chunks.len(),
            unique = unique.len(),
            cache_hits,
            cache_misses = missing.len(),
            "embedding cache lookup complete"
        );

        if !missing.is_empty() {
            let texts: Vec<String> = missing.iter().map(|(_, c)| c.to_string()).collect();
            let fresh = retry_transient(&self.retry, || self.provider.embed(&texts, task)).await?;
            if fresh.len() != texts.len() {
                return Err(EmbedError::Missing(missing[0].0.to_string()));
            }

            for ((hash, _), vector) in missing.iter().zip(fresh) {
                self.cache_put(hash, &vector).await;
                vectors.insert(hash.to_string(), vector);
            }
        }

        let mut out = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let vector = vectors
                .get(&chunk.content_hash)
                .ok_or_else(|| EmbedError::Missing(chunk.content_hash.clone()))?;
            out.push(EmbeddedChunk {
                chunk: chunk.clone(),
                embedding: vector.clone(),
            });
        }

        info!(
            embedded = out.len(),
            from_cache = cache_hits,
            newly_generated = unique.len() - cache_hits,
            "embedding batch complete"
        );

        Ok(out)
    }

    /// Single-text query path, same cache keyed by the hash of the text.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let hash = content_hash(text);
        if let Some(vector) = self.cache_get(&hash).await {
            return Ok(vector);
        }

        let texts = vec![text.to_string()];
        let mut fresh = retry_transient(&self.retry, || {
            self.provider.embed(&texts, EmbeddingTask::RetrievalQuery)
        })
        .await?;
        let vector = fresh.pop().ok_or_else(|| EmbedError::Missing(hash.clone()))?;

        self.cache_put(&hash, &vector).await;
        Ok(vector)
    }

    // Cache errors degrade to misses on read and are dropped on write; only
    // the rate limiter and quota manager fail open by policy, but a broken
    // cache must not fail an otherwise healthy batch.
    async fn cache_get(&self, hash: &str) -> Option<Vec<f32>> {
        let key = format!("{CACHE_PREFIX}:{hash}");
        match self.cache.get(&key).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).ok(),
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "embedding cache read failed, treating as miss");
                None
            }
        }
    }

    async fn cache_put(&self, hash: &str, vector: &[f32]) {
        let key = format!("{CACHE_PREFIX}:{hash}");
        let Ok(raw) = serde_json::to_string(vector) else {
            return;
        };
        if let Err(err) = self.cache.set(&key, raw, Some(self.cache_ttl)).await {
            warn!(error = %err, "embedding cache write failed");
        }
    }
}
