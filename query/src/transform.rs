use ingestion::{EmbedError, EmbeddingService};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct TransformedQuery {
    pub original: String,
    pub normalized: String,
    pub terms: Vec<String>,
    pub embedding: Vec<f32>,
}

/// Normalizes the query text and embeds it through the shared cache with the
/// query task type.
pub struct QueryTransformer {
    embedding: Arc<EmbeddingService>,
}

impl QueryTransformer {
    pub fn new(embedding: Arc<EmbeddingService>) -> Self {
        Self { embedding }
    }

    pub async fn transform(&self, query: &str) -> Result<TransformedQuery, EmbedError> {
        let normalized = normalize(query);
        let terms = extract_terms(&normalized);
        let embedding = self.embedding.embed_query(&normalized).await?;

        debug!(
            original_len = query.len(),
            normalized_len = normalized.len(),
            terms = terms.len(),
            "query transformed"
        );

        Ok(TransformedQuery {
            original: query.to_string(),
            normalized,
            terms,
            embedding,
        })
    }
}

fn normalize(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Terms shorter than two characters carry no lexical signal.
fn extract_terms(normalized: &str) -> Vec<String> {
    normalized
        .split_whitespace()
        .filter(|term| term.chars().count() >= 2)
        .map(|term| term.to_string())
        .collect()
}
