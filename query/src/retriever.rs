use crate::classifier::{QueryClass, QueryClassifier};
use crate::mmr;
use crate::scoring::{self, NormalizeMethod};
use crate::transform::QueryTransformer;
use chrono::{DateTime, Utc};
use ingestion::EmbedError;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use storage::{DenseIndex, IndexError, RowStore, StoreError};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RetrieveError {
    #[error("query embedding failed: {0}")]
    Embedding(#[from] EmbedError),
    #[error("row store failed: {0}")]
    Store(#[from] StoreError),
    #[error("dense index failed: {0}")]
    Index(#[from] IndexError),
}

#[derive(Debug, Clone)]
pub struct RetrieveOptions {
    /// Final result count; `None` lets the query class decide.
    pub top_k: Option<usize>,
    pub document_id: Option<Uuid>,
    /// The load shedder's decision is authoritative here.
    pub apply_mmr: bool,
    pub vector_top_k: usize,
    pub lexical_top_k: usize,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            top_k: None,
            document_id: None,
            apply_mmr: true,
            vector_top_k: 50,
            lexical_top_k: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResult {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub content: String,
    pub score: f32,
    pub vector_score: f32,
    pub lexical_score: f32,
    pub recency_score: f32,
    pub chunk_index: usize,
    pub section_title: Option<String>,
    pub page_number: Option<u32>,
    pub filename: Option<String>,
    pub embedding: Option<Vec<f32>>,
}

struct Candidate {
    chunk_id: Uuid,
    document_id: Uuid,
    content: String,
    vector_score: f32,
    lexical_score: f32,
    combined_score: f32,
    recency_score: f32,
    chunk_index: usize,
    section_title: Option<String>,
    page_number: Option<u32>,
    filename: Option<String>,
    embedding: Option<Vec<f32>>,
    created_at: Option<DateTime<Utc>>,
}

/// Hybrid retrieval: dense and lexical search fan out concurrently, merge by
/// chunk id, scores are normalized and combined per the query class, and the
/// final list is MMR-diversified.
pub struct HybridRetriever {
    dense: Arc<dyn DenseIndex>,
    rows: Arc<dyn RowStore>,
    transformer: QueryTransformer,
    classifier: QueryClassifier,
    recency_decay_days: f32,
}

impl HybridRetriever {
    pub fn new(
        dense: Arc<dyn DenseIndex>,
        rows: Arc<dyn RowStore>,
        transformer: QueryTransformer,
    ) -> Self {
        Self {
            dense,
            rows,
            transformer,
            classifier: QueryClassifier::new(),
            recency_decay_days: 365.0,
        }
    }

    pub fn with_recency_decay_days(mut self, days: f32) -> Self {
        self.recency_decay_days = days;
        self
    }

    pub fn classify(&self, query: &str) -> QueryClass {
        self.classifier.classify(query)
    }

    pub async fn retrieve(
        &self,
        query: &str,
        tenant_id: &str,
        opts: RetrieveOptions,
    ) -> Result<Vec<RetrievalResult>, RetrieveError> {
        let class = self.classifier.classify(query);
        let params = self.classifier.params(class);
        let top_k = opts.top_k.unwrap_or(params.top_k);

        let transformed = self.transformer.transform(query).await?;

        // Dense and lexical searches start together and are joined before
        // scoring; neither serializes on the other.
        let (dense_result, lexical_result) = tokio::join!(
            self.dense.query(
                tenant_id,
                &transformed.embedding,
                opts.vector_top_k,
                opts.document_id,
                true,
            ),
            self.rows.lexical_search(
                tenant_id,
                &transformed.normalized,
                opts.lexical_top_k,
                opts.document_id,
            ),
        );
        let dense_matches = dense_result?;
        let lexical_hits = lexical_result?;

        debug!(
            query_class = ?class,
            dense = dense_matches.len(),
            lexical = lexical_hits.len(),
            "retrieval fan-out complete"
        );

        // Merge by chunk id; a chunk found by both channels keeps both scores.
        let mut merged: HashMap<Uuid, Candidate> = HashMap::new();
        for m in dense_matches {
            let Some(meta) = m.metadata else {
                warn!(id = %m.id, "dense match without metadata, skipping");
                continue;
            };
            merged.insert(
                meta.chunk_id,
                Candidate {
                    chunk_id: meta.chunk_id,
                    document_id: meta.document_id,
                    content: meta.content,
                    vector_score: m.score,
                    lexical_score: 0.0,
                    combined_score: 0.0,
                    recency_score: 0.0,
                    chunk_index: meta.chunk_index,
                    section_title: meta.section_title,
                    page_number: meta.page_number,
                    filename: meta.filename,
                    embedding: Some(m.values),
                    created_at: None,
                },
            );
        }
        for hit in lexical_hits {
            match merged.get_mut(&hit.chunk_id) {
                Some(candidate) => candidate.lexical_score = hit.score,
                None => {
                    merged.insert(
                        hit.chunk_id,
                        Candidate {
                            chunk_id: hit.chunk_id,
                            document_id: hit.document_id,
                            content: hit.content,
                            vector_score: 0.0,
                            lexical_score: hit.score,
                            combined_score: 0.0,
                            recency_score: 0.0,
                            chunk_index: hit.chunk_index,
                            section_title: hit.section_title,
                            page_number: hit.page_number,
                            filename: None,
                            embedding: None,
                            created_at: None,
                        },
                    );
                }
            }
        }

        if merged.is_empty() {
            return Ok(Vec::new());
        }

        // Backfill created_at from the row store. Only chunks of retrievable
        // documents owned by this tenant come back; anything else is dropped
        // here, which is the isolation predicate for the dense channel too.
        let ids: Vec<Uuid> = merged.keys().copied().collect();
        let visible = self.rows.visible_chunks_by_ids(tenant_id, &ids).await?;
        let mut candidates: Vec<Candidate> = Vec::with_capacity(visible.len());
        let mut visible_at: HashMap<Uuid, DateTime<Utc>> = HashMap::new();
        for chunk in visible {
            visible_at.insert(chunk.id, chunk.created_at);
        }
        for (chunk_id, mut candidate) in merged {
            match visible_at.get(&chunk_id) {
                Some(created_at) => {
                    candidate.created_at = Some(*created_at);
                    candidates.push(candidate);
                }
                None => {
                    debug!(chunk_id = %chunk_id, "dropping candidate without a visible row");
                }
            }
        }

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        // Deterministic order before normalization.
        candidates.sort_by(|a, b| a.chunk_id.cmp(&b.chunk_id));

        let now = Utc::now();
        let vector_raw: Vec<f32> = candidates.iter().map(|c| c.vector_score).collect();
        let lexical_raw: Vec<f32> = candidates.iter().map(|c| c.lexical_score).collect();
        let recency_raw: Vec<f32> = candidates
            .iter()
            .map(|c| {
                c.created_at
                    .map(|at| scoring::recency_score(at, now, self.recency_decay_days))
                    .unwrap_or(0.0)
            })
            .collect();

        let vector_norm = scoring::normalize_scores(&vector_raw, NormalizeMethod::MinMax);
        let lexical_norm = scoring::normalize_scores(&lexical_raw, NormalizeMethod::MinMax);
        let recency_norm = scoring::normalize_scores(&recency_raw, NormalizeMethod::MinMax);
        let combined = scoring::combine_scores(
            &vector_norm,
            &lexical_norm,
            &recency_norm,
            params.vector_weight,
            params.lexical_weight,
            params.recency_weight,
        );

        for (i, candidate) in candidates.iter_mut().enumerate() {
            candidate.vector_score = vector_norm[i];
            candidate.lexical_score = lexical_norm[i];
            candidate.recency_score = recency_norm[i];
            candidate.combined_score = combined[i];
        }

        let selected = if opts.apply_mmr && candidates.len() > top_k {
            self.diversify(candidates, &transformed.embedding, top_k, params.mmr_lambda)
        } else {
            rank_by_score(candidates, top_k)
        };

        info!(
            query_class = ?class,
            results = selected.len(),
            top_k,
            "hybrid retrieval complete"
        );

        Ok(selected.into_iter().map(into_result).collect())
    }

    /// MMR over the candidates that carry embeddings. Falls back to plain
    /// score ranking when too few embeddings survived the merge.
    fn diversify(
        &self,
        candidates: Vec<Candidate>,
        query_embedding: &[f32],
        top_k: usize,
        lambda: f32,
    ) -> Vec<Candidate> {
        let embedded_count = candidates.iter().filter(|c| c.embedding.is_some()).count();
        if embedded_count < top_k.min(candidates.len()) {
            warn!(
                embedded = embedded_count,
                required = top_k,
                "insufficient embeddings for MMR, ranking by score"
            );
            return rank_by_score(candidates, top_k);
        }

        let (mut embedded, rest): (Vec<Candidate>, Vec<Candidate>) =
            candidates.into_iter().partition(|c| c.embedding.is_some());
        drop(rest);

        let embeddings: Vec<Vec<f32>> = embedded
            .iter()
            .map(|c| c.embedding.clone().unwrap_or_default())
            .collect();
        let scores: Vec<f32> = embedded.iter().map(|c| c.combined_score).collect();
        let picked = mmr::rerank(query_embedding, &embeddings, &scores, top_k, lambda);

        let mut out = Vec::with_capacity(picked.len());
        let mut taken: Vec<Option<Candidate>> = embedded.drain(..).map(Some).collect();
        for idx in picked {
            if let Some(candidate) = taken[idx].take() {
                out.push(candidate);
            }
        }
        out
    }
}

fn rank_by_score(mut candidates: Vec<Candidate>, top_k: usize) -> Vec<Candidate> {
    candidates.sort_by(compare_candidates);
    candidates.truncate(top_k);
    candidates
}

/// Higher combined score first, then lower chunk index, then chunk id.
fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    b.combined_score
        .partial_cmp(&a.combined_score)
        .unwrap_or(Ordering::Equal)
        .then(a.chunk_index.cmp(&b.chunk_index))
        .then(a.chunk_id.cmp(&b.chunk_id))
}

fn into_result(candidate: Candidate) -> RetrievalResult {
    RetrievalResult {
        chunk_id: candidate.chunk_id,
        document_id: candidate.document_id,
        content: candidate.content,
        score: candidate.combined_score,
        vector_score: candidate.vector_score,
        lexical_score: candidate.lexical_score,
        recency_score: candidate.recency_score,
        chunk_index: candidate.chunk_index,
        section_title: candidate.section_title,
        page_number: candidate.page_number,
        filename: candidate.filename,
        embedding: candidate.embedding,
    }
}
