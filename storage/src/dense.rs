use async_trait::async_trait;
use corpora_core::model::{VectorMetadata, VectorRecord};
use dashmap::DashMap;
use std::cmp::Ordering;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("dense index unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatch {
    pub id: String,
    pub score: f32,
    pub values: Vec<f32>,
    pub metadata: Option<VectorMetadata>,
}

/// ANN index contract: cosine metric, fixed dimension, one namespace per
/// tenant. Upserts are idempotent by record id.
#[async_trait]
pub trait DenseIndex: Send + Sync {
    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> Result<usize, IndexError>;
    async fn delete_by_document(
        &self,
        namespace: &str,
        document_id: Uuid,
    ) -> Result<usize, IndexError>;
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        document_id: Option<Uuid>,
        include_metadata: bool,
    ) -> Result<Vec<DenseMatch>, IndexError>;
    /// Record count, optionally filtered by document. Health/test hook.
    async fn count(&self, namespace: &str, document_id: Option<Uuid>) -> Result<usize, IndexError>;
}

/// Exact-scan reference implementation. The production index is an external
/// collaborator; this one exists so the pipelines are testable end to end.
pub struct MemoryDenseIndex {
    dimension: usize,
    namespaces: DashMap<String, HashMap<String, VectorRecord>>,
}

impl MemoryDenseIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            namespaces: DashMap::new(),
        }
    }
}

#[async_trait]
impl DenseIndex for MemoryDenseIndex {
    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> Result<usize, IndexError> {
        for record in &records {
            if record.values.len() != self.dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: self.dimension,
                    actual: record.values.len(),
                });
            }
        }
        let mut space = self.namespaces.entry(namespace.to_string()).or_default();
        let count = records.len();
        for record in records {
            space.insert(record.id.clone(), record);
        }
        Ok(count)
    }

    async fn delete_by_document(
        &self,
        namespace: &str,
        document_id: Uuid,
    ) -> Result<usize, IndexError> {
        let Some(mut space) = self.namespaces.get_mut(namespace) else {
            return Ok(0);
        };
        let before = space.len();
        space.retain(|_, record| record.metadata.document_id != document_id);
        Ok(before - space.len())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        document_id: Option<Uuid>,
        include_metadata: bool,
    ) -> Result<Vec<DenseMatch>, IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        let Some(space) = self.namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<DenseMatch> = space
            .values()
            .filter(|record| {
                document_id
                    .map(|filter| record.metadata.document_id == filter)
                    .unwrap_or(true)
            })
            .map(|record| DenseMatch {
                id: record.id.clone(),
                score: cosine_similarity(vector, &record.values),
                values: record.values.clone(),
                metadata: include_metadata.then(|| record.metadata.clone()),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn count(&self, namespace: &str, document_id: Option<Uuid>) -> Result<usize, IndexError> {
        let Some(space) = self.namespaces.get(namespace) else {
            return Ok(0);
        };
        Ok(space
            .values()
            .filter(|record| {
                document_id
                    .map(|filter| record.metadata.document_id == filter)
                    .unwrap_or(true)
            })
            .count())
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    dot / (norm_a * norm_b + 1e-8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ns_doc: Uuid, index: usize, values: Vec<f32>, tenant: &str) -> VectorRecord {
        VectorRecord {
            id: format!("{ns_doc}#{index}"),
            values: values.clone(),
            metadata: VectorMetadata {
                chunk_id: Uuid::new_v4(),
                document_id: ns_doc,
                tenant_id: tenant.to_string(),
                chunk_index: index,
                content: format!("chunk {index}"),
                content_hash: format!("hash-{index}"),
                section_title: None,
                page_number: None,
                filename: None,
            },
        }
    }

    #[tokio::test]
    async fn query_ranks_by_cosine_within_namespace() {
        let index = MemoryDenseIndex::new(3);
        let doc = Uuid::new_v4();
        index
            .upsert(
                "tenant-a",
                vec![
                    record(doc, 0, vec![1.0, 0.0, 0.0], "tenant-a"),
                    record(doc, 1, vec![0.0, 1.0, 0.0], "tenant-a"),
                ],
            )
            .await
            .unwrap();

        let matches = index
            .query("tenant-a", &[1.0, 0.1, 0.0], 10, None, true)
            .await
            .unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, format!("{doc}#0"));
        assert!(matches[0].score > matches[1].score);
        assert!(matches[0].metadata.is_some());
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let index = MemoryDenseIndex::new(2);
        let doc = Uuid::new_v4();
        index
            .upsert("tenant-a", vec![record(doc, 0, vec![1.0, 0.0], "tenant-a")])
            .await
            .unwrap();

        let other = index
            .query("tenant-b", &[1.0, 0.0], 10, None, false)
            .await
            .unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn upsert_is_idempotent_and_delete_filters_by_document() {
        let index = MemoryDenseIndex::new(2);
        let doc_a = Uuid::new_v4();
        let doc_b = Uuid::new_v4();
        let batch = vec![
            record(doc_a, 0, vec![1.0, 0.0], "t"),
            record(doc_a, 1, vec![0.0, 1.0], "t"),
            record(doc_b, 0, vec![0.5, 0.5], "t"),
        ];
        index.upsert("t", batch.clone()).await.unwrap();
        index.upsert("t", batch).await.unwrap();

        assert_eq!(index.count("t", None).await.unwrap(), 3);
        let removed = index.delete_by_document("t", doc_a).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(index.count("t", Some(doc_b)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let index = MemoryDenseIndex::new(4);
        let err = index.query("t", &[1.0, 0.0], 5, None, false).await;
        assert!(matches!(err, Err(IndexError::DimensionMismatch { .. })));
    }
}
