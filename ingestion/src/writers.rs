use crate::embedding::EmbeddedChunk;
use corpora_core::model::{Document, VectorMetadata, VectorRecord};
use std::sync::Arc;
use storage::{DenseIndex, IndexError, RowStore, StoreError};
use tracing::{debug, info};
use uuid::Uuid;

/// Writes embedded chunks into the tenant's dense namespace. Record ids are
/// `<document_id>#<chunk_index>`, so re-running the stage upserts in place.
pub struct DenseWriter {
    index: Arc<dyn DenseIndex>,
    batch_size: usize,
}

impl DenseWriter {
    pub fn new(index: Arc<dyn DenseIndex>, batch_size: usize) -> Self {
        Self {
            index,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn write(
        &self,
        document: &Document,
        embedded: &[EmbeddedChunk],
    ) -> Result<usize, IndexError> {
        let records: Vec<VectorRecord> = embedded
            .iter()
            .map(|item| VectorRecord {
                id: item.chunk.vector_id(),
                values: item.embedding.clone(),
                metadata: VectorMetadata {
                    chunk_id: item.chunk.id,
                    document_id: item.chunk.document_id,
                    tenant_id: item.chunk.tenant_id.clone(),
                    chunk_index: item.chunk.chunk_index,
                    content: item.chunk.content.clone(),
                    content_hash: item.chunk.content_hash.clone(),
                    section_title: item.chunk.section_title.clone(),
                    page_number: item.chunk.page_number,
                    filename: Some(document.filename.clone()),
                },
            })
            .collect();

        let mut written = 0;
        for batch in records.chunks(self.batch_size) {
            written += self
                .index
                .upsert(&document.tenant_id, batch.to_vec())
                .await?;
            debug!(
                document_id = %document.id,
                batch = batch.len(),
                written,
                "dense batch upserted"
            );
        }

        info!(document_id = %document.id, vectors = written, "dense index write complete");
        Ok(written)
    }

    pub async fn delete_document(
        &self,
        tenant_id: &str,
        document_id: Uuid,
    ) -> Result<usize, IndexError> {
        self.index.delete_by_document(tenant_id, document_id).await
    }
}

/// Writes chunk rows with on-conflict-do-nothing semantics, then refreshes
/// the derived lexical vectors so full-text search sees the new rows.
pub struct RowWriter {
    rows: Arc<dyn RowStore>,
}

impl RowWriter {
    pub fn new(rows: Arc<dyn RowStore>) -> Self {
        Self { rows }
    }

    pub async fn write(&self, embedded: &[EmbeddedChunk]) -> Result<usize, StoreError> {
        let chunks: Vec<_> = embedded.iter().map(|item| item.chunk.clone()).collect();
        let inserted = self.rows.insert_chunks(&chunks).await?;

        if let Some(first) = chunks.first() {
            let refreshed = self.rows.refresh_lexical_vectors(first.document_id).await?;
            info!(
                document_id = %first.document_id,
                inserted,
                refreshed,
                "row index write complete"
            );
        }

        Ok(inserted)
    }
}
