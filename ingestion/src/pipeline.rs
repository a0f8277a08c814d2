use crate::chunker::SemanticChunker;
use crate::embedding::{EmbedError, EmbeddingService};
use crate::hierarchy;
use crate::parse::{ParseError, SectionSource};
use crate::writers::{DenseWriter, RowWriter};
use corpora_core::model::{Document, DocumentStatus};
use dashmap::DashMap;
use providers::EmbeddingTask;
use std::sync::Arc;
use storage::{IndexError, RowStore, StoreError};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("document not found: {0}")]
    DocumentNotFound(Uuid),
    #[error("document {0} is already being processed")]
    AlreadyInFlight(Uuid),
    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedError),
    #[error("row store failed: {0}")]
    Store(#[from] StoreError),
    #[error("dense index failed: {0}")]
    Index(#[from] IndexError),
    #[error("integrity violation: {0}")]
    Integrity(String),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct IngestReport {
    pub document_id: Uuid,
    pub sections: usize,
    pub chunks: usize,
    pub vectors_written: usize,
    pub rows_inserted: usize,
}

/// Owns the ingestion state machine. Stages run strictly in order and every
/// transition is persisted before the next stage starts, so a crashed worker
/// resumes from a consistent status. Re-entry with unchanged inputs is
/// idempotent end to end: chunk ids differ per run but vector ids and row
/// keys are derived from `(document_id, chunk_index)`.
pub struct DocumentProcessor {
    rows: Arc<dyn RowStore>,
    source: Arc<dyn SectionSource>,
    chunker: SemanticChunker,
    embedding: EmbeddingService,
    dense_writer: DenseWriter,
    row_writer: RowWriter,
    in_flight: DashMap<Uuid, ()>,
}

impl DocumentProcessor {
    pub fn new(
        rows: Arc<dyn RowStore>,
        source: Arc<dyn SectionSource>,
        chunker: SemanticChunker,
        embedding: EmbeddingService,
        dense_writer: DenseWriter,
        row_writer: RowWriter,
    ) -> Self {
        Self {
            rows,
            source,
            chunker,
            embedding,
            dense_writer,
            row_writer,
            in_flight: DashMap::new(),
        }
    }

    pub async fn process(
        &self,
        tenant_id: &str,
        document_id: Uuid,
    ) -> Result<IngestReport, IngestError> {
        // The queue guarantees single ownership per document; this guard
        // catches misconfigured double-enqueues.
        let _guard = InFlightGuard::acquire(&self.in_flight, document_id)
            .ok_or(IngestError::AlreadyInFlight(document_id))?;

        let document = self
            .rows
            .document(tenant_id, document_id)
            .await?
            .ok_or(IngestError::DocumentNotFound(document_id))?;

        if document.status == DocumentStatus::Completed {
            info!(document_id = %document_id, "document already completed, skipping");
            let chunks = self.rows.chunks_by_document(tenant_id, document_id).await?;
            return Ok(IngestReport {
                document_id,
                sections: 0,
                chunks: chunks.len(),
                vectors_written: 0,
                rows_inserted: 0,
            });
        }

        self.transition(tenant_id, document_id, DocumentStatus::Processing)
            .await?;

        // Parse.
        let sections = self.source.sections(&document).await?;
        self.transition(tenant_id, document_id, DocumentStatus::Parsed)
            .await?;

        // Chunk.
        let chunks = self.chunker.chunk_document(&document, &sections);
        if !hierarchy::validate(&chunks, sections.len()) {
            return Err(IngestError::Integrity(format!(
                "chunk hierarchy invalid for document {document_id}"
            )));
        }
        self.transition(tenant_id, document_id, DocumentStatus::Chunked)
            .await?;

        // Embed.
        let embedded = self
            .embedding
            .embed_chunks(&chunks, EmbeddingTask::RetrievalDocument)
            .await?;
        if embedded.len() != chunks.len() {
            return Err(IngestError::Integrity(format!(
                "embedded {} of {} chunks for document {}",
                embedded.len(),
                chunks.len(),
                document_id
            )));
        }
        self.transition(tenant_id, document_id, DocumentStatus::Embedded)
            .await?;

        // Index: dense first, then rows with the derived lexical vectors.
        let vectors_written = self.dense_writer.write(&document, &embedded).await?;
        let rows_inserted = self.row_writer.write(&embedded).await?;
        self.transition(tenant_id, document_id, DocumentStatus::Completed)
            .await?;

        info!(
            document_id = %document_id,
            sections = sections.len(),
            chunks = chunks.len(),
            vectors_written,
            rows_inserted,
            "document ingestion complete"
        );

        Ok(IngestReport {
            document_id,
            sections: sections.len(),
            chunks: chunks.len(),
            vectors_written,
            rows_inserted,
        })
    }

    /// Hard delete: drops the dense vectors by document filter, then the
    /// rows (chunks cascade with the document). Soft retirement is
    /// `RowStore::set_document_active(false)` instead.
    pub async fn delete_document(
        &self,
        tenant_id: &str,
        document_id: Uuid,
    ) -> Result<(), IngestError> {
        let removed = self
            .dense_writer
            .delete_document(tenant_id, document_id)
            .await?;
        self.rows.delete_document(tenant_id, document_id).await?;
        info!(document_id = %document_id, vectors_removed = removed, "document deleted");
        Ok(())
    }

    /// Marks the document permanently failed. Called by the worker after the
    /// retry budget is exhausted.
    pub async fn mark_failed(&self, tenant_id: &str, document_id: Uuid) {
        if let Err(err) = self
            .rows
            .set_document_status(tenant_id, document_id, DocumentStatus::Failed)
            .await
        {
            warn!(document_id = %document_id, error = %err, "failed to mark document FAILED");
        }
    }

    async fn transition(
        &self,
        tenant_id: &str,
        document_id: Uuid,
        status: DocumentStatus,
    ) -> Result<(), IngestError> {
        self.rows
            .set_document_status(tenant_id, document_id, status)
            .await?;
        Ok(())
    }
}

struct InFlightGuard<'a> {
    map: &'a DashMap<Uuid, ()>,
    id: Uuid,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(map: &'a DashMap<Uuid, ()>, id: Uuid) -> Option<Self> {
        match map.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => None,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(());
                Some(Self { map, id })
            }
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.map.remove(&self.id);
    }
}
