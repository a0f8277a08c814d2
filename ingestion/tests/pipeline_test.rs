use corpora_core::config::ChunkingConfig;
use corpora_core::model::{Document, DocumentStatus, DocumentType};
use corpora_core::tokenizer::Tokenizer;
use ingestion::{
    DenseWriter, DocumentProcessor, EmbeddingService, IngestError, PlainTextSource, RowWriter,
    SemanticChunker,
};
use providers::{HashEmbedder, ProviderError, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;
use storage::{DenseIndex, MemoryDenseIndex, MemoryKvStore, MemoryRowStore, RowStore};

const DIMS: usize = 8;

fn processor(
    rows: Arc<MemoryRowStore>,
    dense: Arc<MemoryDenseIndex>,
    source: Arc<PlainTextSource>,
    embedder: Arc<dyn providers::EmbeddingProvider>,
) -> DocumentProcessor {
    let embedding = EmbeddingService::new(
        embedder,
        Arc::new(MemoryKvStore::new()),
        Duration::from_secs(7 * 24 * 60 * 60),
    )
    .with_retry(RetryPolicy {
        initial_delay: Duration::from_millis(1),
        ..RetryPolicy::default()
    });

    DocumentProcessor::new(
        rows.clone(),
        source,
        SemanticChunker::new(Tokenizer::new(), ChunkingConfig::default()),
        embedding,
        DenseWriter::new(dense, 100),
        RowWriter::new(rows),
    )
}

fn sample_text() -> String {
    let mut text = String::from("Architecture\n");
    text.push_str(&"The retrieval engine merges dense and lexical candidates before scoring. ".repeat(20));
    text.push_str("\n\nOperations\n");
    text.push_str(&"Workers advance each document through the ingestion stages in order. ".repeat(20));
    text
}

#[tokio::test]
async fn document_reaches_completed_with_matching_chunk_and_vector_counts() {
    let rows = Arc::new(MemoryRowStore::new());
    let dense = Arc::new(MemoryDenseIndex::new(DIMS));
    let source = Arc::new(PlainTextSource::new());

    let doc = Document::new("tenant-a", "arch.txt", "tenant-a/arch.txt", DocumentType::Txt);
    rows.insert_document(doc.clone()).await.unwrap();
    source.register(doc.id, sample_text());

    let processor = processor(
        rows.clone(),
        dense.clone(),
        source,
        Arc::new(HashEmbedder::new(DIMS)),
    );
    let report = processor.process("tenant-a", doc.id).await.unwrap();

    let stored = rows.document("tenant-a", doc.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DocumentStatus::Completed);
    assert!(report.chunks > 0);

    // Invariant: one vector record per persisted chunk and vice versa.
    let chunk_rows = rows.chunks_by_document("tenant-a", doc.id).await.unwrap();
    let vector_count = dense.count("tenant-a", Some(doc.id)).await.unwrap();
    assert_eq!(chunk_rows.len(), vector_count);
    assert_eq!(chunk_rows.len(), report.chunks);

    // Chunk indices form a contiguous prefix.
    for (expected, chunk) in chunk_rows.iter().enumerate() {
        assert_eq!(chunk.chunk_index, expected);
    }
}

#[tokio::test]
async fn reprocessing_a_document_is_idempotent() {
    let rows = Arc::new(MemoryRowStore::new());
    let dense = Arc::new(MemoryDenseIndex::new(DIMS));
    let source = Arc::new(PlainTextSource::new());

    let doc = Document::new("tenant-a", "notes.txt", "tenant-a/notes.txt", DocumentType::Txt);
    rows.insert_document(doc.clone()).await.unwrap();
    source.register(doc.id, sample_text());

    let processor = processor(
        rows.clone(),
        dense.clone(),
        source,
        Arc::new(HashEmbedder::new(DIMS)),
    );

    let first = processor.process("tenant-a", doc.id).await.unwrap();
    let chunks_after_first = rows.chunks_by_document("tenant-a", doc.id).await.unwrap();
    let vectors_after_first = dense.count("tenant-a", Some(doc.id)).await.unwrap();

    // Second run short-circuits on COMPLETED and changes nothing.
    processor.process("tenant-a", doc.id).await.unwrap();
    let chunks_after_second = rows.chunks_by_document("tenant-a", doc.id).await.unwrap();
    let vectors_after_second = dense.count("tenant-a", Some(doc.id)).await.unwrap();

    assert_eq!(chunks_after_first, chunks_after_second);
    assert_eq!(vectors_after_first, vectors_after_second);
    assert_eq!(first.chunks, chunks_after_second.len());
}

struct BrokenEmbedder;

#[async_trait::async_trait]
impl providers::EmbeddingProvider for BrokenEmbedder {
    async fn embed(
        &self,
        _texts: &[String],
        _task: providers::EmbeddingTask,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        Err(ProviderError::Unavailable("embedding endpoint down".into()))
    }

    fn dimension(&self) -> usize {
        DIMS
    }
}

#[tokio::test]
async fn embedding_outage_fails_the_stage_and_persists_no_partial_state() {
    let rows = Arc::new(MemoryRowStore::new());
    let dense = Arc::new(MemoryDenseIndex::new(DIMS));
    let source = Arc::new(PlainTextSource::new());

    let doc = Document::new("tenant-a", "bad.txt", "tenant-a/bad.txt", DocumentType::Txt);
    rows.insert_document(doc.clone()).await.unwrap();
    source.register(doc.id, sample_text());

    let processor = processor(rows.clone(), dense.clone(), source, Arc::new(BrokenEmbedder));
    let result = processor.process("tenant-a", doc.id).await;
    assert!(matches!(result, Err(IngestError::Embedding(_))));

    // The failure left the document mid-pipeline with nothing indexed.
    let stored = rows.document("tenant-a", doc.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DocumentStatus::Chunked);
    assert_eq!(dense.count("tenant-a", Some(doc.id)).await.unwrap(), 0);
    assert!(rows
        .chunks_by_document("tenant-a", doc.id)
        .await
        .unwrap()
        .is_empty());

    // The worker marks FAILED once the retry budget is gone.
    processor.mark_failed("tenant-a", doc.id).await;
    let stored = rows.document("tenant-a", doc.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DocumentStatus::Failed);
}

#[tokio::test]
async fn hard_delete_removes_rows_and_vectors_together() {
    let rows = Arc::new(MemoryRowStore::new());
    let dense = Arc::new(MemoryDenseIndex::new(DIMS));
    let source = Arc::new(PlainTextSource::new());

    let doc = Document::new("tenant-a", "gone.txt", "tenant-a/gone.txt", DocumentType::Txt);
    rows.insert_document(doc.clone()).await.unwrap();
    source.register(doc.id, sample_text());

    let processor = processor(
        rows.clone(),
        dense.clone(),
        source,
        Arc::new(HashEmbedder::new(DIMS)),
    );
    processor.process("tenant-a", doc.id).await.unwrap();
    assert!(dense.count("tenant-a", Some(doc.id)).await.unwrap() > 0);

    processor.delete_document("tenant-a", doc.id).await.unwrap();

    assert_eq!(dense.count("tenant-a", Some(doc.id)).await.unwrap(), 0);
    assert!(rows.document("tenant-a", doc.id).await.unwrap().is_none());
    assert!(rows
        .chunks_by_document("tenant-a", doc.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn unknown_document_is_rejected() {
    let rows = Arc::new(MemoryRowStore::new());
    let dense = Arc::new(MemoryDenseIndex::new(DIMS));
    let source = Arc::new(PlainTextSource::new());
    let processor = processor(rows, dense, source, Arc::new(HashEmbedder::new(DIMS)));

    let result = processor.process("tenant-a", uuid::Uuid::new_v4()).await;
    assert!(matches!(result, Err(IngestError::DocumentNotFound(_))));
}
