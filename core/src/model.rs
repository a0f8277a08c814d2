use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use uuid::Uuid;

/// SHA-256 of the trimmed content, hex-encoded. Identical content across
/// documents yields the same hash, which the embedding cache exploits.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.trim().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Pdf,
    Docx,
    Pptx,
    Txt,
}

impl DocumentType {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(DocumentType::Pdf),
            "docx" => Some(DocumentType::Docx),
            "pptx" => Some(DocumentType::Pptx),
            "txt" => Some(DocumentType::Txt),
            _ => None,
        }
    }
}

/// Ingestion state machine. The enumeration is part of the external
/// contract and serializes exactly as these names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Uploaded,
    Processing,
    Parsed,
    Chunked,
    Embedded,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Completed | DocumentStatus::Failed)
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DocumentStatus::Uploaded => "UPLOADED",
            DocumentStatus::Processing => "PROCESSING",
            DocumentStatus::Parsed => "PARSED",
            DocumentStatus::Chunked => "CHUNKED",
            DocumentStatus::Embedded => "EMBEDDED",
            DocumentStatus::Completed => "COMPLETED",
            DocumentStatus::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub tenant_id: String,
    pub filename: String,
    pub storage_path: String,
    pub doc_type: DocumentType,
    pub version: u32,
    pub is_active: bool,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(
        tenant_id: impl Into<String>,
        filename: impl Into<String>,
        storage_path: impl Into<String>,
        doc_type: DocumentType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            filename: filename.into(),
            storage_path: storage_path.into(),
            doc_type,
            version: 1,
            is_active: true,
            status: DocumentStatus::Uploaded,
            created_at: now,
            updated_at: now,
        }
    }

    /// A document participates in retrieval only once fully indexed.
    pub fn is_retrievable(&self) -> bool {
        self.is_active && self.status == DocumentStatus::Completed
    }
}

/// Transient value emitted by a document parser; never persisted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ParsedSection {
    pub section_title: Option<String>,
    pub content: String,
    pub page_number: Option<u32>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ParsedSection {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub tenant_id: String,
    /// 0-based, contiguous per document.
    pub chunk_index: usize,
    pub content: String,
    pub content_hash: String,
    pub token_count: usize,
    pub section_title: Option<String>,
    pub page_number: Option<u32>,
    pub parent_section_id: String,
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    /// Id of the paired record in the dense index.
    pub fn vector_id(&self) -> String {
        format!("{}#{}", self.document_id, self.chunk_index)
    }
}

/// Metadata mirror stored alongside the dense vector so retrieval can serve
/// results without a row-store round trip. `created_at` is deliberately
/// absent: recency is always read from the row store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub tenant_id: String,
    pub chunk_index: usize,
    pub content: String,
    pub content_hash: String,
    pub section_title: Option<String>,
    pub page_number: Option<u32>,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: VectorMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Append-only record of a successfully answered request. The id is handed
/// back to the caller so feedback can bind to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatInteraction {
    pub id: Uuid,
    pub tenant_id: String,
    pub query: String,
    pub answer: String,
    pub confidence: f32,
    pub citation_count: u32,
    pub latency_ms: f64,
    pub retrieval_latency_ms: f64,
    pub generation_latency_ms: f64,
    pub usage: Option<TokenUsage>,
    pub model_name: String,
    pub cost_estimate: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Zero-or-one per interaction; resubmission replaces prior values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatFeedback {
    pub id: Uuid,
    pub interaction_id: Uuid,
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}
