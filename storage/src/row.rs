use async_trait::async_trait;
use chrono::{DateTime, Utc};
use corpora_core::model::{Chunk, ChatFeedback, ChatInteraction, Document, DocumentStatus};
use dashmap::DashMap;
use std::cmp::Ordering;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Weights of the derived lexical search vector. Titles are the editorial
/// signal, so they outrank body text (Postgres setweight A/B defaults).
const TITLE_WEIGHT: f32 = 1.0;
const CONTENT_WEIGHT: f32 = 0.4;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    DocumentNotFound(Uuid),
    #[error("interaction not found: {0}")]
    InteractionNotFound(Uuid),
    #[error("row store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub content: String,
    pub score: f32,
    pub chunk_index: usize,
    pub section_title: Option<String>,
    pub page_number: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DailyUsage {
    pub total_tokens: u64,
    pub total_cost: f64,
}

/// Relational store contract. Every read is tenant-scoped; writers are
/// idempotent so ingestion stages can re-run safely.
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn insert_document(&self, document: Document) -> Result<(), StoreError>;
    async fn document(&self, tenant_id: &str, id: Uuid) -> Result<Option<Document>, StoreError>;
    async fn set_document_status(
        &self,
        tenant_id: &str,
        id: Uuid,
        status: DocumentStatus,
    ) -> Result<Document, StoreError>;
    async fn set_document_active(
        &self,
        tenant_id: &str,
        id: Uuid,
        is_active: bool,
    ) -> Result<Document, StoreError>;
    async fn delete_document(&self, tenant_id: &str, id: Uuid) -> Result<(), StoreError>;

    /// Bulk insert with `ON CONFLICT (document_id, chunk_index) DO NOTHING`
    /// semantics. Returns the number of rows actually inserted.
    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<usize, StoreError>;
    /// Rebuild the weighted lexical vector for every chunk of the document.
    async fn refresh_lexical_vectors(&self, document_id: Uuid) -> Result<usize, StoreError>;
    async fn chunks_by_document(
        &self,
        tenant_id: &str,
        document_id: Uuid,
    ) -> Result<Vec<Chunk>, StoreError>;
    /// Lookup restricted to chunks of retrievable documents (COMPLETED and
    /// active) owned by the tenant. The retriever relies on this predicate
    /// for both tenant isolation and status visibility.
    async fn visible_chunks_by_ids(
        &self,
        tenant_id: &str,
        ids: &[Uuid],
    ) -> Result<Vec<Chunk>, StoreError>;

    /// Length-normalized full-text search over the weighted lexical vectors.
    async fn lexical_search(
        &self,
        tenant_id: &str,
        query: &str,
        top_k: usize,
        document_id: Option<Uuid>,
    ) -> Result<Vec<LexicalHit>, StoreError>;

    async fn insert_interaction(
        &self,
        interaction: ChatInteraction,
    ) -> Result<ChatInteraction, StoreError>;
    async fn interaction(
        &self,
        tenant_id: &str,
        id: Uuid,
    ) -> Result<Option<ChatInteraction>, StoreError>;
    /// Token and cost totals for the tenant since the given instant.
    async fn usage_since(
        &self,
        tenant_id: &str,
        since: DateTime<Utc>,
    ) -> Result<DailyUsage, StoreError>;

    /// Zero-or-one feedback per interaction; resubmission replaces values.
    async fn upsert_feedback(&self, feedback: ChatFeedback) -> Result<ChatFeedback, StoreError>;
    async fn feedback_for_interaction(
        &self,
        interaction_id: Uuid,
    ) -> Result<Option<ChatFeedback>, StoreError>;
}

#[derive(Debug, Clone)]
struct LexicalVector {
    weights: HashMap<String, f32>,
    length_norm: f32,
}

/// In-memory reference implementation backing tests and local wiring. The
/// production counterpart is an external SQL store.
#[derive(Default)]
pub struct MemoryRowStore {
    documents: DashMap<Uuid, Document>,
    chunks: DashMap<Uuid, Chunk>,
    chunk_keys: DashMap<(Uuid, usize), Uuid>,
    lexical: DashMap<Uuid, LexicalVector>,
    interactions: DashMap<Uuid, ChatInteraction>,
    feedbacks: DashMap<Uuid, ChatFeedback>,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn owned_document(&self, tenant_id: &str, id: Uuid) -> Option<Document> {
        self.documents
            .get(&id)
            .filter(|doc| doc.tenant_id == tenant_id)
            .map(|doc| doc.clone())
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn insert_document(&self, document: Document) -> Result<(), StoreError> {
        self.documents.insert(document.id, document);
        Ok(())
    }

    async fn document(&self, tenant_id: &str, id: Uuid) -> Result<Option<Document>, StoreError> {
        Ok(self.owned_document(tenant_id, id))
    }

    async fn set_document_status(
        &self,
        tenant_id: &str,
        id: Uuid,
        status: DocumentStatus,
    ) -> Result<Document, StoreError> {
        let mut entry = self
            .documents
            .get_mut(&id)
            .filter(|doc| doc.tenant_id == tenant_id)
            .ok_or(StoreError::DocumentNotFound(id))?;
        entry.status = status;
        entry.updated_at = Utc::now();
        debug!(document_id = %id, status = %status, "document status updated");
        Ok(entry.clone())
    }

    async fn set_document_active(
        &self,
        tenant_id: &str,
        id: Uuid,
        is_active: bool,
    ) -> Result<Document, StoreError> {
        let mut entry = self
            .documents
            .get_mut(&id)
            .filter(|doc| doc.tenant_id == tenant_id)
            .ok_or(StoreError::DocumentNotFound(id))?;
        entry.is_active = is_active;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    async fn delete_document(&self, tenant_id: &str, id: Uuid) -> Result<(), StoreError> {
        let owned = self.owned_document(tenant_id, id).is_some();
        if !owned {
            return Err(StoreError::DocumentNotFound(id));
        }
        self.documents.remove(&id);
        let doomed: Vec<Uuid> = self
            .chunks
            .iter()
            .filter(|entry| entry.document_id == id)
            .map(|entry| entry.id)
            .collect();
        for chunk_id in doomed {
            if let Some((_, chunk)) = self.chunks.remove(&chunk_id) {
                self.chunk_keys.remove(&(chunk.document_id, chunk.chunk_index));
            }
            self.lexical.remove(&chunk_id);
        }
        Ok(())
    }

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<usize, StoreError> {
        let mut inserted = 0;
        for chunk in chunks {
            let key = (chunk.document_id, chunk.chunk_index);
            match self.chunk_keys.entry(key) {
                dashmap::mapref::entry::Entry::Occupied(_) => {}
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    slot.insert(chunk.id);
                    self.chunks.insert(chunk.id, chunk.clone());
                    inserted += 1;
                }
            }
        }
        Ok(inserted)
    }

    async fn refresh_lexical_vectors(&self, document_id: Uuid) -> Result<usize, StoreError> {
        let mut refreshed = 0;
        for chunk in self.chunks.iter() {
            if chunk.document_id != document_id {
                continue;
            }
            self.lexical.insert(chunk.id, build_lexical_vector(&chunk));
            refreshed += 1;
        }
        Ok(refreshed)
    }

    async fn chunks_by_document(
        &self,
        tenant_id: &str,
        document_id: Uuid,
    ) -> Result<Vec<Chunk>, StoreError> {
        let mut out: Vec<Chunk> = self
            .chunks
            .iter()
            .filter(|chunk| chunk.document_id == document_id && chunk.tenant_id == tenant_id)
            .map(|chunk| chunk.clone())
            .collect();
        out.sort_by_key(|chunk| chunk.chunk_index);
        Ok(out)
    }

    async fn visible_chunks_by_ids(
        &self,
        tenant_id: &str,
        ids: &[Uuid],
    ) -> Result<Vec<Chunk>, StoreError> {
        let mut out = Vec::new();
        for id in ids {
            let Some(chunk) = self.chunks.get(id) else {
                continue;
            };
            if chunk.tenant_id != tenant_id {
                continue;
            }
            let visible = self
                .documents
                .get(&chunk.document_id)
                .map(|doc| doc.tenant_id == tenant_id && doc.is_retrievable())
                .unwrap_or(false);
            if visible {
                out.push(chunk.clone());
            }
        }
        Ok(out)
    }

    async fn lexical_search(
        &self,
        tenant_id: &str,
        query: &str,
        top_k: usize,
        document_id: Option<Uuid>,
    ) -> Result<Vec<LexicalHit>, StoreError> {
        let terms = tokenize(query);
        if terms.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let mut hits = Vec::new();
        for entry in self.lexical.iter() {
            let chunk_id = *entry.key();
            let Some(chunk) = self.chunks.get(&chunk_id) else {
                continue;
            };
            if chunk.tenant_id != tenant_id {
                continue;
            }
            if let Some(filter) = document_id {
                if chunk.document_id != filter {
                    continue;
                }
            }
            let visible = self
                .documents
                .get(&chunk.document_id)
                .map(|doc| doc.tenant_id == tenant_id && doc.is_retrievable())
                .unwrap_or(false);
            if !visible {
                continue;
            }

            let raw: f32 = terms
                .iter()
                .filter_map(|term| entry.weights.get(term.as_str()))
                .sum();
            if raw <= 0.0 {
                continue;
            }
            let score = raw / entry.length_norm;
            hits.push(LexicalHit {
                chunk_id,
                document_id: chunk.document_id,
                content: chunk.content.clone(),
                score,
                chunk_index: chunk.chunk_index,
                section_title: chunk.section_title.clone(),
                page_number: chunk.page_number,
            });
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn insert_interaction(
        &self,
        interaction: ChatInteraction,
    ) -> Result<ChatInteraction, StoreError> {
        self.interactions.insert(interaction.id, interaction.clone());
        Ok(interaction)
    }

    async fn interaction(
        &self,
        tenant_id: &str,
        id: Uuid,
    ) -> Result<Option<ChatInteraction>, StoreError> {
        Ok(self
            .interactions
            .get(&id)
            .filter(|interaction| interaction.tenant_id == tenant_id)
            .map(|interaction| interaction.clone()))
    }

    async fn usage_since(
        &self,
        tenant_id: &str,
        since: DateTime<Utc>,
    ) -> Result<DailyUsage, StoreError> {
        let mut usage = DailyUsage::default();
        for interaction in self.interactions.iter() {
            if interaction.tenant_id != tenant_id || interaction.created_at < since {
                continue;
            }
            if let Some(tokens) = &interaction.usage {
                usage.total_tokens += u64::from(tokens.total_tokens);
            }
            if let Some(cost) = interaction.cost_estimate {
                usage.total_cost += cost;
            }
        }
        Ok(usage)
    }

    async fn upsert_feedback(&self, feedback: ChatFeedback) -> Result<ChatFeedback, StoreError> {
        let stored = match self.feedbacks.entry(feedback.interaction_id) {
            dashmap::mapref::entry::Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                existing.rating = feedback.rating;
                existing.comment = feedback.comment;
                existing.created_at = feedback.created_at;
                existing.clone()
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => slot.insert(feedback).clone(),
        };
        Ok(stored)
    }

    async fn feedback_for_interaction(
        &self,
        interaction_id: Uuid,
    ) -> Result<Option<ChatFeedback>, StoreError> {
        Ok(self
            .feedbacks
            .get(&interaction_id)
            .map(|feedback| feedback.clone()))
    }
}

fn build_lexical_vector(chunk: &Chunk) -> LexicalVector {
    let mut weights: HashMap<String, f32> = HashMap::new();
    if let Some(title) = &chunk.section_title {
        for term in tokenize(title) {
            *weights.entry(term).or_insert(0.0) += TITLE_WEIGHT;
        }
    }
    let content_terms = tokenize(&chunk.content);
    let length = content_terms.len().max(1) as f32;
    for term in content_terms {
        *weights.entry(term).or_insert(0.0) += CONTENT_WEIGHT;
    }

    LexicalVector {
        weights,
        length_norm: 1.0 + length.ln(),
    }
}

fn tokenize(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut buffer = String::new();

    for ch in text.chars().flat_map(|ch| ch.to_lowercase()) {
        if ch.is_alphanumeric() || ch == '_' {
            buffer.push(ch);
        } else if !buffer.is_empty() {
            out.push(std::mem::take(&mut buffer));
        }
    }
    if !buffer.is_empty() {
        out.push(buffer);
    }

    out
}
