use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

const MAX_QUERY_CHARS: usize = 10_000;
const MAX_TENANT_CHARS: usize = 255;
const MAX_TOP_K: usize = 20;
const MAX_COMMENT_CHARS: usize = 2_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestValidationError {
    #[error("query must be between 1 and {MAX_QUERY_CHARS} characters")]
    InvalidQueryLength,
    #[error("tenant_id must be between 1 and {MAX_TENANT_CHARS} characters")]
    InvalidTenantId,
    #[error("top_k must be between 1 and {MAX_TOP_K}")]
    InvalidTopK,
    #[error("document_id must be a valid UUID")]
    InvalidDocumentId,
    #[error("interaction_id must be a valid UUID")]
    InvalidInteractionId,
    #[error("rating must be between 1 and 5")]
    InvalidRating,
    #[error("comment must be at most {MAX_COMMENT_CHARS} characters")]
    InvalidComment,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChatRequest {
    pub query: String,
    pub tenant_id: String,
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

const fn default_top_k() -> usize {
    5
}

impl ChatRequest {
    pub fn new(query: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            tenant_id: tenant_id.into(),
            document_id: None,
            top_k: default_top_k(),
        }
    }

    pub fn parse_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn validate(&self) -> Result<(), RequestValidationError> {
        let query_chars = self.query.chars().count();
        if query_chars == 0 || query_chars > MAX_QUERY_CHARS {
            return Err(RequestValidationError::InvalidQueryLength);
        }
        let tenant_chars = self.tenant_id.chars().count();
        if tenant_chars == 0 || tenant_chars > MAX_TENANT_CHARS {
            return Err(RequestValidationError::InvalidTenantId);
        }
        if self.top_k == 0 || self.top_k > MAX_TOP_K {
            return Err(RequestValidationError::InvalidTopK);
        }
        if let Some(document_id) = &self.document_id {
            Uuid::parse_str(document_id)
                .map_err(|_| RequestValidationError::InvalidDocumentId)?;
        }
        Ok(())
    }

    /// The parsed document filter; call after `validate`.
    pub fn document_filter(&self) -> Option<Uuid> {
        self.document_id
            .as_deref()
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub source_number: u32,
    pub chunk_id: String,
    pub document_id: String,
    pub section_title: Option<String>,
    pub page_number: Option<u32>,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsageInfo {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub interaction_id: Option<String>,
    pub answer: String,
    pub citations: Vec<u32>,
    pub confidence: f32,
    pub sources: Vec<SourceInfo>,
    pub token_usage: Option<TokenUsageInfo>,
    pub latency_ms: f64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FeedbackRequest {
    pub interaction_id: String,
    pub tenant_id: String,
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
}

impl FeedbackRequest {
    pub fn validate(&self) -> Result<Uuid, RequestValidationError> {
        let interaction_id = Uuid::parse_str(&self.interaction_id)
            .map_err(|_| RequestValidationError::InvalidInteractionId)?;
        if !(1..=5).contains(&self.rating) {
            return Err(RequestValidationError::InvalidRating);
        }
        if let Some(comment) = &self.comment {
            if comment.chars().count() > MAX_COMMENT_CHARS {
                return Err(RequestValidationError::InvalidComment);
            }
        }
        Ok(interaction_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackResponse {
    pub success: bool,
    pub message: String,
    pub feedback_id: Option<String>,
}
