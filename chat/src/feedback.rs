use crate::dsl::{FeedbackRequest, FeedbackResponse};
use chrono::Utc;
use corpora_core::error::ChatError;
use corpora_core::model::ChatFeedback;
use std::sync::Arc;
use storage::RowStore;
use tracing::info;
use uuid::Uuid;

/// Feedback intake: the interaction must exist and belong to the submitting
/// tenant; resubmission replaces the previous rating and comment.
pub struct FeedbackService {
    rows: Arc<dyn RowStore>,
}

impl FeedbackService {
    pub fn new(rows: Arc<dyn RowStore>) -> Self {
        Self { rows }
    }

    pub async fn submit(&self, request: FeedbackRequest) -> Result<FeedbackResponse, ChatError> {
        let interaction_id = request
            .validate()
            .map_err(|err| ChatError::InvalidInput(err.to_string()))?;

        // Tenant-scoped lookup doubles as the ownership check.
        let interaction = self
            .rows
            .interaction(&request.tenant_id, interaction_id)
            .await
            .map_err(|err| ChatError::Internal(err.to_string()))?;
        if interaction.is_none() {
            return Err(ChatError::UnknownInteraction(interaction_id));
        }

        let stored = self
            .rows
            .upsert_feedback(ChatFeedback {
                id: Uuid::new_v4(),
                interaction_id,
                rating: request.rating,
                comment: request.comment.clone(),
                created_at: Utc::now(),
            })
            .await
            .map_err(|err| ChatError::Internal(err.to_string()))?;

        info!(
            feedback_id = %stored.id,
            interaction_id = %interaction_id,
            rating = stored.rating,
            "feedback recorded"
        );

        Ok(FeedbackResponse {
            success: true,
            message: "Feedback recorded".to_string(),
            feedback_id: Some(stored.id.to_string()),
        })
    }
}
