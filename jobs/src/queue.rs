use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Job {
    ProcessDocument { tenant_id: String, document_id: Uuid },
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue send failed: {0}")]
    Send(String),
}

#[async_trait::async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: Job) -> Result<(), QueueError>;
}

/// Simple in-memory queue using Tokio channels.
pub struct ChannelJobQueue {
    sender: mpsc::Sender<Job>,
}

impl ChannelJobQueue {
    pub fn new(sender: mpsc::Sender<Job>) -> Self {
        Self { sender }
    }
}

#[async_trait::async_trait]
impl JobQueue for ChannelJobQueue {
    async fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        self.sender
            .send(job)
            .await
            .map_err(|e| QueueError::Send(e.to_string()))
    }
}
