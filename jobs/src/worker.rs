use crate::queue::Job;
use corpora_core::metrics::MetricsCollector;
use ingestion::{DocumentProcessor, IngestError};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Retry schedule for failed ingestion attempts: exponential backoff with
/// jitter, base 1s, capped at 8s, at most three retries before the document
/// is marked FAILED.
#[derive(Debug, Clone)]
pub struct RetrySchedule {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetrySchedule {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_millis() as u64 * 2u64.pow(attempt);
        let capped = exp.min(self.max_delay.as_millis() as u64);
        let jitter = rand::rng().random_range(0..=capped / 4);
        Duration::from_millis(capped + jitter)
    }
}

/// Background ingestion worker. Each worker owns one document at a time; the
/// shared receiver is the concurrency limit's hand-off point.
pub struct Worker {
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    processor: Arc<DocumentProcessor>,
    schedule: RetrySchedule,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Worker {
    pub fn new(
        receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
        processor: Arc<DocumentProcessor>,
        schedule: RetrySchedule,
    ) -> Self {
        Self {
            receiver,
            processor,
            schedule,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn run(self) {
        info!("ingestion worker started");
        loop {
            let job = {
                let mut receiver = self.receiver.lock().await;
                receiver.recv().await
            };
            let Some(job) = job else {
                break;
            };

            match job {
                Job::ProcessDocument {
                    tenant_id,
                    document_id,
                } => {
                    self.process_with_retries(&tenant_id, document_id).await;
                }
            }
        }
        info!("ingestion worker stopped");
    }

    async fn process_with_retries(&self, tenant_id: &str, document_id: Uuid) {
        let mut attempt = 0u32;
        loop {
            match self.processor.process(tenant_id, document_id).await {
                Ok(report) => {
                    info!(
                        document_id = %document_id,
                        chunks = report.chunks,
                        attempt,
                        "document processed"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_document_completed(report.chunks as u64);
                    }
                    return;
                }
                Err(IngestError::DocumentNotFound(_)) => {
                    // Nothing to retry against; the upload never landed.
                    error!(document_id = %document_id, "document missing, dropping job");
                    return;
                }
                Err(err) if attempt < self.schedule.max_retries => {
                    let delay = self.schedule.delay_for_attempt(attempt);
                    warn!(
                        document_id = %document_id,
                        attempt = attempt + 1,
                        max_retries = self.schedule.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "ingestion attempt failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    error!(
                        document_id = %document_id,
                        attempts = attempt + 1,
                        error = %err,
                        "retry budget exhausted, marking document FAILED"
                    );
                    self.processor.mark_failed(tenant_id, document_id).await;
                    if let Some(metrics) = &self.metrics {
                        metrics.record_document_failed();
                    }
                    return;
                }
            }
        }
    }
}

/// Spawns a pool of `count` workers over one queue. Pool size is the
/// ingestion concurrency limit.
pub fn spawn_workers(
    count: usize,
    queue_capacity: usize,
    processor: Arc<DocumentProcessor>,
    schedule: RetrySchedule,
) -> (mpsc::Sender<Job>, Vec<JoinHandle<()>>) {
    let (sender, receiver) = mpsc::channel(queue_capacity);
    let receiver = Arc::new(Mutex::new(receiver));

    let handles = (0..count.max(1))
        .map(|_| {
            let worker = Worker::new(receiver.clone(), processor.clone(), schedule.clone());
            tokio::spawn(worker.run())
        })
        .collect();

    (sender, handles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_exponential_and_capped() {
        let schedule = RetrySchedule::default();
        let first = schedule.delay_for_attempt(0);
        let third = schedule.delay_for_attempt(2);
        let tenth = schedule.delay_for_attempt(9);

        assert!(first >= Duration::from_secs(1));
        assert!(third >= Duration::from_secs(4));
        // Cap plus jitter headroom.
        assert!(tenth <= Duration::from_secs(10));
    }
}
