use crate::error::ProviderError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Exponential backoff for transient provider failures: 1s, 2s, 4s by
/// default, with jitter, bounded by an optional overall deadline.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            deadline: None,
        }
    }
}

impl RetryPolicy {
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64 * self.backoff_factor.powi(attempt as i32);
        let jitter = rand::rng().random_range(0..=(base as u64 / 4).max(1));
        Duration::from_millis(base as u64 + jitter)
    }
}

/// Runs `op` until it succeeds, fails fatally, or the retry budget is spent.
/// Only transient errors are retried; the last error is returned verbatim.
pub async fn retry_transient<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let started = Instant::now();
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for_attempt(attempt);
                if let Some(deadline) = policy.deadline {
                    if started.elapsed() + delay >= deadline {
                        warn!(error = %err, "retry deadline exhausted");
                        return Err(err);
                    }
                }
                warn!(
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient provider failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
