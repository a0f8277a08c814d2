use corpora_core::config::BreakerConfig;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
#[error("circuit breaker '{name}' is open")]
pub struct CircuitOpenError {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_times: VecDeque<Instant>,
    success_count: usize,
    opened_at: Option<Instant>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failures_in_window: usize,
    pub success_count: usize,
}

/// Circuit breaker guarding the generator. CLOSED counts failures in a
/// rolling window and opens at the threshold; OPEN rejects until the timeout
/// elapses, then HALF_OPEN admits probes and closes after enough consecutive
/// successes. Any HALF_OPEN failure reopens immediately.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_times: VecDeque::new(),
                success_count: 0,
                opened_at: None,
            }),
        }
    }

    /// Gate check before calling the protected dependency. Handles the
    /// OPEN → HALF_OPEN transition when the recovery timeout has elapsed.
    pub async fn acquire(&self) -> Result<(), CircuitOpenError> {
        let mut state = self.state.lock().await;

        if state.state == CircuitState::Open {
            let elapsed = state
                .opened_at
                .map(|at| at.elapsed())
                .unwrap_or(Duration::ZERO);
            if elapsed >= Duration::from_secs(self.config.timeout_secs) {
                state.state = CircuitState::HalfOpen;
                state.success_count = 0;
                info!(name = %self.name, "circuit breaker entering half-open");
            } else {
                warn!(name = %self.name, "circuit breaker open, rejecting call");
                return Err(CircuitOpenError {
                    name: self.name.clone(),
                });
            }
        }

        Ok(())
    }

    pub async fn record_success(&self) {
        let mut state = self.state.lock().await;
        if state.state == CircuitState::HalfOpen {
            state.success_count += 1;
            if state.success_count >= self.config.success_threshold {
                state.state = CircuitState::Closed;
                state.failure_times.clear();
                state.success_count = 0;
                state.opened_at = None;
                info!(name = %self.name, "circuit breaker closed");
            }
        }
    }

    pub async fn record_failure(&self) {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        state.failure_times.push_back(now);
        prune_window(&mut state.failure_times, self.config.window_secs);

        match state.state {
            CircuitState::HalfOpen => {
                state.state = CircuitState::Open;
                state.opened_at = Some(now);
                state.success_count = 0;
                warn!(name = %self.name, "circuit breaker reopened from half-open");
            }
            CircuitState::Closed => {
                if state.failure_times.len() >= self.config.failure_threshold {
                    state.state = CircuitState::Open;
                    state.opened_at = Some(now);
                    error!(
                        name = %self.name,
                        failures = state.failure_times.len(),
                        threshold = self.config.failure_threshold,
                        "circuit breaker opened"
                    );
                }
            }
            CircuitState::Open => {}
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.state.lock().await.state
    }

    pub async fn snapshot(&self) -> BreakerSnapshot {
        let mut state = self.state.lock().await;
        prune_window(&mut state.failure_times, self.config.window_secs);
        BreakerSnapshot {
            name: self.name.clone(),
            state: state.state,
            failures_in_window: state.failure_times.len(),
            success_count: state.success_count,
        }
    }

    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.state = CircuitState::Closed;
        state.failure_times.clear();
        state.success_count = 0;
        state.opened_at = None;
        info!(name = %self.name, "circuit breaker manually reset");
    }
}

fn prune_window(failure_times: &mut VecDeque<Instant>, window_secs: u64) {
    let window = Duration::from_secs(window_secs);
    while let Some(oldest) = failure_times.front() {
        if oldest.elapsed() > window {
            failure_times.pop_front();
        } else {
            break;
        }
    }
}
