use corpora_core::model::TokenUsage;
use providers::{
    retry_transient, Generation, GenerationParams, GeneratorProvider, ProviderError, RetryPolicy,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq)]
pub struct AnswerDraft {
    pub answer: String,
    pub usage: Option<TokenUsage>,
    pub latency_ms: f64,
    pub model: String,
}

/// Per-call knobs the load shedder adjusts; everything else comes from the
/// service configuration.
#[derive(Debug, Clone, Copy)]
pub struct GenerationOverrides {
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

/// Wraps the external generator with transient-error retries (1s, 2s, 4s)
/// and a per-attempt deadline. Fatal provider errors pass through untouched
/// so the orchestrator can map them.
pub struct GeneratorService {
    provider: Arc<dyn GeneratorProvider>,
    retry: RetryPolicy,
}

impl GeneratorService {
    pub fn new(provider: Arc<dyn GeneratorProvider>) -> Self {
        Self {
            provider,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    pub async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        overrides: GenerationOverrides,
    ) -> Result<AnswerDraft, ProviderError> {
        let params = GenerationParams {
            temperature: overrides.temperature,
            max_output_tokens: overrides.max_output_tokens,
            timeout: overrides.timeout,
        };

        let started = Instant::now();
        let result = retry_transient(&self.retry, || {
            self.call_once(system_prompt, user_prompt, &params)
        })
        .await;

        match result {
            Ok(generation) => {
                info!(
                    model = %generation.model,
                    latency_ms = generation.latency_ms as u64,
                    completion_tokens = generation.usage.completion_tokens,
                    "generation complete"
                );
                Ok(into_draft(generation, started))
            }
            Err(err) => {
                error!(error = %err, transient = err.is_transient(), "generation failed");
                Err(err)
            }
        }
    }

    async fn call_once(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        params: &GenerationParams,
    ) -> Result<Generation, ProviderError> {
        match tokio::time::timeout(
            params.timeout,
            self.provider.generate(system_prompt, user_prompt, params),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::DeadlineExceeded(format!(
                "generator exceeded {}s",
                params.timeout.as_secs()
            ))),
        }
    }
}

fn into_draft(generation: Generation, started: Instant) -> AnswerDraft {
    AnswerDraft {
        answer: generation.text,
        usage: Some(generation.usage),
        latency_ms: started.elapsed().as_secs_f64() * 1_000.0,
        model: generation.model,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn overrides() -> GenerationOverrides {
        GenerationOverrides {
            max_output_tokens: 2_048,
            temperature: 0.7,
            timeout: Duration::from_secs(60),
        }
    }

    struct FlakyGenerator {
        failures: AtomicU32,
    }

    #[async_trait]
    impl GeneratorProvider for FlakyGenerator {
        async fn generate(
            &self,
            _system: &str,
            _user: &str,
            _params: &GenerationParams,
        ) -> Result<Generation, ProviderError> {
            if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
                return Err(ProviderError::Unavailable("brownout".into()));
            }
            Ok(Generation {
                text: "Recovered [Source 1].".to_string(),
                usage: TokenUsage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                },
                latency_ms: 1.0,
                model: "m".to_string(),
            })
        }

        fn model(&self) -> &str {
            "m"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_to_success() {
        let service = GeneratorService::new(Arc::new(FlakyGenerator {
            failures: AtomicU32::new(2),
        }));

        let draft = service.generate("s", "u", overrides()).await.unwrap();
        assert_eq!(draft.answer, "Recovered [Source 1].");
        assert_eq!(draft.usage.unwrap().total_tokens, 15);
    }

    struct InvalidRequestGenerator;

    #[async_trait]
    impl GeneratorProvider for InvalidRequestGenerator {
        async fn generate(
            &self,
            _system: &str,
            _user: &str,
            _params: &GenerationParams,
        ) -> Result<Generation, ProviderError> {
            Err(ProviderError::InvalidArgument("prompt rejected".into()))
        }

        fn model(&self) -> &str {
            "m"
        }
    }

    #[tokio::test]
    async fn fatal_errors_pass_through_without_retries() {
        let service = GeneratorService::new(Arc::new(InvalidRequestGenerator));
        let err = service.generate("s", "u", overrides()).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidArgument(_)));
    }

    struct HangingGenerator;

    #[async_trait]
    impl GeneratorProvider for HangingGenerator {
        async fn generate(
            &self,
            _system: &str,
            _user: &str,
            _params: &GenerationParams,
        ) -> Result<Generation, ProviderError> {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
            unreachable!("the deadline fires first");
        }

        fn model(&self) -> &str {
            "m"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hung_calls_hit_the_deadline() {
        let service = GeneratorService::new(Arc::new(HangingGenerator)).with_retry(RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        });

        let err = service
            .generate(
                "s",
                "u",
                GenerationOverrides {
                    timeout: Duration::from_secs(5),
                    ..overrides()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::DeadlineExceeded(_)));
    }
}
