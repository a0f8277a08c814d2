use crate::error::ProviderError;
use async_trait::async_trait;
use corpora_core::model::TokenUsage;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub timeout: Duration,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_output_tokens: 2_048,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub usage: TokenUsage,
    pub latency_ms: f64,
    pub model: String,
}

#[async_trait]
pub trait GeneratorProvider: Send + Sync {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        params: &GenerationParams,
    ) -> Result<Generation, ProviderError>;

    fn model(&self) -> &str;
}

/// Reference generator that returns a fixed answer text. Used for local
/// wiring and tests; usage numbers are derived from prompt sizes so cost
/// accounting stays exercised.
pub struct CannedGenerator {
    model: String,
    answer: String,
}

impl CannedGenerator {
    pub fn new(model: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            answer: answer.into(),
        }
    }
}

impl Default for CannedGenerator {
    fn default() -> Self {
        Self::new(
            "generator-default-v1",
            "The sources describe the requested topic [Source 1].",
        )
    }
}

#[async_trait]
impl GeneratorProvider for CannedGenerator {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        params: &GenerationParams,
    ) -> Result<Generation, ProviderError> {
        let started = Instant::now();
        let prompt_tokens = ((system_prompt.len() + user_prompt.len()) / 4) as u32;
        let completion_tokens = ((self.answer.len() / 4) as u32).min(params.max_output_tokens);

        Ok(Generation {
            text: self.answer.clone(),
            usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
            latency_ms: started.elapsed().as_secs_f64() * 1_000.0,
            model: self.model.clone(),
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn canned_generator_reports_usage_and_model() {
        let generator = CannedGenerator::default();
        let out = generator
            .generate("system", "user prompt text", &GenerationParams::default())
            .await
            .unwrap();

        assert!(out.text.contains("[Source 1]"));
        assert_eq!(out.model, "generator-default-v1");
        assert_eq!(
            out.usage.total_tokens,
            out.usage.prompt_tokens + out.usage.completion_tokens
        );
    }

    #[tokio::test]
    async fn completion_tokens_respect_the_output_cap() {
        let generator = CannedGenerator::new("m", "x".repeat(4_096));
        let params = GenerationParams {
            max_output_tokens: 10,
            ..GenerationParams::default()
        };
        let out = generator.generate("s", "u", &params).await.unwrap();
        assert_eq!(out.usage.completion_tokens, 10);
    }
}
