use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    pub overlap: usize,
    pub min_chunk_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: 500,
            overlap: 100,
            min_chunk_tokens: 50,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
    pub cache_ttl_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "embedding-default-v1".to_string(),
            dimension: 768,
            cache_ttl_secs: 7 * 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub vector_top_k: usize,
    pub lexical_top_k: usize,
    pub recency_decay_days: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_top_k: 50,
            lexical_top_k: 20,
            recency_decay_days: 365.0,
        }
    }
}

/// Per-model pricing, USD per million tokens. Pricing is configuration, not
/// a data-model fact; matching is by substring on the model name.
#[derive(Debug, Deserialize, Clone)]
pub struct ModelPrice {
    pub model_contains: String,
    pub input_per_million: f64,
    pub output_per_million: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub model_max_tokens: usize,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub safety_margin: usize,
    pub pricing: Vec<ModelPrice>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "generator-default-v1".to_string(),
            model_max_tokens: 32_768,
            max_output_tokens: 2_048,
            temperature: 0.7,
            safety_margin: 100,
            pricing: vec![
                ModelPrice {
                    model_contains: "generator-default".to_string(),
                    input_per_million: 0.125,
                    output_per_million: 0.375,
                },
                ModelPrice {
                    model_contains: "embedding".to_string(),
                    input_per_million: 0.01,
                    output_per_million: 0.0,
                },
            ],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub rate: u32,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rate: 10,
            window_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct QuotaConfig {
    pub enabled: bool,
    pub daily_token_limit: u64,
    pub daily_cost_limit: f64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            daily_token_limit: 1_000_000,
            daily_cost_limit: 10.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BreakerConfig {
    pub enabled: bool,
    pub failure_threshold: usize,
    pub success_threshold: usize,
    pub timeout_secs: u64,
    pub window_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            success_threshold: 2,
            timeout_secs: 60,
            window_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SheddingConfig {
    pub enabled: bool,
    pub cpu_elevated: f32,
    pub cpu_high: f32,
    pub cpu_critical: f32,
    pub memory_elevated: f32,
    pub memory_high: f32,
    pub memory_critical: f32,
}

impl Default for SheddingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cpu_elevated: 70.0,
            cpu_high: 85.0,
            cpu_critical: 95.0,
            memory_elevated: 75.0,
            memory_high: 90.0,
            memory_critical: 95.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ProtectionConfig {
    pub rate_limit: RateLimitConfig,
    pub quota: QuotaConfig,
    pub breaker: BreakerConfig,
    pub shedding: SheddingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestionConfig {
    pub worker_count: usize,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub dense_batch_size: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            max_retries: 3,
            backoff_base_ms: 1_000,
            backoff_cap_ms: 8_000,
            dense_batch_size: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub generation: GenerationConfig,
    pub protection: ProtectionConfig,
    pub ingestion: IngestionConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(Environment::with_prefix("CORPORA").separator("__"));

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_tunables() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.chunking.max_tokens, 500);
        assert_eq!(cfg.chunking.overlap, 100);
        assert_eq!(cfg.chunking.min_chunk_tokens, 50);
        assert_eq!(cfg.embedding.dimension, 768);
        assert_eq!(cfg.embedding.cache_ttl_secs, 604_800);
        assert_eq!(cfg.retrieval.vector_top_k, 50);
        assert_eq!(cfg.retrieval.lexical_top_k, 20);
        assert_eq!(cfg.protection.rate_limit.rate, 10);
        assert_eq!(cfg.protection.rate_limit.window_secs, 60);
        assert_eq!(cfg.protection.breaker.failure_threshold, 5);
        assert_eq!(cfg.protection.breaker.success_threshold, 2);
        assert_eq!(cfg.ingestion.max_retries, 3);
        assert_eq!(cfg.ingestion.backoff_cap_ms, 8_000);
    }
}
