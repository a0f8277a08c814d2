use crate::dsl::{ChatRequest, ChatResponse, SourceInfo, TokenUsageInfo};
use chrono::Utc;
use corpora_core::config::AppConfig;
use corpora_core::error::ChatError;
use corpora_core::metrics::MetricsCollector;
use corpora_core::model::ChatInteraction;
use generation::generator::GenerationOverrides;
use generation::{AnswerValidator, CostTracker, GeneratorService, PromptBuilder, SourceMap};
use protection::{CircuitBreaker, DegradationProfile, LoadSample, LoadShedder, QuotaManager, RateLimiter};
use providers::ProviderError;
use query::{HybridRetriever, RetrieveError, RetrieveOptions};
use std::sync::Arc;
use std::time::Instant;
use storage::RowStore;
use tracing::{error, info, warn};
use uuid::Uuid;

const NO_DOCUMENTS_ANSWER: &str = "I don't have any relevant documents to answer this question. \
This could mean:\n\
1. No documents have been uploaded for your account\n\
2. Your query doesn't match any indexed content\n\
3. The specified document doesn't exist\n\n\
Please try uploading documents first or rephrasing your question.";

/// Everything the orchestrator composes over. All collaborators are injected
/// so tests can swap in fakes.
pub struct ChatComponents {
    pub retriever: HybridRetriever,
    pub prompt_builder: PromptBuilder,
    pub generator: GeneratorService,
    pub validator: AnswerValidator,
    pub cost: CostTracker,
    pub rate_limiter: RateLimiter,
    pub quota: QuotaManager,
    pub breaker: CircuitBreaker,
    pub shedder: LoadShedder,
    pub rows: Arc<dyn RowStore>,
    pub metrics: Arc<MetricsCollector>,
    pub config: AppConfig,
}

/// Sole composition point of the query pipeline: protection gates, hybrid
/// retrieval, context assembly, guarded generation, validation, persistence.
pub struct ChatService {
    components: ChatComponents,
}

impl ChatService {
    pub fn new(components: ChatComponents) -> Self {
        Self { components }
    }

    pub async fn process(&self, request: ChatRequest) -> Result<ChatResponse, ChatError> {
        let c = &self.components;
        let started = Instant::now();

        request
            .validate()
            .map_err(|err| ChatError::InvalidInput(err.to_string()))?;
        let document_filter = request.document_filter();

        // Gates run before any expensive work, in a fixed order: rate limit,
        // quota, then load shedding. The first two may reject; the shedder
        // only degrades.
        if c.config.protection.rate_limit.enabled {
            let decision = c.rate_limiter.check(&request.tenant_id).await;
            if !decision.allowed {
                return Err(ChatError::RateLimited {
                    retry_after_secs: decision
                        .retry_after_secs
                        .unwrap_or(c.config.protection.rate_limit.window_secs),
                });
            }
        }

        if c.config.protection.quota.enabled {
            let status = c.quota.check(&request.tenant_id).await;
            if status.exceeded {
                return Err(ChatError::QuotaExceeded {
                    reset_time: status.reset_time,
                });
            }
        }

        let sample = self.load_sample(&request);
        let profile = sample.profile;
        if sample.degraded {
            warn!(
                tenant_id = %request.tenant_id,
                level = ?sample.level,
                top_k = profile.top_k,
                max_output_tokens = profile.max_output_tokens,
                apply_mmr = profile.apply_mmr,
                "degraded mode active for this request"
            );
        }

        // Retrieval.
        let retrieval_started = Instant::now();
        let retrieve_options = RetrieveOptions {
            top_k: Some(profile.top_k),
            document_id: document_filter,
            apply_mmr: profile.apply_mmr,
            ..RetrieveOptions::default()
        };
        let results = tokio::time::timeout(
            profile.retrieval_timeout,
            c.retriever
                .retrieve(&request.query, &request.tenant_id, retrieve_options),
        )
        .await
        .map_err(|_| ChatError::DependencyTransient("retrieval timed out".to_string()))?
        .map_err(map_retrieve_error)?;
        let retrieval_latency_ms = retrieval_started.elapsed().as_secs_f64() * 1_000.0;

        if results.is_empty() {
            info!(tenant_id = %request.tenant_id, "no retrieval results, returning canned answer");
            let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;
            c.metrics
                .record_request(latency_ms as u64, sample.degraded, true);
            return Ok(empty_response(latency_ms));
        }

        // Context assembly.
        let prompt = c.prompt_builder.build(&request.query, results);

        // Generation, guarded by the circuit breaker.
        if c.config.protection.breaker.enabled {
            c.breaker
                .acquire()
                .await
                .map_err(|_| ChatError::CircuitOpen)?;
        }
        let draft = match c
            .generator
            .generate(
                &prompt.system_prompt,
                &prompt.user_prompt,
                GenerationOverrides {
                    max_output_tokens: profile.max_output_tokens,
                    temperature: profile.temperature,
                    timeout: profile.generation_timeout,
                },
            )
            .await
        {
            Ok(draft) => {
                if c.config.protection.breaker.enabled {
                    c.breaker.record_success().await;
                }
                draft
            }
            Err(err) => {
                if c.config.protection.breaker.enabled {
                    c.breaker.record_failure().await;
                }
                return Err(map_provider_error(err));
            }
        };
        let generation_latency_ms = draft.latency_ms;

        // Validation and cost accounting.
        let validated = c.validator.validate(draft, &prompt.source_map);
        let cost_estimate = validated.usage.map(|usage| {
            c.cost
                .calculate_cost(&validated.model, usage.prompt_tokens, usage.completion_tokens)
        });

        let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;
        let interaction = ChatInteraction {
            id: Uuid::new_v4(),
            tenant_id: request.tenant_id.clone(),
            query: request.query.clone(),
            answer: validated.answer.clone(),
            confidence: validated.confidence,
            citation_count: validated.citations.len() as u32,
            latency_ms,
            retrieval_latency_ms,
            generation_latency_ms,
            usage: validated.usage,
            model_name: validated.model.clone(),
            cost_estimate,
            created_at: Utc::now(),
        };
        let stored = c
            .rows
            .insert_interaction(interaction)
            .await
            .map_err(|err| ChatError::Internal(format!("failed to persist interaction: {err}")))?;

        c.metrics
            .record_request(latency_ms as u64, sample.degraded, false);

        info!(
            interaction_id = %stored.id,
            tenant_id = %request.tenant_id,
            citations = validated.citations.len(),
            confidence = validated.confidence,
            latency_ms = latency_ms as u64,
            "chat request complete"
        );

        Ok(ChatResponse {
            interaction_id: Some(stored.id.to_string()),
            answer: validated.answer,
            citations: validated.citations,
            confidence: validated.confidence,
            sources: source_infos(&prompt.source_map),
            token_usage: validated.usage.map(|usage| TokenUsageInfo {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            }),
            latency_ms,
            warnings: validated.warnings,
        })
    }

    fn load_sample(&self, request: &ChatRequest) -> LoadSample {
        let c = &self.components;
        if c.config.protection.shedding.enabled {
            c.shedder
                .check(request.top_k, c.config.generation.max_output_tokens)
        } else {
            LoadSample {
                cpu_percent: 0.0,
                memory_percent: 0.0,
                level: protection::LoadLevel::Normal,
                degraded: false,
                profile: DegradationProfile::normal(
                    request.top_k,
                    c.config.generation.max_output_tokens,
                ),
            }
        }
    }
}

fn empty_response(latency_ms: f64) -> ChatResponse {
    ChatResponse {
        interaction_id: None,
        answer: NO_DOCUMENTS_ANSWER.to_string(),
        citations: Vec::new(),
        confidence: 0.0,
        sources: Vec::new(),
        token_usage: None,
        latency_ms,
        warnings: vec![
            "No relevant documents found for query".to_string(),
            "Unable to provide a factual answer".to_string(),
        ],
    }
}

fn source_infos(source_map: &SourceMap) -> Vec<SourceInfo> {
    // BTreeMap iteration keeps sources ordered by source number.
    source_map
        .iter()
        .map(|(number, meta)| SourceInfo {
            source_number: *number,
            chunk_id: meta.chunk_id.to_string(),
            document_id: meta.document_id.to_string(),
            section_title: meta.section_title.clone(),
            page_number: meta.page_number,
            score: meta.score,
        })
        .collect()
}

fn map_retrieve_error(err: RetrieveError) -> ChatError {
    match err {
        RetrieveError::Embedding(inner) => match inner {
            ingestion::EmbedError::Provider(provider_err) if !provider_err.is_transient() => {
                error!(error = %provider_err, "fatal embedding provider error");
                ChatError::DependencyFatal(provider_err.to_string())
            }
            other => ChatError::DependencyTransient(other.to_string()),
        },
        RetrieveError::Store(inner) => ChatError::DependencyTransient(inner.to_string()),
        RetrieveError::Index(inner) => ChatError::DependencyTransient(inner.to_string()),
    }
}

fn map_provider_error(err: ProviderError) -> ChatError {
    if err.is_transient() {
        ChatError::DependencyTransient(err.to_string())
    } else {
        // Invalid argument or permission denied: logged with context,
        // surfaced to the caller as an internal failure.
        error!(error = %err, "fatal generator error");
        ChatError::DependencyFatal(err.to_string())
    }
}
