use async_trait::async_trait;
use chat::{ChatComponents, ChatRequest, ChatService, FeedbackRequest, FeedbackService};
use corpora_core::config::AppConfig;
use corpora_core::error::ChatError;
use corpora_core::metrics::MetricsCollector;
use corpora_core::model::{Document, DocumentType, TokenUsage};
use corpora_core::tokenizer::Tokenizer;
use generation::{
    AnswerValidator, ContextOptimizer, CostTracker, GeneratorService, PromptBuilder, TokenBudget,
};
use ingestion::{
    DenseWriter, DocumentProcessor, EmbeddingService, PlainTextSource, RowWriter, SemanticChunker,
};
use protection::{CircuitBreaker, FixedMonitor, LoadShedder, QuotaManager, RateLimiter};
use providers::{
    EmbeddingProvider, EmbeddingTask, Generation, GenerationParams, GeneratorProvider,
    ProviderError, RetryPolicy,
};
use query::{HybridRetriever, QueryTransformer};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use storage::{MemoryDenseIndex, MemoryKvStore, MemoryRowStore, RowStore};
use uuid::Uuid;

const DIMS: usize = 4;

struct TopicEmbedder;

#[async_trait]
impl EmbeddingProvider for TopicEmbedder {
    async fn embed(
        &self,
        texts: &[String],
        _task: EmbeddingTask,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                let mut v = [0.05f32; DIMS];
                for (axis, topic) in ["battery", "solar", "policy"].iter().enumerate() {
                    v[axis] += lower.matches(topic).count() as f32;
                }
                v.to_vec()
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        DIMS
    }
}

struct CountingGenerator {
    calls: Arc<AtomicU32>,
    fail: bool,
}

#[async_trait]
impl GeneratorProvider for CountingGenerator {
    async fn generate(
        &self,
        _system: &str,
        _user: &str,
        _params: &GenerationParams,
    ) -> Result<Generation, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ProviderError::Unavailable("generator brownout".into()));
        }
        Ok(Generation {
            text: "The battery stores energy for overnight use [Source 1].".to_string(),
            usage: TokenUsage {
                prompt_tokens: 200,
                completion_tokens: 30,
                total_tokens: 230,
            },
            latency_ms: 2.0,
            model: "generator-default-v1".to_string(),
        })
    }

    fn model(&self) -> &str {
        "generator-default-v1"
    }
}

struct Harness {
    rows: Arc<MemoryRowStore>,
    service: ChatService,
    feedback: FeedbackService,
    metrics: Arc<MetricsCollector>,
    processor: DocumentProcessor,
    source: Arc<PlainTextSource>,
    generator_calls: Arc<AtomicU32>,
}

struct HarnessOptions {
    rate: u32,
    cpu_percent: f32,
    failing_generator: bool,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            rate: 100,
            cpu_percent: 10.0,
            failing_generator: false,
        }
    }
}

fn harness(options: HarnessOptions) -> Harness {
    let rows = Arc::new(MemoryRowStore::new());
    let dense = Arc::new(MemoryDenseIndex::new(DIMS));
    let kv = Arc::new(MemoryKvStore::new());
    let metrics = Arc::new(MetricsCollector::new(256));
    let source = Arc::new(PlainTextSource::new());
    let tokenizer = Tokenizer::new();

    let embedding = Arc::new(EmbeddingService::new(
        Arc::new(TopicEmbedder),
        kv.clone(),
        Duration::from_secs(7 * 24 * 60 * 60),
    ));

    let processor = DocumentProcessor::new(
        rows.clone(),
        source.clone(),
        SemanticChunker::new(tokenizer.clone(), Default::default()),
        EmbeddingService::new(Arc::new(TopicEmbedder), kv.clone(), Duration::from_secs(60)),
        DenseWriter::new(dense.clone(), 100),
        RowWriter::new(rows.clone()),
    );

    let generator_calls = Arc::new(AtomicU32::new(0));
    let generator_provider = Arc::new(CountingGenerator {
        calls: generator_calls.clone(),
        fail: options.failing_generator,
    });

    let mut config = AppConfig::default();
    config.protection.rate_limit.rate = options.rate;

    let components = ChatComponents {
        retriever: HybridRetriever::new(dense, rows.clone(), QueryTransformer::new(embedding)),
        prompt_builder: PromptBuilder::new(
            TokenBudget::new(tokenizer, 32_768, 2_048, 100),
            ContextOptimizer::default(),
        ),
        generator: GeneratorService::new(generator_provider).with_retry(RetryPolicy {
            max_attempts: 1,
            initial_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        }),
        validator: AnswerValidator::new(),
        cost: CostTracker::new(config.generation.pricing.clone()),
        rate_limiter: RateLimiter::new(kv, options.rate, 60),
        quota: QuotaManager::new(rows.clone(), 1_000_000, 10.0),
        breaker: CircuitBreaker::new("generator", config.protection.breaker.clone()),
        shedder: LoadShedder::new(
            Box::new(FixedMonitor {
                cpu_percent: options.cpu_percent,
                memory_percent: 40.0,
            }),
            config.protection.shedding.clone(),
        ),
        rows: rows.clone(),
        metrics: metrics.clone(),
        config,
    };

    Harness {
        rows: rows.clone(),
        service: ChatService::new(components),
        feedback: FeedbackService::new(rows),
        metrics,
        processor,
        source,
        generator_calls,
    }
}

async fn ingest_battery_doc(harness: &Harness, tenant: &str) {
    let doc = Document::new(tenant, "battery.txt", format!("{tenant}/battery.txt"), DocumentType::Txt);
    harness.rows.insert_document(doc.clone()).await.unwrap();
    harness.source.register(
        doc.id,
        "Battery overview\nThe battery stores energy and powers the site overnight.\n\n\
         Solar notes\nThe solar array charges the battery during the day.",
    );
    harness.processor.process(tenant, doc.id).await.unwrap();
}

#[tokio::test]
async fn empty_corpus_returns_canned_answer_and_persists_nothing() {
    let h = harness(HarnessOptions::default());

    let response = h
        .service
        .process(ChatRequest::new("what is X?", "tenant-a"))
        .await
        .unwrap();

    assert!(response.answer.contains("I don't have any relevant documents"));
    assert!(response.citations.is_empty());
    assert_eq!(response.confidence, 0.0);
    assert!(response
        .warnings
        .iter()
        .any(|w| w == "No relevant documents found for query"));
    assert!(response.interaction_id.is_none());
    assert_eq!(h.generator_calls.load(Ordering::SeqCst), 0);

    let snapshot = h.metrics.snapshot();
    assert_eq!(snapshot.empty_retrievals, 1);
}

#[tokio::test]
async fn grounded_answer_cites_sources_and_persists_the_interaction() {
    let h = harness(HarnessOptions::default());
    ingest_battery_doc(&h, "tenant-a").await;

    let response = h
        .service
        .process(ChatRequest::new("what does the battery do?", "tenant-a"))
        .await
        .unwrap();

    assert_eq!(response.citations, vec![1]);
    assert!(response.confidence > 0.5);
    assert!(!response.sources.is_empty());
    assert_eq!(response.sources[0].source_number, 1);
    assert!(response.token_usage.is_some());

    let interaction_id = Uuid::parse_str(&response.interaction_id.unwrap()).unwrap();
    let interaction = h
        .rows
        .interaction("tenant-a", interaction_id)
        .await
        .unwrap()
        .expect("interaction persisted");
    assert_eq!(interaction.citation_count, 1);
    assert!(interaction.cost_estimate.is_some());
    assert!(interaction.retrieval_latency_ms >= 0.0);
}

#[tokio::test]
async fn high_cpu_degrades_quietly_and_records_metrics() {
    let h = harness(HarnessOptions {
        cpu_percent: 92.0,
        ..HarnessOptions::default()
    });
    ingest_battery_doc(&h, "tenant-a").await;

    let response = h
        .service
        .process(ChatRequest::new("what does the battery do?", "tenant-a"))
        .await
        .unwrap();

    // Degradation is invisible in the response; only metrics record it.
    assert!(response.interaction_id.is_some());
    assert!(!response
        .warnings
        .iter()
        .any(|w| w.to_lowercase().contains("degrad")));
    assert_eq!(h.metrics.snapshot().degraded_requests, 1);
}

#[tokio::test]
async fn rate_limit_rejects_with_retry_after() {
    let h = harness(HarnessOptions {
        rate: 2,
        ..HarnessOptions::default()
    });

    for _ in 0..2 {
        h.service
            .process(ChatRequest::new("query", "tenant-a"))
            .await
            .unwrap();
    }

    let err = h
        .service
        .process(ChatRequest::new("query", "tenant-a"))
        .await
        .unwrap_err();
    match err {
        ChatError::RateLimited { retry_after_secs } => {
            assert_eq!(retry_after_secs, 30);
            assert_eq!(err.status_code(), 429);
        }
        other => panic!("expected rate limit error, got {other:?}"),
    }

    // Another tenant is unaffected.
    h.service
        .process(ChatRequest::new("query", "tenant-b"))
        .await
        .unwrap();
}

#[tokio::test]
async fn repeated_generator_failures_trip_the_breaker() {
    let h = harness(HarnessOptions {
        failing_generator: true,
        ..HarnessOptions::default()
    });
    ingest_battery_doc(&h, "tenant-a").await;

    for _ in 0..5 {
        let err = h
            .service
            .process(ChatRequest::new("battery status", "tenant-a"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::DependencyTransient(_)));
    }
    assert_eq!(h.generator_calls.load(Ordering::SeqCst), 5);

    // Sixth call is rejected by the breaker without touching the provider.
    let err = h
        .service
        .process(ChatRequest::new("battery status", "tenant-a"))
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::CircuitOpen));
    assert_eq!(err.status_code(), 503);
    assert_eq!(h.generator_calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn feedback_resubmission_replaces_the_rating() {
    let h = harness(HarnessOptions::default());
    ingest_battery_doc(&h, "tenant-a").await;

    let response = h
        .service
        .process(ChatRequest::new("what does the battery do?", "tenant-a"))
        .await
        .unwrap();
    let interaction_id = response.interaction_id.unwrap();

    let first = h
        .feedback
        .submit(FeedbackRequest {
            interaction_id: interaction_id.clone(),
            tenant_id: "tenant-a".to_string(),
            rating: 2,
            comment: None,
        })
        .await
        .unwrap();
    let second = h
        .feedback
        .submit(FeedbackRequest {
            interaction_id: interaction_id.clone(),
            tenant_id: "tenant-a".to_string(),
            rating: 5,
            comment: Some("fixed itself".to_string()),
        })
        .await
        .unwrap();

    assert_eq!(first.feedback_id, second.feedback_id);

    let stored = h
        .rows
        .feedback_for_interaction(Uuid::parse_str(&interaction_id).unwrap())
        .await
        .unwrap()
        .expect("exactly one feedback row");
    assert_eq!(stored.rating, 5);
    assert_eq!(stored.comment.as_deref(), Some("fixed itself"));
}

#[tokio::test]
async fn feedback_for_foreign_or_unknown_interactions_is_rejected() {
    let h = harness(HarnessOptions::default());
    ingest_battery_doc(&h, "tenant-a").await;

    let response = h
        .service
        .process(ChatRequest::new("what does the battery do?", "tenant-a"))
        .await
        .unwrap();
    let interaction_id = response.interaction_id.unwrap();

    // Another tenant cannot attach feedback to this interaction.
    let err = h
        .feedback
        .submit(FeedbackRequest {
            interaction_id,
            tenant_id: "tenant-b".to_string(),
            rating: 1,
            comment: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::UnknownInteraction(_)));
    assert_eq!(err.status_code(), 404);

    let err = h
        .feedback
        .submit(FeedbackRequest {
            interaction_id: Uuid::new_v4().to_string(),
            tenant_id: "tenant-a".to_string(),
            rating: 4,
            comment: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::UnknownInteraction(_)));
}

#[tokio::test]
async fn query_and_top_k_boundaries_are_enforced() {
    let h = harness(HarnessOptions::default());
    ingest_battery_doc(&h, "tenant-a").await;

    // Max-length query is accepted.
    let long_query = "b".repeat(10_000);
    assert!(h
        .service
        .process(ChatRequest::new(long_query, "tenant-a"))
        .await
        .is_ok());

    // One character past the limit is rejected before any gate runs.
    let too_long = "b".repeat(10_001);
    let err = h
        .service
        .process(ChatRequest::new(too_long, "tenant-a"))
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::InvalidInput(_)));
    assert_eq!(err.status_code(), 400);

    // top_k extremes both produce valid responses.
    for top_k in [1usize, 20] {
        let mut request = ChatRequest::new("battery", "tenant-a");
        request.top_k = top_k;
        let response = h.service.process(request).await.unwrap();
        assert!(response.interaction_id.is_some());
    }
}
