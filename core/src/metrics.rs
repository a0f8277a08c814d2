use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default)]
pub struct RequestMetrics {
    pub total_requests: u64,
    pub degraded_requests: u64,
    pub empty_retrievals: u64,
    pub latencies: VecDeque<u64>, // milliseconds
}

#[derive(Debug, Clone, Default)]
pub struct IngestionMetrics {
    pub documents_completed: u64,
    pub documents_failed: u64,
    pub chunks_written: u64,
    pub embedding_cache_hits: u64,
    pub embedding_cache_misses: u64,
}

pub struct MetricsCollector {
    state: Arc<Mutex<MetricsState>>,
}

struct MetricsState {
    request_metrics: RequestMetrics,
    ingestion_metrics: IngestionMetrics,
    max_history: usize,
}

impl MetricsCollector {
    pub fn new(max_history: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(MetricsState {
                request_metrics: RequestMetrics::default(),
                ingestion_metrics: IngestionMetrics::default(),
                max_history,
            })),
        }
    }

    pub fn record_request(&self, latency_ms: u64, degraded: bool, empty_retrieval: bool) {
        let mut state = self.state.lock().unwrap();
        state.request_metrics.total_requests += 1;
        if degraded {
            state.request_metrics.degraded_requests += 1;
        }
        if empty_retrieval {
            state.request_metrics.empty_retrievals += 1;
        }
        state.request_metrics.latencies.push_back(latency_ms);
        if state.request_metrics.latencies.len() > state.max_history {
            state.request_metrics.latencies.pop_front();
        }
    }

    pub fn record_document_completed(&self, chunks: u64) {
        let mut state = self.state.lock().unwrap();
        state.ingestion_metrics.documents_completed += 1;
        state.ingestion_metrics.chunks_written += chunks;
    }

    pub fn record_document_failed(&self) {
        let mut state = self.state.lock().unwrap();
        state.ingestion_metrics.documents_failed += 1;
    }

    pub fn record_cache_lookup(&self, hits: u64, misses: u64) {
        let mut state = self.state.lock().unwrap();
        state.ingestion_metrics.embedding_cache_hits += hits;
        state.ingestion_metrics.embedding_cache_misses += misses;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.state.lock().unwrap();
        let r = &state.request_metrics;
        let i = &state.ingestion_metrics;

        let mut sorted_latencies: Vec<u64> = r.latencies.iter().copied().collect();
        sorted_latencies.sort_unstable();

        let cache_total = i.embedding_cache_hits + i.embedding_cache_misses;
        let cache_hit_rate = if cache_total > 0 {
            i.embedding_cache_hits as f32 / cache_total as f32
        } else {
            0.0
        };

        MetricsSnapshot {
            total_requests: r.total_requests,
            degraded_requests: r.degraded_requests,
            empty_retrievals: r.empty_retrievals,
            p50_ms: percentile(&sorted_latencies, 50.0),
            p95_ms: percentile(&sorted_latencies, 95.0),
            p99_ms: percentile(&sorted_latencies, 99.0),
            documents_completed: i.documents_completed,
            documents_failed: i.documents_failed,
            chunks_written: i.chunks_written,
            embedding_cache_hit_rate: cache_hit_rate,
        }
    }
}

fn percentile(sorted: &[u64], p: f32) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let idx = ((p / 100.0) * (sorted.len() as f32)).ceil() as usize;
    sorted[idx.saturating_sub(1).min(sorted.len() - 1)]
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub degraded_requests: u64,
    pub empty_retrievals: u64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    pub documents_completed: u64,
    pub documents_failed: u64,
    pub chunks_written: u64,
    pub embedding_cache_hit_rate: f32,
}
