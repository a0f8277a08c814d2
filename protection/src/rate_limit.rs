use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use storage::KeyValueStore;
use tracing::{debug, error, warn};

/// Token bucket state as stored under `rate_limit:<tenant>`.
#[derive(Debug, Serialize, Deserialize)]
struct Bucket {
    tokens: f64,
    last_refill: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub retry_after_secs: Option<u64>,
}

/// Per-tenant token bucket shared across processes through the key-value
/// store. The whole refill-and-consume step runs inside the store's atomic
/// `update`, never as separate read and write calls. Store failures fail
/// open: the request is allowed and the error logged.
pub struct RateLimiter {
    kv: Arc<dyn KeyValueStore>,
    rate: u32,
    window_secs: u64,
}

impl RateLimiter {
    pub fn new(kv: Arc<dyn KeyValueStore>, rate: u32, window_secs: u64) -> Self {
        Self {
            kv,
            rate: rate.max(1),
            window_secs: window_secs.max(1),
        }
    }

    pub async fn check(&self, tenant_id: &str) -> RateLimitDecision {
        let key = bucket_key(tenant_id);
        let rate = self.rate as f64;
        let window = self.window_secs as f64;
        let now = unix_now();

        let mut decision = RateLimitDecision {
            allowed: true,
            remaining: self.rate,
            retry_after_secs: None,
        };

        let outcome = self
            .kv
            .update(
                &key,
                Some(Duration::from_secs(self.window_secs * 2)),
                &mut |current| {
                    let bucket = current
                        .and_then(|raw| serde_json::from_str::<Bucket>(raw).ok())
                        .unwrap_or(Bucket {
                            tokens: rate,
                            last_refill: now,
                        });

                    let elapsed = (now - bucket.last_refill).max(0.0);
                    let tokens = (bucket.tokens + elapsed / window * rate).min(rate);

                    if tokens >= 1.0 {
                        let tokens = tokens - 1.0;
                        decision = RateLimitDecision {
                            allowed: true,
                            remaining: tokens.floor() as u32,
                            retry_after_secs: None,
                        };
                        serde_json::to_string(&Bucket {
                            tokens,
                            last_refill: now,
                        })
                        .ok()
                    } else {
                        let needed = 1.0 - tokens;
                        decision = RateLimitDecision {
                            allowed: false,
                            remaining: 0,
                            retry_after_secs: Some((needed / rate * window).ceil() as u64),
                        };
                        // Denied requests leave the stored bucket untouched.
                        None
                    }
                },
            )
            .await;

        if let Err(err) = outcome {
            error!(tenant_id, error = %err, "rate limit store unreachable, failing open");
            return RateLimitDecision {
                allowed: true,
                remaining: self.rate,
                retry_after_secs: None,
            };
        }

        if decision.allowed {
            debug!(tenant_id, remaining = decision.remaining, "rate limit check passed");
        } else {
            warn!(
                tenant_id,
                retry_after = ?decision.retry_after_secs,
                "rate limit exceeded"
            );
        }

        decision
    }

    pub async fn reset(&self, tenant_id: &str) -> bool {
        self.kv.delete(&bucket_key(tenant_id)).await.unwrap_or(false)
    }
}

fn bucket_key(tenant_id: &str) -> String {
    format!("rate_limit:{tenant_id}")
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use storage::{KvError, MemoryKvStore};

    #[tokio::test]
    async fn burst_at_capacity_passes_and_the_next_request_waits_six_seconds() {
        let limiter = RateLimiter::new(Arc::new(MemoryKvStore::new()), 10, 60);

        for i in 0..10 {
            let decision = limiter.check("tenant-a").await;
            assert!(decision.allowed, "request {i} should pass");
        }

        let eleventh = limiter.check("tenant-a").await;
        assert!(!eleventh.allowed);
        // ceil(((1 - 0) / 10) * 60) with only a sliver of refill elapsed.
        assert_eq!(eleventh.retry_after_secs, Some(6));
    }

    #[tokio::test]
    async fn tenants_have_independent_buckets() {
        let limiter = RateLimiter::new(Arc::new(MemoryKvStore::new()), 1, 60);

        assert!(limiter.check("tenant-a").await.allowed);
        assert!(!limiter.check("tenant-a").await.allowed);
        assert!(limiter.check("tenant-b").await.allowed);
    }

    #[tokio::test]
    async fn reset_refills_the_bucket() {
        let limiter = RateLimiter::new(Arc::new(MemoryKvStore::new()), 1, 60);
        assert!(limiter.check("tenant-a").await.allowed);
        assert!(!limiter.check("tenant-a").await.allowed);

        limiter.reset("tenant-a").await;
        assert!(limiter.check("tenant-a").await.allowed);
    }

    struct BrokenKv;

    #[async_trait]
    impl KeyValueStore for BrokenKv {
        async fn get(&self, _key: &str) -> Result<Option<String>, KvError> {
            Err(KvError::Unavailable("down".into()))
        }

        async fn set(
            &self,
            _key: &str,
            _value: String,
            _ttl: Option<Duration>,
        ) -> Result<(), KvError> {
            Err(KvError::Unavailable("down".into()))
        }

        async fn delete(&self, _key: &str) -> Result<bool, KvError> {
            Err(KvError::Unavailable("down".into()))
        }

        async fn update(
            &self,
            _key: &str,
            _ttl: Option<Duration>,
            _f: &mut (dyn for<'a> FnMut(Option<&'a str>) -> Option<String> + Send),
        ) -> Result<(), KvError> {
            Err(KvError::Unavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn store_outage_fails_open() {
        let limiter = RateLimiter::new(Arc::new(BrokenKv), 10, 60);
        for _ in 0..50 {
            assert!(limiter.check("tenant-a").await.allowed);
        }
    }
}
