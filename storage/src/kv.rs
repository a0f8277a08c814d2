use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("key-value store unavailable: {0}")]
    Unavailable(String),
}

/// String key-value contract with TTL and an atomic read-modify-write entry
/// point. The rate-limit bucket must never be updated with separate read and
/// write calls; `update` is the single-script equivalent.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), KvError>;
    async fn delete(&self, key: &str) -> Result<bool, KvError>;
    /// Applies `f` to the current value under a per-key lock. Returning
    /// `Some(new)` stores it (keeping the key's TTL policy to the caller via
    /// `ttl`); returning `None` leaves the stored value untouched.
    async fn update(
        &self,
        key: &str,
        ttl: Option<Duration>,
        f: &mut (dyn for<'a> FnMut(Option<&'a str>) -> Option<String> + Send),
    ) -> Result<(), KvError>;
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live_value(&self) -> Option<&str> {
        match self.expires_at {
            Some(deadline) if Instant::now() >= deadline => None,
            _ => Some(self.value.as_str()),
        }
    }
}

#[derive(Default)]
pub struct MemoryKvStore {
    entries: DashMap<String, Entry>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        Ok(self
            .entries
            .get(key)
            .and_then(|entry| entry.live_value().map(|v| v.to_string())))
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), KvError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn update(
        &self,
        key: &str,
        ttl: Option<Duration>,
        f: &mut (dyn for<'a> FnMut(Option<&'a str>) -> Option<String> + Send),
    ) -> Result<(), KvError> {
        // The entry reference holds the shard lock for the whole closure,
        // which is what makes the read-modify-write atomic.
        match self.entries.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut slot) => {
                let current = slot.get().live_value().map(|v| v.to_string());
                if let Some(new_value) = f(current.as_deref()) {
                    *slot.get_mut() = Entry {
                        value: new_value,
                        expires_at: ttl.map(|ttl| Instant::now() + ttl),
                    };
                }
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                if let Some(new_value) = f(None) {
                    slot.insert(Entry {
                        value: new_value,
                        expires_at: ttl.map(|ttl| Instant::now() + ttl),
                    });
                }
            }
        }
        Ok(())
    }
}
