//! Get-or-set cache capability used in front of the movie lookup.
//!
//! Values are stored as JSON so any backend that speaks strings can implement
//! `CacheService`. A hit may be up to `ttl` old.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;

#[async_trait]
pub trait CacheService: Send + Sync {
    async fn get(&self, key: &str) -> Option<Value>;

    /// `ttl: None` keeps the value until removed.
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>);

    async fn remove(&self, key: &str);

    /// Drop entries whose ttl ran out. Backends that expire on their own keep the default.
    async fn purge_expired(&self) {}
}

/// Return the cached value for `key`, or run `factory`, cache its result and return it.
/// Errors from `factory` are returned as-is and never cached. A cached value that no
/// longer deserializes as `T` is treated as a miss.
pub async fn get_or_set<T, E, F, Fut>(
    cache: &dyn CacheService,
    key: &str,
    ttl: Option<Duration>,
    factory: F,
) -> Result<T, E>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if let Some(hit) = cache.get(key).await
        && let Ok(value) = serde_json::from_value(hit)
    {
        return Ok(value);
    }
    let value = factory().await?;
    match serde_json::to_value(&value) {
        Ok(json) => cache.set(key, json, ttl).await,
        Err(e) => tracing::debug!("not caching {key}: {e}"),
    }
    Ok(value)
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

/// In-process cache. Expired entries are dropped lazily on read or by `purge_expired`,
/// which the engine's sweep pass calls.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheService for MemoryCache {
    async fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let hit = self.entries.get(key).and_then(|e| {
            if e.expires_at.is_none_or(|at| at > now) {
                Some(e.value.clone())
            } else {
                None
            }
        });
        if hit.is_none() {
            self.entries.remove_if(key, |_, e| e.expires_at.is_some_and(|at| at <= now));
        }
        hit
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries.insert(key.to_string(), Entry { value, expires_at });
    }

    async fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    async fn purge_expired(&self) {
        let now = Instant::now();
        self.entries
            .retain(|_, e| e.expires_at.is_none_or(|at| at > now));
    }
}
