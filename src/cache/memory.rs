//! In-memory cache implementation using moka
//!
//! Values are stored as JSON strings so any serializable type fits. Entries
//! expire after the configured time-to-live.

use super::CacheLayer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use moka::future::Cache;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_MAX_CAPACITY: u64 = 10_000;

const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Clone)]
struct CacheEntry {
    data: Arc<String>,
}

impl CacheEntry {
    fn new<T: Serialize>(value: &T) -> Result<Self> {
        let json = serde_json::to_string(value).context("Failed to serialize cache value")?;
        Ok(Self { data: Arc::new(json) })
    }

    fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.data).context("Failed to deserialize cache value")
    }
}

pub struct MemoryCache {
    cache: Cache<String, CacheEntry>,
    ttl: Duration,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entry_count", &self.cache.entry_count())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_capacity_and_ttl(DEFAULT_MAX_CAPACITY, DEFAULT_TTL)
    }

    /// Create a cache holding at most `max_capacity` entries, each living `ttl`
    pub fn with_capacity_and_ttl(max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .support_invalidation_closures()
            .build();

        Self { cache, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheLayer for MemoryCache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self.cache.get(key).await {
            Some(entry) => Ok(Some(entry.deserialize()?)),
            None => Ok(None),
        }
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T) -> Result<()> {
        let entry = CacheEntry::new(value)?;
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let prefix = prefix.to_string();
        self.cache
            .invalidate_entries_if(move |key, _| key.starts_with(&prefix))
            .map_err(|e| anyhow::anyhow!("Failed to invalidate cache entries: {}", e))?;
        self.cache.run_pending_tasks().await;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = MemoryCache::new();
        cache.set("key1", &"value1".to_string()).await.unwrap();

        let result: Option<String> = cache.get("key1").await.unwrap();
        assert_eq!(result, Some("value1".to_string()));

        let missing: Option<String> = cache.get("missing").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_delete_prefix_only_touches_matching_keys() {
        let cache = MemoryCache::new();
        cache.set("site:alpha:settings", &1u32).await.unwrap();
        cache.set("site:alpha:news", &2u32).await.unwrap();
        cache.set("site:beta:settings", &3u32).await.unwrap();

        cache.delete_prefix("site:alpha:").await.unwrap();

        assert_eq!(cache.get::<u32>("site:alpha:settings").await.unwrap(), None);
        assert_eq!(cache.get::<u32>("site:alpha:news").await.unwrap(), None);
        assert_eq!(cache.get::<u32>("site:beta:settings").await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_type_mismatch_is_an_error() {
        let cache = MemoryCache::new();
        cache.set("n", &"text").await.unwrap();
        assert!(cache.get::<u64>("n").await.is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn entries_expire_after_ttl(key in "[a-z]{1,10}", value in "[a-z]{1,100}") {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let cache = MemoryCache::with_capacity_and_ttl(1000, Duration::from_millis(10));
                cache.set(&key, &value).await.unwrap();

                let fresh: Option<String> = cache.get(&key).await.unwrap();
                prop_assert_eq!(fresh, Some(value.clone()));

                tokio::time::sleep(Duration::from_millis(50)).await;
                cache.cache.run_pending_tasks().await;

                let expired: Option<String> = cache.get(&key).await.unwrap();
                prop_assert_eq!(expired, None);
                Ok(())
            })?;
        }
    }
}
