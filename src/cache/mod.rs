//! Cache layer
//!
//! A process-local moka cache for data that is read far more often than it
//! changes, such as the public website settings of each school.
//!
//! # Usage
//!
//! ```rust,ignore
//! use scholaris::cache::{create_cache, site_settings_key, CacheLayer};
//!
//! let cache = create_cache(&config.cache);
//! cache.set(&site_settings_key("greenfield"), &settings).await?;
//! ```

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

pub use memory::MemoryCache;

/// Cache layer trait
///
/// The generic methods make this trait unusable as `dyn CacheLayer`; share
/// the concrete cache behind an `Arc` instead.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete every entry whose key starts with `prefix`
    async fn delete_prefix(&self, prefix: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// Key under which a school's public website settings are cached
pub fn site_settings_key(school_code: &str) -> String {
    format!("site:{}:settings", school_code)
}

/// Prefix covering every cached public-site entry of a school
pub fn site_prefix(school_code: &str) -> String {
    format!("site:{}:", school_code)
}

pub fn create_cache(config: &CacheConfig) -> Arc<MemoryCache> {
    let ttl = Duration::from_secs(config.ttl_seconds.max(1));
    Arc::new(MemoryCache::with_capacity_and_ttl(10_000, ttl))
}
