//! Response cache: memoizes read results per operation and arguments, with
//! per-entry expiry and explicit invalidation after writes.
//!
//! ## Backends
//!
//! - **Local**: a `DashMap` in this process
//! - **Redis**: a shared `deadpool-redis` pool, keys namespaced by prefix
//!
//! Backend failures never reach request handlers: a failed read is a miss,
//! a failed write or delete is logged and skipped.

pub mod keys;
pub mod local;
pub mod redis_store;
pub mod response;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub use local::{CachedEntry, LocalStore};
pub use redis_store::RedisStore;
pub use response::ResponseCache;
pub use store::CacheStore;

use crate::config::{CacheConfig, RedisConfig};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache operation timed out after {0:?}")]
    Timeout(Duration),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Backend(err.to_string())
    }
}

impl From<deadpool_redis::PoolError> for CacheError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        CacheError::Backend(err.to_string())
    }
}

/// Selects the cache backend from configuration.
///
/// With `redis.enabled` a pool is created and one connection is checked out;
/// if either step fails the local store is used instead.
pub async fn create_cache_store(redis: &RedisConfig, cache: &CacheConfig) -> Arc<dyn CacheStore> {
    if !redis.enabled {
        tracing::info!("Using local cache (single-instance mode)");
        return Arc::new(LocalStore::new());
    }

    match RedisStore::connect(redis, &cache.key_prefix).await {
        Ok(store) => {
            tracing::info!(url = %redis.url, prefix = %cache.key_prefix, "Using Redis cache");
            Arc::new(store)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Redis unavailable, falling back to local cache");
            Arc::new(LocalStore::new())
        }
    }
}

/// Sweeps expired entries from `store` every `every`.
///
/// The task only holds a weak reference and exits once the last strong
/// reference to the store is dropped.
pub fn spawn_purge_task(store: &Arc<dyn CacheStore>, every: Duration) -> JoinHandle<()> {
    let store = Arc::downgrade(store);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(store) = store.upgrade() else {
                tracing::debug!("cache store dropped, stopping purge task");
                break;
            };
            let purged = store.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, backend = store.backend_name(), "purged expired cache entries");
            }
        }
    })
}
