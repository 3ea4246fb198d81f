use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::CacheError;
use super::store::CacheStore;
use crate::config::CacheConfig;
use crate::metrics;

/// Memoizes read results in a [`CacheStore`].
///
/// Every backend call is bounded by `operation_timeout`; a slow or broken
/// backend costs at most that long per call and never fails the request.
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    enabled: bool,
    default_ttl: Duration,
    operation_timeout: Duration,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            enabled: config.enabled,
            default_ttl: config.default_ttl(),
            operation_timeout: config.operation_timeout(),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Returns the cached value for `key`, or runs `compute` and caches its
    /// result for `ttl` (the configured default when `None`).
    ///
    /// Errors from `compute` are returned unchanged and nothing is cached. A
    /// zero `ttl` computes without storing.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.enabled {
            return compute().await;
        }
        let backend = self.store.backend_name();

        match self.bounded(self.store.get(key)).await {
            Ok(Some(bytes)) => match rmp_serde::from_slice::<T>(&bytes) {
                Ok(value) => {
                    tracing::debug!(key = %key, backend, "cache hit");
                    metrics::record_cache_hit(backend);
                    return Ok(value);
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "undecodable cache entry, recomputing");
                    metrics::record_cache_error(backend, "decode");
                }
            },
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache read failed, recomputing");
                metrics::record_cache_error(backend, "get");
            }
        }

        tracing::debug!(key = %key, backend, "cache miss");
        metrics::record_cache_miss(backend);
        let value = compute().await?;

        let ttl = ttl.unwrap_or(self.default_ttl);
        if ttl.is_zero() {
            return Ok(value);
        }
        match rmp_serde::to_vec_named(&value) {
            Ok(bytes) => {
                if let Err(e) = self.bounded(self.store.set(key, bytes, ttl)).await {
                    tracing::warn!(key = %key, error = %e, "cache write failed");
                    metrics::record_cache_error(backend, "set");
                }
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache encode failed");
                metrics::record_cache_error(backend, "encode");
            }
        }
        Ok(value)
    }

    /// Removes each key. Failures are logged and skipped; an entry that
    /// could not be removed stays stale until it expires.
    pub async fn invalidate<I, K>(&self, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        if !self.enabled {
            return;
        }
        let backend = self.store.backend_name();
        let mut removed = 0;
        for key in keys {
            let key = key.as_ref();
            match self.bounded(self.store.delete(key)).await {
                Ok(()) => {
                    removed += 1;
                    tracing::debug!(key = %key, "cache entry invalidated");
                }
                Err(e) => {
                    tracing::warn!(
                        key = %key,
                        error = %e,
                        "cache invalidation failed, entry stays until expiry"
                    );
                    metrics::record_cache_error(backend, "delete");
                }
            }
        }
        metrics::record_cache_invalidation(backend, removed);
    }

    /// Drops every entry. Used between tests.
    pub async fn clear_all(&self) -> Result<(), CacheError> {
        self.bounded(self.store.clear()).await
    }

    async fn bounded<R>(
        &self,
        operation: impl Future<Output = Result<R, CacheError>>,
    ) -> Result<R, CacheError> {
        tokio::time::timeout(self.operation_timeout, operation)
            .await
            .unwrap_or(Err(CacheError::Timeout(self.operation_timeout)))
    }
}
