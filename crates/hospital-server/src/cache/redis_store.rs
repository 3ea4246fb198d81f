use async_trait::async_trait;
use deadpool_redis::{Pool, PoolConfig, Runtime, Timeouts};
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;

use super::CacheError;
use super::store::CacheStore;
use crate::config::RedisConfig;

/// Store shared by every server instance pointed at the same Redis.
///
/// All keys are written under `prefix`, so [`CacheStore::clear`] only
/// touches this application's entries.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    prefix: String,
}

impl RedisStore {
    pub fn new(pool: Pool, prefix: impl Into<String>) -> Self {
        Self {
            pool,
            prefix: prefix.into(),
        }
    }

    /// Creates the pool and checks out one connection to prove Redis is
    /// reachable.
    pub async fn connect(config: &RedisConfig, prefix: &str) -> Result<Self, CacheError> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let mut redis_config = deadpool_redis::Config::from_url(&config.url);
        let mut pool_config = PoolConfig::new(config.pool_size);
        pool_config.timeouts = Timeouts {
            wait: Some(timeout),
            create: Some(timeout),
            recycle: Some(timeout),
        };
        redis_config.pool = Some(pool_config);

        let pool = redis_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        drop(pool.get().await?);
        Ok(Self::new(pool, prefix))
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Arc<Vec<u8>>>, CacheError> {
        let mut conn = self.pool.get().await?;
        let value: Option<Vec<u8>> = conn.get(self.namespaced(key)).await?;
        Ok(value.map(Arc::new))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        // PSETEX rejects a zero expiry
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let mut conn = self.pool.get().await?;
        conn.pset_ex::<_, _, ()>(self.namespaced(key), value, millis)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.pool.get().await?;
        conn.del::<_, ()>(self.namespaced(key)).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut conn = self.pool.get().await?;
        let keys: Vec<String> = conn.keys(format!("{}*", self.prefix)).await?;
        if !keys.is_empty() {
            tracing::debug!(count = keys.len(), prefix = %self.prefix, "clearing Redis cache namespace");
            conn.del::<_, ()>(keys).await?;
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
