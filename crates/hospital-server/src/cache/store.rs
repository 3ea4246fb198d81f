use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::CacheError;

/// A key/value byte store with per-entry expiry.
///
/// Implementations must tolerate concurrent calls; the last `set` for a key
/// wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the live value for `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Arc<Vec<u8>>>, CacheError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Drops every entry owned by this store.
    async fn clear(&self) -> Result<(), CacheError>;

    /// Drops expired entries and returns how many were removed. Called by
    /// the background purge task; backends with native expiry keep the no-op.
    fn purge_expired(&self) -> usize {
        0
    }

    /// Label used in logs and metrics.
    fn backend_name(&self) -> &'static str;
}
