//! Result cache shared between poll handlers and job workers.
//!
//! Completed query payloads are stored under their [`JobKey`] with a TTL.
//! Three backends are available:
//! - [`MemoryCacheStore`]: single process, lazily expired on read
//! - [`SqliteCacheStore`]: a SQLite file shared by every worker process on a host
//! - [`RedisCacheStore`]: shared by every server instance pointing at one Redis

mod memory;
mod redis_store;
mod retry;
mod sqlite;

pub use memory::MemoryCacheStore;
pub use redis_store::RedisCacheStore;
pub use retry::BusyRetry;
pub use sqlite::SqliteCacheStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::{CacheBackend, CacheConfig};
use crate::domain::{JobKey, Payload};
use crate::Result;

/// A completed result as read back from the store.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: JobKey,
    pub payload: Arc<Payload>,
    pub written_at: DateTime<Utc>,
    pub ttl: Duration,
}

/// Key/value storage for completed payloads.
///
/// Writes replace the whole entry atomically and the last writer wins.
/// Reads never return an entry older than its TTL.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Short backend name for logs and stats.
    fn backend(&self) -> &'static str;

    /// Fetch a fresh entry, or `None` when absent or expired.
    async fn get(&self, key: &JobKey) -> Result<Option<CacheEntry>>;

    /// Store `payload`, overwriting any prior value for `key`.
    async fn put(&self, key: &JobKey, payload: Arc<Payload>, ttl: Duration) -> Result<()>;

    /// Drop the entry for `key` if present.
    async fn invalidate(&self, key: &JobKey) -> Result<()>;

    /// Actively evict expired entries, returning how many were removed.
    async fn cleanup_expired(&self) -> Result<usize>;
}

/// Build the configured cache backend.
pub async fn create_cache_store(config: &CacheConfig) -> Result<Arc<dyn CacheStore>> {
    let store: Arc<dyn CacheStore> = match &config.backend {
        CacheBackend::Memory => Arc::new(MemoryCacheStore::new()),
        CacheBackend::Sqlite { url } => Arc::new(SqliteCacheStore::connect(url).await?),
        CacheBackend::Redis { url } => Arc::new(RedisCacheStore::connect(url).await?),
    };

    info!(
        backend = store.backend(),
        ttl_secs = config.ttl.as_secs(),
        "Result cache initialized"
    );

    Ok(store)
}
