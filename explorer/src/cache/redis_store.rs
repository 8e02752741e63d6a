//! Redis cache backend.
//!
//! Entries are written with `SET .. PX` so Redis expires them itself; every
//! server instance connected to the same Redis sees the same results.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::{CacheEntry, CacheStore};
use crate::domain::{JobKey, Payload};
use crate::{Error, Result};

/// Namespace for every key this store writes.
const KEY_PREFIX: &str = "explorer:cache:";

#[derive(Serialize, Deserialize)]
struct StoredEntry {
    payload: Payload,
    written_at: DateTime<Utc>,
    ttl_ms: u64,
}

/// Cache backed by a Redis server.
#[derive(Clone)]
pub struct RedisCacheStore {
    connection: ConnectionManager,
}

impl RedisCacheStore {
    /// Connect to `url`, e.g. "redis://localhost:6379".
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::cache_unavailable(format!("{url}: {e}")))?;

        info!(url = %url, "Connected to Redis cache");
        Ok(Self { connection })
    }

    /// `explorer:cache:<key>`
    fn redis_key(key: &JobKey) -> String {
        format!("{KEY_PREFIX}{key}")
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &JobKey) -> Result<Option<CacheEntry>> {
        let mut connection = self.connection.clone();
        let raw: Option<String> = connection.get(Self::redis_key(key)).await?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        let stored: StoredEntry = serde_json::from_str(&raw)?;
        Ok(Some(CacheEntry {
            key: key.clone(),
            payload: Arc::new(stored.payload),
            written_at: stored.written_at,
            ttl: Duration::from_millis(stored.ttl_ms),
        }))
    }

    async fn put(&self, key: &JobKey, payload: Arc<Payload>, ttl: Duration) -> Result<()> {
        // PX 0 is rejected by Redis.
        let ttl_ms = (ttl.as_millis() as u64).max(1);
        let stored = StoredEntry {
            payload: payload.as_ref().clone(),
            written_at: Utc::now(),
            ttl_ms,
        };
        let raw = serde_json::to_string(&stored)?;

        let mut connection = self.connection.clone();
        let _: () = connection
            .pset_ex(Self::redis_key(key), raw, ttl_ms)
            .await?;
        Ok(())
    }

    async fn invalidate(&self, key: &JobKey) -> Result<()> {
        let mut connection = self.connection.clone();
        let _: () = connection.del(Self::redis_key(key)).await?;
        Ok(())
    }

    async fn cleanup_expired(&self) -> Result<usize> {
        // Redis evicts expired keys on its own.
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RepoSelection;

    #[test]
    fn test_redis_key_is_namespaced() {
        let key = JobKey::fingerprint("commits", &RepoSelection::new([1i64, 2]));
        assert_eq!(RedisCacheStore::redis_key(&key), "explorer:cache:commits:[1,2]");
    }

    #[test]
    fn test_stored_entry_serialization() {
        let stored = StoredEntry {
            payload: Payload::default(),
            written_at: Utc::now(),
            ttl_ms: 300_000,
        };
        let raw = serde_json::to_string(&stored).unwrap();
        let decoded: StoredEntry = serde_json::from_str(&raw).unwrap();
        assert_eq!(decoded.ttl_ms, 300_000);
        assert!(decoded.payload.is_empty());
    }
}
