//! In-process cache backend.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{CacheEntry, CacheStore};
use crate::Result;
use crate::domain::{JobKey, Payload};

#[derive(Clone)]
struct StoredEntry {
    entry: CacheEntry,
    expires_at: Instant,
}

impl StoredEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Thread-safe in-memory cache.
///
/// Uses DashMap for concurrent access; expired entries are rejected on read
/// and swept by [`CacheStore::cleanup_expired`].
#[derive(Clone, Default)]
pub struct MemoryCacheStore {
    entries: Arc<DashMap<JobKey, StoredEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &JobKey) -> Result<Option<CacheEntry>> {
        let Some(stored) = self.entries.get(key) else {
            return Ok(None);
        };

        if stored.is_expired() {
            drop(stored); // Release the shard lock before removing
            self.entries.remove_if(key, |_, stored| stored.is_expired());
            return Ok(None);
        }

        Ok(Some(stored.entry.clone()))
    }

    async fn put(&self, key: &JobKey, payload: Arc<Payload>, ttl: Duration) -> Result<()> {
        let stored = StoredEntry {
            entry: CacheEntry {
                key: key.clone(),
                payload,
                written_at: Utc::now(),
                ttl,
            },
            expires_at: Instant::now() + ttl,
        };
        self.entries.insert(key.clone(), stored);
        Ok(())
    }

    async fn invalidate(&self, key: &JobKey) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn cleanup_expired(&self) -> Result<usize> {
        let before = self.entries.len();
        self.entries.retain(|_, stored| !stored.is_expired());
        Ok(before.saturating_sub(self.entries.len()))
    }
}
