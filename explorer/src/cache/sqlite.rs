//! SQLite cache backend.
//!
//! Every server process on a host opens the same database file, so a result
//! computed by one worker is visible to the others. WAL mode keeps readers
//! from blocking the writer.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use super::retry::BusyRetry;
use super::{CacheEntry, CacheStore};
use crate::domain::{JobKey, Payload};
use crate::{Error, Result};

/// Default connection pool size.
const DEFAULT_POOL_SIZE: u32 = 4;

/// Default busy timeout in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS query_cache (
    key TEXT PRIMARY KEY NOT NULL,
    payload TEXT NOT NULL,
    written_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL
)"#;

/// Cache backed by a `query_cache` table.
#[derive(Clone)]
pub struct SqliteCacheStore {
    pool: SqlitePool,
    retry: BusyRetry,
}

impl SqliteCacheStore {
    /// Open (creating if needed) the database at `database_url`.
    ///
    /// # Arguments
    /// * `database_url` - SQLite URL, e.g. "sqlite:cache.db?mode=rwc"
    pub async fn connect(database_url: &str) -> Result<Self> {
        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
            .create_if_missing(true);

        // Each connection to an in-memory database is a separate database.
        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            DEFAULT_POOL_SIZE
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(connect_options)
            .await
            .map_err(|e| Error::cache_unavailable(format!("{database_url}: {e}")))?;

        Self::with_pool(pool).await
    }

    /// Use an existing pool, creating the cache table if missing.
    pub async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_query_cache_expires ON query_cache (expires_at)")
            .execute(&pool)
            .await?;
        Ok(Self {
            pool,
            retry: BusyRetry::default(),
        })
    }

    /// Override the busy-lock backoff.
    pub fn with_retry(mut self, retry: BusyRetry) -> Self {
        self.retry = retry;
        self
    }

    fn now_millis() -> i64 {
        Utc::now().timestamp_millis()
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn get(&self, key: &JobKey) -> Result<Option<CacheEntry>> {
        let now = Self::now_millis();
        let row: Option<(String, i64, i64)> = self
            .retry
            .run("cache get", || async {
                Ok(sqlx::query_as::<_, (String, i64, i64)>(
                    "SELECT payload, written_at, expires_at FROM query_cache WHERE key = ? AND expires_at > ?",
                )
                .bind(key.as_str())
                .bind(now)
                .fetch_optional(&self.pool)
                .await?)
            })
            .await?;

        let Some((raw, written_at, expires_at)) = row else {
            return Ok(None);
        };

        let payload: Payload = serde_json::from_str(&raw)?;
        let written_at = Utc
            .timestamp_millis_opt(written_at)
            .single()
            .unwrap_or_else(Utc::now);
        let ttl_ms = expires_at.saturating_sub(written_at.timestamp_millis()).max(0) as u64;

        Ok(Some(CacheEntry {
            key: key.clone(),
            payload: Arc::new(payload),
            written_at,
            ttl: Duration::from_millis(ttl_ms),
        }))
    }

    async fn put(&self, key: &JobKey, payload: Arc<Payload>, ttl: Duration) -> Result<()> {
        let raw = serde_json::to_string(payload.as_ref())?;
        let written_at = Self::now_millis();
        let expires_at = written_at.saturating_add(ttl.as_millis() as i64);

        self.retry.run("cache put", || async {
            sqlx::query(
                r#"
                INSERT INTO query_cache (key, payload, written_at, expires_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET
                    payload = excluded.payload,
                    written_at = excluded.written_at,
                    expires_at = excluded.expires_at
                "#,
            )
            .bind(key.as_str())
            .bind(&raw)
            .bind(written_at)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn invalidate(&self, key: &JobKey) -> Result<()> {
        self.retry.run("cache invalidate", || async {
            sqlx::query("DELETE FROM query_cache WHERE key = ?")
                .bind(key.as_str())
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn cleanup_expired(&self) -> Result<usize> {
        let now = Self::now_millis();
        self.retry.run("cache cleanup", || async {
            let result = sqlx::query("DELETE FROM query_cache WHERE expires_at <= ?")
                .bind(now)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() as usize)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Record, RepoSelection};
    use serde_json::json;

    fn key() -> JobKey {
        JobKey::fingerprint("contributors", &RepoSelection::new([4i64, 2]))
    }

    fn payload() -> Arc<Payload> {
        let mut record = Record::new();
        record.insert("Action".to_string(), json!("Commit"));
        record.insert("repo_id".to_string(), json!(2));
        Arc::new(Payload::new(vec![record]))
    }

    #[tokio::test]
    async fn test_in_memory_round_trip() {
        let store = SqliteCacheStore::connect("sqlite::memory:").await.unwrap();
        store
            .put(&key(), payload(), Duration::from_secs(60))
            .await
            .unwrap();

        let entry = store.get(&key()).await.unwrap().unwrap();
        assert_eq!(*entry.payload, *payload());
        assert_eq!(entry.ttl, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let store = SqliteCacheStore::connect("sqlite::memory:").await.unwrap();
        store
            .put(&key(), payload(), Duration::from_millis(5))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(store.get(&key()).await.unwrap().is_none());
        assert_eq!(store.cleanup_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_custom_retry_policy() {
        let policy = BusyRetry {
            max_retries: 1,
            ..BusyRetry::default()
        };
        let store = SqliteCacheStore::connect("sqlite::memory:")
            .await
            .unwrap()
            .with_retry(policy);
        assert_eq!(store.retry, policy);
        assert!(store.get(&key()).await.unwrap().is_none());
    }
}
