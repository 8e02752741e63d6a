//! Cache store behaviour shared by every backend that runs without external
//! services.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use explorer::cache::{CacheStore, MemoryCacheStore, SqliteCacheStore, create_cache_store};
use explorer::config::{CacheBackend, CacheConfig};
use explorer::domain::{JobKey, Payload, Record, RepoSelection};

fn key(identity: &str) -> JobKey {
    JobKey::fingerprint(identity, &RepoSelection::new([1i64, 2]))
}

fn payload(rows: usize) -> Arc<Payload> {
    let records = (0..rows)
        .map(|i| {
            let mut record = Record::new();
            record.insert("id".to_string(), json!(i));
            record.insert("date".to_string(), json!("2022-06-01T00:00:00"));
            record
        })
        .collect();
    Arc::new(Payload::new(records))
}

async fn exercise(store: &dyn CacheStore) {
    assert!(store.get(&key("commits")).await.unwrap().is_none());

    store
        .put(&key("commits"), payload(3), Duration::from_secs(60))
        .await
        .unwrap();
    let entry = store.get(&key("commits")).await.unwrap().unwrap();
    assert_eq!(entry.payload.as_ref(), payload(3).as_ref());
    assert_eq!(entry.key, key("commits"));

    // Last writer wins.
    store
        .put(&key("commits"), payload(1), Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(store.get(&key("commits")).await.unwrap().unwrap().payload.len(), 1);

    store.invalidate(&key("commits")).await.unwrap();
    assert!(store.get(&key("commits")).await.unwrap().is_none());
}

#[tokio::test]
async fn memory_store_contract() {
    exercise(&MemoryCacheStore::new()).await;
}

#[tokio::test]
async fn sqlite_store_contract() {
    let store = SqliteCacheStore::connect("sqlite::memory:").await.unwrap();
    exercise(&store).await;
}

#[tokio::test]
async fn sqlite_file_is_shared_between_stores() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}?mode=rwc", dir.path().join("cache.db").display());

    let writer = SqliteCacheStore::connect(&url).await.unwrap();
    let reader = SqliteCacheStore::connect(&url).await.unwrap();

    writer
        .put(&key("prs"), payload(2), Duration::from_secs(60))
        .await
        .unwrap();
    let entry = reader.get(&key("prs")).await.unwrap().unwrap();
    assert_eq!(entry.payload.len(), 2);
}

#[tokio::test]
async fn expired_entries_are_misses_and_swept() {
    let store = SqliteCacheStore::connect("sqlite::memory:").await.unwrap();
    store
        .put(&key("contributors"), payload(1), Duration::ZERO)
        .await
        .unwrap();
    store
        .put(&key("commits"), payload(1), Duration::from_secs(60))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(store.get(&key("contributors")).await.unwrap().is_none());
    assert_eq!(store.cleanup_expired().await.unwrap(), 1);
    assert!(store.get(&key("commits")).await.unwrap().is_some());
}

#[tokio::test]
async fn factory_builds_configured_backend() {
    let store = create_cache_store(&CacheConfig {
        backend: CacheBackend::Sqlite {
            url: "sqlite::memory:".to_string(),
        },
        ttl: Duration::from_secs(60),
    })
    .await
    .unwrap();
    assert_eq!(store.backend(), "sqlite");

    let store = create_cache_store(&CacheConfig::default()).await.unwrap();
    assert_eq!(store.backend(), "memory");
}
