//! Job registry: at most one live job per key.
//!
//! Concurrent submissions for the same key serialize on that key's slot in
//! the DashMap (entry API); different keys never contend beyond shard locks.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::harness::ExecutionHarness;
use super::job::{Job, JobHandle, JobSnapshot, JobStatus};
use super::work::JobWork;
use crate::cache::CacheStore;
use crate::domain::{JobKey, Payload};
use crate::{Error, Result};

/// Counts of registered jobs by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub active_workers: usize,
}

/// Process-wide map from fingerprint to job.
///
/// Constructed once and shared through `Arc`; nothing here is global.
pub struct JobManager {
    jobs: DashMap<JobKey, Arc<Job>>,
    cache: Arc<dyn CacheStore>,
    harness: ExecutionHarness,
}

impl JobManager {
    pub fn new(cache: Arc<dyn CacheStore>, harness: ExecutionHarness) -> Self {
        Self {
            jobs: DashMap::new(),
            cache,
            harness,
        }
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    pub fn harness(&self) -> &ExecutionHarness {
        &self.harness
    }

    /// Submit work for `key`, or join the job already registered for it.
    ///
    /// A fresh cache entry short-circuits to a detached, completed handle and
    /// starts nothing. Cache read errors count as a miss.
    pub async fn submit(&self, key: JobKey, work: JobWork) -> JobHandle {
        if let Some(existing) = self.jobs.get(&key) {
            return JobHandle::new(existing.clone());
        }

        match self.cache.get(&key).await {
            Ok(Some(entry)) => {
                debug!(key = %key, "Cache hit on submit");
                return JobHandle::cached(key, entry.payload);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(
                    key = %key,
                    backend = self.cache.backend(),
                    error = %e,
                    "Cache read failed; treating as miss"
                );
            }
        }

        self.submit_uncached(key, work)
    }

    /// Register and dispatch without consulting the cache.
    fn submit_uncached(&self, key: JobKey, work: JobWork) -> JobHandle {
        let job = match self.jobs.entry(key) {
            Entry::Occupied(entry) => {
                // Another caller beat us to it.
                return JobHandle::new(entry.get().clone());
            }
            Entry::Vacant(entry) => {
                let job = Arc::new(Job::new(entry.key().clone()));
                entry.insert(job.clone());
                job
            }
        };

        debug!(key = %job.key(), job_id = %job.id(), query = %work.label(), "Job submitted");
        self.harness.dispatch(job.clone(), work);
        JobHandle::new(job)
    }

    /// The registered job for `key`, if any.
    pub fn get(&self, key: &JobKey) -> Option<JobHandle> {
        self.jobs.get(key).map(|job| JobHandle::new(job.clone()))
    }

    /// Status of `key`; NotStarted when nothing is registered.
    pub fn status(&self, key: &JobKey) -> JobStatus {
        self.jobs
            .get(key)
            .map(|job| job.status())
            .unwrap_or(JobStatus::NotStarted)
    }

    /// The payload of a Completed job.
    pub fn result(&self, key: &JobKey) -> Result<Arc<Payload>> {
        let handle = self.get(key).ok_or_else(|| Error::JobNotReady {
            key: key.to_string(),
            status: JobStatus::NotStarted.to_string(),
        })?;

        handle.payload().ok_or_else(|| Error::JobNotReady {
            key: key.to_string(),
            status: handle.status().to_string(),
        })
    }

    /// Remove a terminal job so the key can be submitted again.
    ///
    /// Returns false when nothing was removed (absent or still in flight).
    pub fn clear(&self, key: &JobKey) -> bool {
        let removed = self
            .jobs
            .remove_if(key, |_, job| job.status().is_terminal())
            .is_some();
        if removed {
            debug!(key = %key, "Job cleared");
        }
        removed
    }

    /// User-triggered re-request: drop any terminal job and cached result,
    /// then start a new cycle. Joins the live job if one is still running.
    pub async fn retry(&self, key: JobKey, work: JobWork) -> JobHandle {
        self.clear(&key);
        if let Err(e) = self.cache.invalidate(&key).await {
            warn!(key = %key, error = %e, "Failed to invalidate cached result");
        }
        info!(key = %key, "Retrying job");
        self.submit_uncached(key, work)
    }

    /// Retire a completed job once a poller has observed it.
    ///
    /// Only removes the exact job behind `handle`, never a newer one.
    pub fn retire(&self, handle: &JobHandle) -> bool {
        if handle.is_cached() || handle.status() != JobStatus::Completed {
            return false;
        }
        self.jobs
            .remove_if(handle.key(), |_, job| Arc::ptr_eq(job, handle.job()))
            .is_some()
    }

    /// Remove terminal jobs that finished more than `older_than` ago.
    pub fn purge_terminal(&self, older_than: Duration) -> usize {
        let cutoff = chrono::Utc::now()
            - chrono::Duration::from_std(older_than).unwrap_or(chrono::Duration::zero());
        let before = self.jobs.len();
        self.jobs.retain(|_, job| {
            !(job.status().is_terminal() && job.completed_at().is_some_and(|at| at <= cutoff))
        });
        before.saturating_sub(self.jobs.len())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Snapshots of every registered job.
    pub fn snapshots(&self) -> Vec<JobSnapshot> {
        let mut snapshots: Vec<JobSnapshot> =
            self.jobs.iter().map(|job| job.snapshot()).collect();
        snapshots.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));
        snapshots
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            active_workers: self.harness.active_count(),
            ..Default::default()
        };
        for job in self.jobs.iter() {
            match job.status() {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::NotStarted => {}
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::domain::{Record, RepoSelection};
    use crate::jobs::harness::HarnessConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key() -> JobKey {
        JobKey::fingerprint("commits", &RepoSelection::new([1i64, 2]))
    }

    fn manager(cache: Arc<MemoryCacheStore>) -> Arc<JobManager> {
        let harness = ExecutionHarness::new(cache.clone(), HarnessConfig::default());
        Arc::new(JobManager::new(cache, harness))
    }

    fn counting_work(counter: Arc<AtomicUsize>, delay: Duration) -> JobWork {
        JobWork::new("commits", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            Ok(vec![Record::new()])
        })
    }

    fn failing_work() -> JobWork {
        JobWork::new("commits", || async { Err(Error::query_execution("commits", "boom")) })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submits_execute_once() {
        let cache = Arc::new(MemoryCacheStore::new());
        let manager = manager(cache);
        let counter = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let manager = manager.clone();
            let counter = counter.clone();
            tasks.push(tokio::spawn(async move {
                let handle = manager
                    .submit(key(), counting_work(counter, Duration::from_millis(50)))
                    .await;
                handle.wait().await.map(|p| p.len())
            }));
        }

        for task in tasks {
            assert_eq!(task.await.unwrap(), Ok(1));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn test_status_and_result() {
        let cache = Arc::new(MemoryCacheStore::new());
        let manager = manager(cache);
        assert_eq!(manager.status(&key()), JobStatus::NotStarted);
        match manager.result(&key()) {
            Err(e @ Error::JobNotReady { .. }) => assert!(e.to_string().contains("not_started")),
            other => panic!("expected JobNotReady, got {other:?}"),
        }

        let counter = Arc::new(AtomicUsize::new(0));
        let handle = manager
            .submit(key(), counting_work(counter, Duration::from_millis(10)))
            .await;
        assert!(matches!(
            manager.status(&key()),
            JobStatus::Pending | JobStatus::Running
        ));
        assert!(matches!(manager.result(&key()), Err(Error::JobNotReady { .. })));

        handle.wait().await.unwrap();
        assert_eq!(manager.status(&key()), JobStatus::Completed);
        assert_eq!(manager.result(&key()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fresh_cache_entry_skips_execution() {
        let cache = Arc::new(MemoryCacheStore::new());
        cache
            .put(&key(), Arc::new(Payload::default()), Duration::from_secs(60))
            .await
            .unwrap();
        let manager = manager(cache);
        let counter = Arc::new(AtomicUsize::new(0));

        let handle = manager
            .submit(key(), counting_work(counter.clone(), Duration::ZERO))
            .await;
        assert!(handle.is_cached());
        assert_eq!(handle.status(), JobStatus::Completed);
        assert!(manager.is_empty());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_clear_only_removes_terminal_jobs() {
        let cache = Arc::new(MemoryCacheStore::new());
        let manager = manager(cache);
        let counter = Arc::new(AtomicUsize::new(0));

        let handle = manager
            .submit(key(), counting_work(counter, Duration::from_millis(50)))
            .await;
        assert!(!manager.clear(&key()));

        handle.wait().await.unwrap();
        assert!(manager.clear(&key()));
        assert_eq!(manager.status(&key()), JobStatus::NotStarted);
    }

    #[tokio::test]
    async fn test_failed_job_is_sticky_until_retry() {
        let cache = Arc::new(MemoryCacheStore::new());
        let manager = manager(cache.clone());

        let handle = manager.submit(key(), failing_work()).await;
        assert!(handle.wait().await.is_err());

        // Joining a failed job does not re-run it.
        let counter = Arc::new(AtomicUsize::new(0));
        let again = manager
            .submit(key(), counting_work(counter.clone(), Duration::ZERO))
            .await;
        assert!(again.same_job(&handle));
        assert_eq!(again.status(), JobStatus::Failed);
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        let retried = manager
            .retry(key(), counting_work(counter.clone(), Duration::ZERO))
            .await;
        assert!(!retried.same_job(&handle));
        assert!(retried.wait().await.is_ok());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(cache.get(&key()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_retire_removes_only_observed_job() {
        let cache = Arc::new(MemoryCacheStore::new());
        let manager = manager(cache);
        let counter = Arc::new(AtomicUsize::new(0));

        let handle = manager
            .submit(key(), counting_work(counter, Duration::ZERO))
            .await;
        handle.wait().await.unwrap();

        assert!(manager.retire(&handle));
        assert!(manager.is_empty());
        assert!(!manager.retire(&handle));
    }

    #[tokio::test]
    async fn test_purge_terminal() {
        let cache = Arc::new(MemoryCacheStore::new());
        let manager = manager(cache);

        let handle = manager.submit(key(), failing_work()).await;
        let _ = handle.wait().await;

        assert_eq!(manager.purge_terminal(Duration::from_secs(60)), 0);
        assert_eq!(manager.purge_terminal(Duration::ZERO), 1);
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_stats() {
        let cache = Arc::new(MemoryCacheStore::new());
        let manager = manager(cache);
        let handle = manager.submit(key(), failing_work()).await;
        let _ = handle.wait().await;

        let stats = manager.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pending + stats.running + stats.completed, 0);
        assert_eq!(manager.snapshots().len(), 1);
    }
}
