//! Job purge service.
//!
//! Runs in the background and periodically drops terminal jobs that have
//! outlived the retention window, then asks the cache store to evict expired
//! entries.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::registry::JobManager;
use crate::Result;
use crate::config::JobConfig;

/// Configuration for job purging.
#[derive(Debug, Clone)]
pub struct PurgeConfig {
    /// How long a terminal job stays registered. Zero disables purging of jobs.
    pub retention: Duration,
    /// Interval between sweeps.
    pub check_interval: Duration,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(300),
            check_interval: Duration::from_secs(60),
        }
    }
}

impl PurgeConfig {
    pub fn from_job_config(jobs: &JobConfig) -> Self {
        Self {
            retention: jobs.failed_job_retention,
            check_interval: jobs.purge_interval,
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_check_interval(mut self, check_interval: Duration) -> Self {
        self.check_interval = check_interval;
        self
    }
}

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub jobs: usize,
    pub cache_entries: usize,
}

pub struct JobPurgeService {
    config: PurgeConfig,
    registry: Arc<JobManager>,
}

impl JobPurgeService {
    pub fn new(config: PurgeConfig, registry: Arc<JobManager>) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &PurgeConfig {
        &self.config
    }

    /// Run a single sweep.
    pub async fn run_purge(&self) -> Result<PurgeReport> {
        let jobs = if self.config.retention.is_zero() {
            0
        } else {
            self.registry.purge_terminal(self.config.retention)
        };

        let cache_entries = self.registry.cache().cleanup_expired().await?;

        let report = PurgeReport {
            jobs,
            cache_entries,
        };
        if report.jobs > 0 || report.cache_entries > 0 {
            info!(
                jobs = report.jobs,
                cache_entries = report.cache_entries,
                retention_secs = self.config.retention.as_secs(),
                "Purged stale jobs and cache entries"
            );
        } else {
            debug!("Nothing to purge");
        }

        Ok(report)
    }

    /// Start the background purge task.
    pub fn start_background_task(self, cancellation_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut check_interval = interval(self.config.check_interval.max(Duration::from_millis(1)));
            check_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                retention_secs = self.config.retention.as_secs(),
                interval_secs = self.config.check_interval.as_secs(),
                "Job purge service started"
            );

            loop {
                tokio::select! {
                    _ = cancellation_token.cancelled() => {
                        info!("Job purge service shutting down");
                        break;
                    }
                    _ = check_interval.tick() => {
                        if let Err(e) = self.run_purge().await {
                            error!(error = %e, "Purge cycle failed");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::cache::{CacheStore, MemoryCacheStore};
    use crate::domain::{JobKey, Payload, RepoSelection};
    use crate::jobs::{ExecutionHarness, HarnessConfig, JobWork};

    fn registry(cache: Arc<MemoryCacheStore>) -> Arc<JobManager> {
        let harness = ExecutionHarness::new(cache.clone(), HarnessConfig::default());
        Arc::new(JobManager::new(cache, harness))
    }

    #[test]
    fn test_purge_config_builder() {
        let config = PurgeConfig::default()
            .with_retention(Duration::from_secs(10))
            .with_check_interval(Duration::from_secs(5));
        assert_eq!(config.retention, Duration::from_secs(10));
        assert_eq!(config.check_interval, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_run_purge_removes_expired_failures_and_entries() {
        let cache = Arc::new(MemoryCacheStore::new());
        let registry = registry(cache.clone());
        let key = JobKey::fingerprint("commits", &RepoSelection::new([7i64]));

        let handle = registry
            .submit(
                key,
                JobWork::new("commits", || async { Err(Error::query_execution("commits", "boom")) }),
            )
            .await;
        let _ = handle.wait().await;

        let stale = JobKey::fingerprint("prs", &RepoSelection::new([7i64]));
        cache
            .put(&stale, Arc::new(Payload::default()), Duration::ZERO)
            .await
            .unwrap();

        let service = JobPurgeService::new(
            PurgeConfig::default().with_retention(Duration::from_nanos(1)),
            registry.clone(),
        );
        tokio::time::sleep(Duration::from_millis(5)).await;

        let report = service.run_purge().await.unwrap();
        assert_eq!(report.jobs, 1);
        assert_eq!(report.cache_entries, 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_zero_retention_keeps_jobs() {
        let cache = Arc::new(MemoryCacheStore::new());
        let registry = registry(cache);
        let key = JobKey::fingerprint("commits", &RepoSelection::new([1i64]));
        let handle = registry
            .submit(
                key,
                JobWork::new("commits", || async { Err(Error::query_execution("commits", "boom")) }),
            )
            .await;
        let _ = handle.wait().await;

        let service = JobPurgeService::new(
            PurgeConfig::default().with_retention(Duration::ZERO),
            registry.clone(),
        );
        assert_eq!(service.run_purge().await.unwrap().jobs, 0);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_background_task_stops_on_cancel() {
        let cache = Arc::new(MemoryCacheStore::new());
        let service = JobPurgeService::new(
            PurgeConfig::default().with_check_interval(Duration::from_millis(10)),
            registry(cache),
        );
        let token = CancellationToken::new();
        let task = service.start_background_task(token.clone());

        tokio::time::sleep(Duration::from_millis(30)).await;
        token.cancel();
        task.await.unwrap();
    }
}
