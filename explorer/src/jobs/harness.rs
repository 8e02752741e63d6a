//! Execution harness: a bounded worker pool for query jobs.
//!
//! Each dispatched job waits for a semaphore permit (staying Pending), runs
//! under a timeout (Running), then writes its payload to the cache before
//! becoming Completed. Errors, panics, timeouts and schema violations all end
//! in Failed and never reach the submitter.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::job::Job;
use super::work::JobWork;
use crate::Error;
use crate::cache::CacheStore;
use crate::config::{DEFAULT_CACHE_TTL, DEFAULT_JOB_TIMEOUT, JobConfig};
use crate::domain::Payload;

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Maximum concurrent executions.
    pub max_workers: usize,
    /// If a job exceeds this duration its future is dropped and the job fails.
    pub job_timeout: Duration,
    /// TTL of the cache entry written on success.
    pub cache_ttl: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            job_timeout: DEFAULT_JOB_TIMEOUT,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

impl HarnessConfig {
    pub fn from_job_config(jobs: &JobConfig, cache_ttl: Duration) -> Self {
        Self {
            max_workers: jobs.max_workers,
            job_timeout: jobs.job_timeout,
            cache_ttl,
        }
    }
}

/// Runs query jobs off the poll-serving path.
#[derive(Clone)]
pub struct ExecutionHarness {
    config: HarnessConfig,
    semaphore: Arc<Semaphore>,
    active_workers: Arc<AtomicUsize>,
    cache: Arc<dyn CacheStore>,
}

impl ExecutionHarness {
    pub fn new(cache: Arc<dyn CacheStore>, config: HarnessConfig) -> Self {
        info!(
            max_workers = config.max_workers,
            timeout_secs = config.job_timeout.as_secs(),
            "Query worker pool ready"
        );
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_workers.max(1))),
            active_workers: Arc::new(AtomicUsize::new(0)),
            config,
            cache,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Number of jobs currently executing.
    pub fn active_count(&self) -> usize {
        self.active_workers.load(Ordering::SeqCst)
    }

    /// Stop accepting work. Jobs still waiting for a permit fail.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_running(&self) -> bool {
        !self.semaphore.is_closed()
    }

    /// Spawn the job onto the pool and return immediately.
    pub fn dispatch(&self, job: Arc<Job>, work: JobWork) -> JoinHandle<()> {
        let harness = self.clone();
        tokio::spawn(async move { harness.execute(job, work).await })
    }

    async fn execute(&self, job: Arc<Job>, work: JobWork) {
        let key = job.key().clone();

        let permit = match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                // Pool closed while queued; the job still has to pass through Running.
                if job.mark_running().is_ok() {
                    let _ = job.fail("worker pool shut down");
                }
                warn!(key = %key, "Dropped queued job: worker pool shut down");
                return;
            }
        };

        if let Err(e) = job.mark_running() {
            warn!(key = %key, error = %e, "Refusing to run job");
            return;
        }

        self.active_workers.fetch_add(1, Ordering::SeqCst);
        let (label, schema, future) = work.into_parts();
        debug!(key = %key, job_id = %job.id(), query = %label, "Job started");
        let started = Instant::now();

        let outcome = tokio::time::timeout(
            self.config.job_timeout,
            AssertUnwindSafe(future).catch_unwind(),
        )
        .await;

        let result = match outcome {
            Ok(Ok(Ok(records))) => match &schema {
                Some(schema) => schema.validate(&label, &records).map(|_| records),
                None => Ok(records),
            },
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(panic)) => Err(Error::query_execution(
                &label,
                format!("panicked: {}", panic_message(panic.as_ref())),
            )),
            Err(_) => Err(Error::Timeout {
                key: key.to_string(),
                timeout_secs: self.config.job_timeout.as_secs(),
            }),
        };

        match result {
            Ok(records) => {
                let payload = Arc::new(Payload::new(records));
                // A failed write still completes the job; this poller gets the
                // result, it just isn't shared.
                if let Err(e) = self
                    .cache
                    .put(&key, payload.clone(), self.config.cache_ttl)
                    .await
                {
                    warn!(
                        key = %key,
                        backend = self.cache.backend(),
                        error = %e,
                        "Cache write failed; result will not be shared"
                    );
                }

                let rows = payload.len();
                if let Err(e) = job.complete(payload) {
                    warn!(key = %key, error = %e, "Could not mark job completed");
                } else {
                    info!(
                        key = %key,
                        rows,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Job completed"
                    );
                }
            }
            Err(e) => {
                error!(
                    key = %key,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %e,
                    "Job failed"
                );
                if let Err(e) = job.fail(e.to_string()) {
                    warn!(key = %key, error = %e, "Could not mark job failed");
                }
            }
        }

        self.active_workers.fetch_sub(1, Ordering::SeqCst);
        drop(permit);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
