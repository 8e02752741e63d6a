//! Job state and the handles shared by every caller that joins a job.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Notify;

use crate::domain::{JobKey, Payload};
use crate::{Error, Result};

/// Lifecycle of a job as seen by pollers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// No job and no cached result for the key.
    NotStarted,
    /// Submitted, waiting for a worker.
    Pending,
    /// A worker is executing the query.
    Running,
    /// Result stored; terminal.
    Completed,
    /// Query failed or timed out; terminal.
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::NotStarted => "not_started",
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result shared by every waiter.
pub type JobOutcome = std::result::Result<Arc<Payload>, String>;

#[derive(Debug)]
struct JobState {
    status: JobStatus,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    error: Option<String>,
    payload: Option<Arc<Payload>>,
}

/// One deduplicated execution for a key.
///
/// Status only moves forward: Pending → Running → Completed | Failed.
#[derive(Debug)]
pub struct Job {
    id: String,
    key: JobKey,
    submitted_at: DateTime<Utc>,
    from_cache: bool,
    state: RwLock<JobState>,
    notify: Notify,
}

impl Job {
    /// Create a job in the Pending state.
    pub fn new(key: JobKey) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            key,
            submitted_at: Utc::now(),
            from_cache: false,
            state: RwLock::new(JobState {
                status: JobStatus::Pending,
                started_at: None,
                completed_at: None,
                error: None,
                payload: None,
            }),
            notify: Notify::new(),
        }
    }

    /// A detached, already completed job standing in for a cache hit.
    ///
    /// It never enters the registry and never ran, so it has no start time.
    pub fn from_cache(key: JobKey, payload: Arc<Payload>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            key,
            submitted_at: now,
            from_cache: true,
            state: RwLock::new(JobState {
                status: JobStatus::Completed,
                started_at: None,
                completed_at: Some(now),
                error: None,
                payload: Some(payload),
            }),
            notify: Notify::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key(&self) -> &JobKey {
        &self.key
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn status(&self) -> JobStatus {
        self.state.read().status
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().completed_at
    }

    pub fn is_from_cache(&self) -> bool {
        self.from_cache
    }

    fn transition(&self, from: JobStatus, to: JobStatus, state: &mut JobState) -> Result<()> {
        if state.status != from {
            return Err(Error::InvalidStateTransition {
                from: state.status.to_string(),
                to: to.to_string(),
            });
        }
        state.status = to;
        Ok(())
    }

    /// Pending → Running.
    pub(crate) fn mark_running(&self) -> Result<()> {
        let mut state = self.state.write();
        self.transition(JobStatus::Pending, JobStatus::Running, &mut state)?;
        state.started_at = Some(Utc::now());
        Ok(())
    }

    /// Running → Completed. The cache write must already have happened.
    pub(crate) fn complete(&self, payload: Arc<Payload>) -> Result<()> {
        {
            let mut state = self.state.write();
            self.transition(JobStatus::Running, JobStatus::Completed, &mut state)?;
            state.completed_at = Some(Utc::now());
            state.payload = Some(payload);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    /// Running → Failed.
    pub(crate) fn fail(&self, error: impl Into<String>) -> Result<()> {
        {
            let mut state = self.state.write();
            self.transition(JobStatus::Running, JobStatus::Failed, &mut state)?;
            state.completed_at = Some(Utc::now());
            state.error = Some(error.into());
        }
        self.notify.notify_waiters();
        Ok(())
    }

    /// The terminal outcome, if reached.
    pub fn outcome(&self) -> Option<JobOutcome> {
        let state = self.state.read();
        match state.status {
            JobStatus::Completed => state.payload.clone().map(Ok),
            JobStatus::Failed => Some(Err(state
                .error
                .clone()
                .unwrap_or_else(|| "unknown error".to_string()))),
            _ => None,
        }
    }

    /// Wait until the job reaches a terminal state.
    pub async fn wait(&self) -> JobOutcome {
        loop {
            if let Some(outcome) = self.outcome() {
                return outcome;
            }

            let notified = self.notify.notified();
            if let Some(outcome) = self.outcome() {
                return outcome;
            }

            notified.await;
        }
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let state = self.state.read();
        JobSnapshot {
            id: self.id.clone(),
            key: self.key.clone(),
            status: state.status,
            submitted_at: self.submitted_at,
            started_at: state.started_at,
            completed_at: state.completed_at,
            error: state.error.clone(),
            record_count: state.payload.as_ref().map(|p| p.len()),
        }
    }
}

/// Point-in-time view of a job for logs and the API.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: String,
    pub key: JobKey,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub record_count: Option<usize>,
}

/// Shared reference to a job returned by `submit`.
///
/// Every caller that submits the same key while the job is live gets a
/// handle to the same underlying job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    job: Arc<Job>,
}

impl JobHandle {
    pub(crate) fn new(job: Arc<Job>) -> Self {
        Self { job }
    }

    pub(crate) fn cached(key: JobKey, payload: Arc<Payload>) -> Self {
        Self::new(Arc::new(Job::from_cache(key, payload)))
    }

    pub fn key(&self) -> &JobKey {
        self.job.key()
    }

    pub fn status(&self) -> JobStatus {
        self.job.status()
    }

    /// Whether this handle is a cache hit rather than a registry job.
    pub fn is_cached(&self) -> bool {
        self.job.is_from_cache()
    }

    /// The payload once Completed.
    pub fn payload(&self) -> Option<Arc<Payload>> {
        match self.job.outcome() {
            Some(Ok(payload)) => Some(payload),
            _ => None,
        }
    }

    /// The recorded error once Failed.
    pub fn error(&self) -> Option<String> {
        match self.job.outcome() {
            Some(Err(error)) => Some(error),
            _ => None,
        }
    }

    pub async fn wait(&self) -> JobOutcome {
        self.job.wait().await
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.job.snapshot()
    }

    pub(crate) fn job(&self) -> &Arc<Job> {
        &self.job
    }

    /// Whether two handles refer to the same job.
    pub fn same_job(&self, other: &JobHandle) -> bool {
        Arc::ptr_eq(&self.job, &other.job)
    }
}
