//! Poll adapter: the single contract every visualization calls per timer tick.
//!
//! A tick never waits on the database. It either returns data, or tells the
//! UI to show a placeholder and when (if ever) to poll again.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::job::{JobHandle, JobStatus};
use super::registry::JobManager;
use super::work::JobWork;
use crate::config::PollConfig;
use crate::database::AnalyticsDatabase;
use crate::domain::{JobKey, Payload, RepoSelection};
use crate::queries::QueryFunction;
use crate::Result;

/// What the component should do with its figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayDirective {
    /// Result served from cache; the component renders it without a job refresh.
    Unchanged,
    /// A job just finished; render the fresh result.
    Refresh,
    /// Show the loading placeholder.
    Loading,
    /// Show the "no data" placeholder.
    NoData,
}

/// Whether the UI timer should fire again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PollDirective {
    Continue { after_ms: u64 },
    Stop,
}

impl PollDirective {
    pub fn continue_after(interval: Duration) -> Self {
        Self::Continue {
            after_ms: interval.as_millis() as u64,
        }
    }

    pub fn after(&self) -> Option<Duration> {
        match self {
            PollDirective::Continue { after_ms } => Some(Duration::from_millis(*after_ms)),
            PollDirective::Stop => None,
        }
    }

    pub fn should_continue(&self) -> bool {
        matches!(self, PollDirective::Continue { .. })
    }

    /// Value for a capped tick counter: 0 re-arms the timer, `max_intervals`
    /// stops it.
    pub fn tick_count(&self, max_intervals: u32) -> u32 {
        match self {
            PollDirective::Continue { .. } => 0,
            PollDirective::Stop => max_intervals,
        }
    }
}

/// Result of one poll tick.
#[derive(Debug, Clone, Serialize)]
pub struct PollOutcome {
    pub ready: bool,
    pub payload: Option<Arc<Payload>>,
    pub display: DisplayDirective,
    pub poll: PollDirective,
}

impl PollOutcome {
    pub fn no_data() -> Self {
        Self {
            ready: false,
            payload: None,
            display: DisplayDirective::NoData,
            poll: PollDirective::Stop,
        }
    }

    pub fn loading(interval: Duration) -> Self {
        Self {
            ready: false,
            payload: None,
            display: DisplayDirective::Loading,
            poll: PollDirective::continue_after(interval),
        }
    }

    pub fn cached(payload: Arc<Payload>) -> Self {
        Self {
            ready: true,
            payload: Some(payload),
            display: DisplayDirective::Unchanged,
            poll: PollDirective::Stop,
        }
    }

    pub fn refreshed(payload: Arc<Payload>) -> Self {
        Self {
            ready: true,
            payload: Some(payload),
            display: DisplayDirective::Refresh,
            poll: PollDirective::Stop,
        }
    }
}

/// Converts UI poll ticks into job submissions and status reads.
pub struct PollAdapter {
    registry: Arc<JobManager>,
    database: Arc<dyn AnalyticsDatabase>,
    config: PollConfig,
}

impl PollAdapter {
    pub fn new(
        registry: Arc<JobManager>,
        database: Arc<dyn AnalyticsDatabase>,
        config: PollConfig,
    ) -> Self {
        Self {
            registry,
            database,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<JobManager> {
        &self.registry
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// One tick for `query` over `selection`.
    pub async fn poll(
        &self,
        query: &Arc<dyn QueryFunction>,
        selection: &RepoSelection,
    ) -> PollOutcome {
        if let Err(e) = Self::accept(query, selection) {
            debug!(query = query.identity(), error = %e, "Selection rejected; nothing to poll");
            return PollOutcome::no_data();
        }

        let key = JobKey::fingerprint(query.identity(), selection);

        // A registered job wins over the cache so that the poller which
        // triggered it sees the Refresh transition exactly once.
        let handle = match self.registry.get(&key) {
            Some(handle) => handle,
            None => {
                let work = JobWork::for_query(
                    query.clone(),
                    self.database.clone(),
                    selection.clone(),
                );
                self.registry.submit(key, work).await
            }
        };

        self.observe(&handle)
    }

    /// User-triggered re-request after a failure or to force fresh data.
    pub async fn retry(
        &self,
        query: &Arc<dyn QueryFunction>,
        selection: &RepoSelection,
    ) -> PollOutcome {
        if let Err(e) = Self::accept(query, selection) {
            debug!(query = query.identity(), error = %e, "Selection rejected; not retrying");
            return PollOutcome::no_data();
        }

        let key = JobKey::fingerprint(query.identity(), selection);
        let work = JobWork::for_query(query.clone(), self.database.clone(), selection.clone());
        let handle = self.registry.retry(key, work).await;
        self.observe(&handle)
    }

    fn accept(query: &Arc<dyn QueryFunction>, selection: &RepoSelection) -> Result<()> {
        selection.ensure_not_empty()?;
        query.validate(selection)
    }

    fn observe(&self, handle: &JobHandle) -> PollOutcome {
        match handle.status() {
            JobStatus::NotStarted | JobStatus::Pending | JobStatus::Running => {
                PollOutcome::loading(self.config.interval)
            }
            JobStatus::Completed => match handle.payload() {
                Some(payload) if handle.is_cached() => PollOutcome::cached(payload),
                Some(payload) => {
                    self.registry.retire(handle);
                    PollOutcome::refreshed(payload)
                }
                None => PollOutcome::no_data(),
            },
            JobStatus::Failed => {
                debug!(
                    key = %handle.key(),
                    error = %handle.error().unwrap_or_default(),
                    "Job failed; showing no-data placeholder"
                );
                PollOutcome::no_data()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_count() {
        assert_eq!(PollDirective::continue_after(Duration::from_millis(800)).tick_count(1), 0);
        assert_eq!(PollDirective::Stop.tick_count(1), 1);
        assert_eq!(PollDirective::Stop.tick_count(5), 5);
    }

    #[test]
    fn test_directive_serialization() {
        let json = serde_json::to_value(PollDirective::continue_after(Duration::from_millis(800)))
            .unwrap();
        assert_eq!(json, serde_json::json!({"action": "continue", "after_ms": 800}));

        let json = serde_json::to_value(PollDirective::Stop).unwrap();
        assert_eq!(json, serde_json::json!({"action": "stop"}));
    }

    #[test]
    fn test_outcome_constructors() {
        let loading = PollOutcome::loading(Duration::from_millis(500));
        assert!(!loading.ready);
        assert_eq!(loading.display, DisplayDirective::Loading);
        assert_eq!(loading.poll.after(), Some(Duration::from_millis(500)));

        let no_data = PollOutcome::no_data();
        assert!(!no_data.poll.should_continue());
        assert!(no_data.payload.is_none());
    }
}
