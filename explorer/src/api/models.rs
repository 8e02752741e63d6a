//! Request and response bodies.

use serde::{Deserialize, Serialize};

use crate::domain::{JobKey, Record, RepoSelection};
use crate::jobs::{DisplayDirective, JobSnapshot, PollDirective, PollOutcome, RegistryStats};

/// `?repos=1,2,3`
#[derive(Debug, Default, Deserialize)]
pub struct SelectionParams {
    #[serde(default)]
    pub repos: Option<String>,
}

impl SelectionParams {
    pub fn selection(&self) -> RepoSelection {
        self.repos
            .as_deref()
            .map(RepoSelection::parse)
            .unwrap_or_default()
    }
}

/// One poll tick as the UI consumes it.
#[derive(Debug, Serialize)]
pub struct PollResponse {
    pub key: JobKey,
    pub ready: bool,
    pub records: Option<Vec<Record>>,
    pub display: DisplayDirective,
    pub poll: PollDirective,
    /// Value to write back into the UI timer's tick counter.
    pub n_intervals: u32,
}

impl PollResponse {
    pub fn from_outcome(key: JobKey, outcome: PollOutcome, max_intervals: u32) -> Self {
        Self {
            key,
            ready: outcome.ready,
            records: outcome.payload.map(|payload| payload.records.clone()),
            display: outcome.display,
            n_intervals: outcome.poll.tick_count(max_intervals),
            poll: outcome.poll,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QueryListResponse {
    pub queries: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct JobStatsResponse {
    pub cache_backend: &'static str,
    pub max_workers: usize,
    #[serde(flatten)]
    pub stats: RegistryStats,
    pub jobs: Vec<JobSnapshot>,
}

/// `?q=augur&limit=20`
#[derive(Debug, Default, Deserialize)]
pub struct EntrySearchParams {
    pub q: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct EntriesResponse {
    pub total: usize,
    pub entries: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct LogFilterResponse {
    pub filter: String,
    pub available_modules: Vec<ModuleInfo>,
}

#[derive(Debug, Serialize)]
pub struct ModuleInfo {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLogFilterRequest {
    pub filter: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub components: Vec<ComponentHealth>,
}

#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Payload;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_selection_params() {
        let params = SelectionParams {
            repos: Some("3, 1,3".to_string()),
        };
        assert_eq!(params.selection(), RepoSelection::new([1i64, 3]));
        assert!(SelectionParams::default().selection().is_empty());
    }

    #[test]
    fn test_poll_response_tick_count() {
        let key = JobKey::fingerprint("commits", &RepoSelection::new([1i64]));

        let loading = PollResponse::from_outcome(
            key.clone(),
            PollOutcome::loading(Duration::from_millis(800)),
            1,
        );
        assert_eq!(loading.n_intervals, 0);
        assert!(loading.records.is_none());

        let done = PollResponse::from_outcome(
            key,
            PollOutcome::refreshed(Arc::new(Payload::new(vec![Record::new()]))),
            1,
        );
        assert_eq!(done.n_intervals, 1);
        assert_eq!(done.records.map(|r| r.len()), Some(1));

        let json = serde_json::to_value(&loading).unwrap();
        assert_eq!(json["poll"]["action"], "continue");
        assert_eq!(json["display"], "loading");
    }
}
