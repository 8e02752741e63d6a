//! API route modules.

pub mod entries;
pub mod health;
pub mod jobs;
pub mod logging;
pub mod queries;

use axum::Router;

use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/queries", queries::router())
        .nest("/api/jobs", jobs::router())
        .nest("/api/entries", entries::router())
        .nest("/api/logging", logging::router())
        .nest("/health", health::router())
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::api::server::AppState;
    use crate::cache::MemoryCacheStore;
    use crate::config::PollConfig;
    use crate::database::AnalyticsDatabase;
    use crate::domain::{Record, RecordSchema, RepoSelection};
    use crate::jobs::{ExecutionHarness, HarnessConfig, JobManager, PollAdapter};
    use crate::queries::testing::CannedDatabase;
    use crate::queries::{QueryFunction, QueryRegistry, SearchEntries};

    /// Returns one row per selected repo.
    pub struct EchoQuery;

    #[async_trait]
    impl QueryFunction for EchoQuery {
        fn identity(&self) -> &str {
            "echo"
        }

        fn schema(&self) -> RecordSchema {
            RecordSchema::new()
        }

        async fn run(
            &self,
            _db: &dyn AnalyticsDatabase,
            selection: &RepoSelection,
        ) -> crate::Result<Vec<Record>> {
            Ok(selection
                .repo_ids()?
                .into_iter()
                .map(|id| {
                    let mut record = Record::new();
                    record.insert("id".to_string(), id.into());
                    record
                })
                .collect())
        }
    }

    pub fn state() -> AppState {
        let cache = Arc::new(MemoryCacheStore::new());
        let harness = ExecutionHarness::new(cache.clone(), HarnessConfig::default());
        let registry = Arc::new(JobManager::new(cache, harness));
        let database: Arc<dyn AnalyticsDatabase> = Arc::new(CannedDatabase::default());
        let poll = PollAdapter::new(
            registry,
            database.clone(),
            PollConfig {
                interval: Duration::from_millis(800),
                max_intervals: 1,
            },
        );
        let queries = QueryRegistry::new().with(Arc::new(EchoQuery));

        AppState::new(Arc::new(poll), Arc::new(queries))
            .with_database(database)
            .with_entries(Arc::new(SearchEntries::new([
                "chaoss".to_string(),
                "https://github.com/chaoss/augur".to_string(),
            ])))
    }
}
