//! Service container: builds the cache, worker pool, registry and poll
//! adapter from configuration and owns their lifecycle.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::Result;
use crate::api::AppState;
use crate::cache::{CacheStore, create_cache_store};
use crate::config::AppConfig;
use crate::database::AnalyticsDatabase;
use crate::jobs::{
    ExecutionHarness, HarnessConfig, JobManager, JobPurgeService, PollAdapter, PurgeConfig,
    RegistryStats,
};
use crate::queries::{QueryRegistry, SearchEntries, load_entry_list};

/// Time allowed for running jobs to finish on shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ServiceContainer {
    config: AppConfig,
    database: Arc<dyn AnalyticsDatabase>,
    cache: Arc<dyn CacheStore>,
    registry: Arc<JobManager>,
    poll_adapter: Arc<PollAdapter>,
    queries: Arc<QueryRegistry>,
    entries: Arc<SearchEntries>,
    cancellation_token: CancellationToken,
}

impl ServiceContainer {
    /// Build every service. Fails when the cache backend or the entry list
    /// cannot be loaded.
    pub async fn new(
        config: AppConfig,
        database: Arc<dyn AnalyticsDatabase>,
        queries: QueryRegistry,
    ) -> Result<Self> {
        let cache = create_cache_store(&config.cache).await?;
        let harness = ExecutionHarness::new(
            cache.clone(),
            HarnessConfig::from_job_config(&config.jobs, config.cache.ttl),
        );
        let registry = Arc::new(JobManager::new(cache.clone(), harness));
        let poll_adapter = Arc::new(PollAdapter::new(
            registry.clone(),
            database.clone(),
            config.poll.clone(),
        ));
        let entries = Arc::new(load_entry_list(database.as_ref()).await?);

        Ok(Self {
            config,
            database,
            cache,
            registry,
            poll_adapter,
            queries: Arc::new(queries),
            entries,
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Start background tasks.
    pub fn initialize(&self) {
        let purge = JobPurgeService::new(
            PurgeConfig::from_job_config(&self.config.jobs),
            self.registry.clone(),
        );
        purge.start_background_task(self.cancellation_token.child_token());

        info!(
            queries = self.queries.len(),
            entries = self.entries.len(),
            cache = self.cache.backend(),
            "Services initialized"
        );
    }

    /// State shared with the HTTP handlers.
    pub fn app_state(&self) -> AppState {
        AppState::new(self.poll_adapter.clone(), self.queries.clone())
            .with_entries(self.entries.clone())
            .with_database(self.database.clone())
    }

    pub fn registry(&self) -> &Arc<JobManager> {
        &self.registry
    }

    pub fn poll_adapter(&self) -> &Arc<PollAdapter> {
        &self.poll_adapter
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    pub async fn shutdown(&self) {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    /// Stop background tasks, refuse queued jobs and wait for running ones.
    pub async fn shutdown_with_timeout(&self, timeout: Duration) {
        info!("Shutting down services (timeout: {:?})", timeout);
        self.cancellation_token.cancel();

        let harness = self.registry.harness();
        harness.close();

        let drained = tokio::time::timeout(timeout, async {
            while harness.active_count() > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                active = harness.active_count(),
                "Shutdown timeout reached with jobs still running"
            );
        }

        info!("Services shut down");
    }
}
