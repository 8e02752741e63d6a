//! Runtime configuration.

pub mod settings;

pub use settings::{
    AppConfig, CacheBackend, CacheConfig, DatabaseConfig, JobConfig, PollConfig,
    DEFAULT_CACHE_TTL, DEFAULT_JOB_TIMEOUT, DEFAULT_LOG_DIR, DEFAULT_POLL_INTERVAL,
    log_dir_from_env,
};
