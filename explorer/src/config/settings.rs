//! Environment-driven settings.
//!
//! Every struct has sensible defaults and a `from_env_or_default()` loader.
//! `main` calls `dotenvy::dotenv()` first so a local `.env` file works too.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::{Error, Result};

/// Default result cache TTL (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default maximum duration of one query job (30 seconds).
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(30);

/// Default UI poll cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(800);

/// Default directory for the rolling log files.
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Read and parse an environment variable, falling back to `default` when it
/// is unset or invalid.
pub(crate) fn env_or<T>(name: &str, default: T) -> T
where
    T: FromStr,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!(var = name, value = %raw, "Invalid value, using default");
                default
            }
        },
        _ => default,
    }
}

/// Analytics database connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL URL of the analytics database.
    pub url: String,
    /// Maximum pooled connections.
    pub max_connections: u32,
    /// Seconds to wait for a connection at startup.
    pub connect_timeout_secs: u64,
}

/// Pool defaults. The URL is left empty; there is no sensible default
/// analytics database.
impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 8,
            connect_timeout_secs: 10,
        }
    }
}

impl DatabaseConfig {
    /// Supported env vars:
    /// - `DATABASE_URL` (required)
    /// - `DATABASE_MAX_CONNECTIONS`
    /// - `DATABASE_CONNECT_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Self {
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", defaults.max_connections).max(1),
            connect_timeout_secs: env_or(
                "DATABASE_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout_secs,
            ),
            ..defaults
        }
        .with_url(std::env::var("DATABASE_URL").ok())
    }

    /// Set the URL, rejecting a missing or blank one.
    pub fn with_url(mut self, url: Option<String>) -> Result<Self> {
        match url.map(|url| url.trim().to_string()) {
            Some(url) if !url.is_empty() => {
                self.url = url;
                Ok(self)
            }
            _ => Err(Error::config("DATABASE_URL must point at the analytics database")),
        }
    }
}

/// Where completed results are stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    Sqlite { url: String },
    Redis { url: String },
}

impl CacheBackend {
    /// Parse a backend name plus optional URL.
    pub fn parse(name: &str, url: Option<String>) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite {
                url: url.unwrap_or_else(|| "sqlite:explorer-cache.db?mode=rwc".to_string()),
            }),
            "redis" => Ok(Self::Redis {
                url: url.unwrap_or_else(|| "redis://localhost:6379".to_string()),
            }),
            other => Err(Error::config(format!(
                "unknown cache backend '{other}' (expected memory, sqlite or redis)"
            ))),
        }
    }
}

/// Result cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// Freshness window of a cached result.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            ttl: DEFAULT_CACHE_TTL,
        }
    }
}

impl CacheConfig {
    /// Supported env vars:
    /// - `CACHE_BACKEND` (`memory`, `sqlite`, `redis`)
    /// - `CACHE_URL`
    /// - `CACHE_TTL_SECS`
    pub fn from_env() -> Result<Self> {
        let name = std::env::var("CACHE_BACKEND").unwrap_or_default();
        let url = std::env::var("CACHE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());
        Ok(Self {
            backend: CacheBackend::parse(&name, url)?,
            ttl: Duration::from_secs(env_or("CACHE_TTL_SECS", DEFAULT_CACHE_TTL.as_secs())),
        })
    }
}

/// Job execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Concurrent query executions; sized to the database pool.
    pub max_workers: usize,
    /// Upper bound on a single execution.
    pub job_timeout: Duration,
    /// How long terminal jobs stay in the registry before the purge sweep drops them.
    pub failed_job_retention: Duration,
    /// Interval between purge sweeps.
    pub purge_interval: Duration,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            job_timeout: DEFAULT_JOB_TIMEOUT,
            failed_job_retention: Duration::from_secs(300),
            purge_interval: Duration::from_secs(60),
        }
    }
}

impl JobConfig {
    /// Supported env vars:
    /// - `JOB_MAX_WORKERS` (defaults to `database_pool_size`)
    /// - `JOB_TIMEOUT_SECS`
    /// - `FAILED_JOB_RETENTION_SECS`
    /// - `JOB_PURGE_INTERVAL_SECS`
    pub fn from_env_or_default(database_pool_size: u32) -> Self {
        let defaults = Self::default();
        Self {
            max_workers: env_or("JOB_MAX_WORKERS", database_pool_size as usize).max(1),
            job_timeout: Duration::from_secs(env_or(
                "JOB_TIMEOUT_SECS",
                defaults.job_timeout.as_secs(),
            )),
            failed_job_retention: Duration::from_secs(env_or(
                "FAILED_JOB_RETENTION_SECS",
                defaults.failed_job_retention.as_secs(),
            )),
            purge_interval: Duration::from_secs(
                env_or("JOB_PURGE_INTERVAL_SECS", defaults.purge_interval.as_secs()).max(1),
            ),
        }
    }
}

/// Poll cadence handed to UI timers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Delay before the next tick while a job is in flight.
    pub interval: Duration,
    /// Cap of the UI's tick counter; reaching it stops the timer.
    pub max_intervals: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_intervals: 1,
        }
    }
}

impl PollConfig {
    /// Supported env vars:
    /// - `POLL_INTERVAL_MS`
    /// - `POLL_MAX_INTERVALS`
    pub fn from_env_or_default() -> Self {
        let defaults = Self::default();
        Self {
            interval: Duration::from_millis(env_or(
                "POLL_INTERVAL_MS",
                defaults.interval.as_millis() as u64,
            )),
            max_intervals: env_or("POLL_MAX_INTERVALS", defaults.max_intervals).max(1),
        }
    }
}

/// Everything `main` needs to start the server.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub jobs: JobConfig,
    pub poll: PollConfig,
    pub log_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            cache: CacheConfig::default(),
            jobs: JobConfig::default(),
            poll: PollConfig::default(),
            log_dir: DEFAULT_LOG_DIR.to_string(),
        }
    }
}

impl AppConfig {
    /// Load everything from the environment.
    ///
    /// Invalid values are reported through `tracing`, so call this after
    /// logging is up (see [`log_dir_from_env`]).
    pub fn from_env() -> Result<Self> {
        let database = DatabaseConfig::from_env()?;
        let jobs = JobConfig::from_env_or_default(database.max_connections);
        Ok(Self {
            cache: CacheConfig::from_env()?,
            poll: PollConfig::from_env_or_default(),
            log_dir: log_dir_from_env(),
            database,
            jobs,
        })
    }
}

/// `LOG_DIR`, read without logging so it can run before the subscriber exists.
pub fn log_dir_from_env() -> String {
    log_dir_or_default(std::env::var("LOG_DIR").ok())
}

fn log_dir_or_default(raw: Option<String>) -> String {
    raw.map(|dir| dir.trim().to_string())
        .filter(|dir| !dir.is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_DIR.to_string())
}
