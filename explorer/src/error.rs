//! Application-wide error types.

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    DatabaseSqlx(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database connection unavailable: {0}")]
    ConnectionUnavailable(String),

    #[error("Invalid repository selection: {0}")]
    InvalidSelection(String),

    #[error("Query '{query}' failed: {message}")]
    QueryExecution { query: String, message: String },

    #[error("Job for '{key}' timed out after {timeout_secs}s")]
    Timeout { key: String, timeout_secs: u64 },

    #[error("Record {row} violates schema of '{query}': {message}")]
    SchemaViolation {
        query: String,
        row: usize,
        message: String,
    },

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Job for '{key}' is not ready (status: {status})")]
    JobNotReady { key: String, status: String },

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn invalid_selection(msg: impl Into<String>) -> Self {
        Self::InvalidSelection(msg.into())
    }

    pub fn query_execution(query: impl Into<String>, message: impl Into<String>) -> Self {
        Self::QueryExecution {
            query: query.into(),
            message: message.into(),
        }
    }

    pub fn cache_unavailable(msg: impl Into<String>) -> Self {
        Self::CacheUnavailable(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
