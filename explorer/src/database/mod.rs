//! Analytics database access.
//!
//! Query functions only see the [`AnalyticsDatabase`] trait; the server wires
//! in a PostgreSQL pool and tests substitute an in-process fake.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::domain::Record;
use crate::{Error, Result};

/// Row source for query functions.
#[async_trait]
pub trait AnalyticsDatabase: Send + Sync {
    /// Run `sql` with the repo id list bound as `$1` and return one record per row.
    async fn fetch_records(&self, sql: &str, repo_ids: &[i64]) -> Result<Vec<Record>>;

    /// Run `sql` without parameters.
    async fn fetch_all_records(&self, sql: &str) -> Result<Vec<Record>>;

    /// Cheap liveness check.
    async fn ping(&self) -> Result<()>;
}

/// PostgreSQL-backed analytics database.
#[derive(Clone)]
pub struct PgAnalyticsDatabase {
    pool: PgPool,
}

impl PgAnalyticsDatabase {
    /// Open the connection pool, failing fast when the database is unreachable.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| Error::ConnectionUnavailable(e.to_string()))?;

        let db = Self { pool };
        db.ping()
            .await
            .map_err(|e| Error::ConnectionUnavailable(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Analytics database pool initialized"
        );
        Ok(db)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Wrap `sql` so every row comes back as a single JSON object column.
fn as_json_rows(sql: &str) -> String {
    format!("SELECT row_to_json(q)::jsonb FROM ({sql}) AS q")
}

fn into_records(values: Vec<Value>) -> Result<Vec<Record>> {
    values
        .into_iter()
        .map(|value| match value {
            Value::Object(record) => Ok(record),
            other => Err(Error::Other(format!(
                "expected a JSON object row, got {other}"
            ))),
        })
        .collect()
}

#[async_trait]
impl AnalyticsDatabase for PgAnalyticsDatabase {
    async fn fetch_records(&self, sql: &str, repo_ids: &[i64]) -> Result<Vec<Record>> {
        debug!(repos = repo_ids.len(), "Running analytics query");
        let rows: Vec<Value> = sqlx::query_scalar(&as_json_rows(sql))
            .bind(repo_ids)
            .fetch_all(&self.pool)
            .await?;
        into_records(rows)
    }

    async fn fetch_all_records(&self, sql: &str) -> Result<Vec<Record>> {
        let rows: Vec<Value> = sqlx::query_scalar(&as_json_rows(sql))
            .fetch_all(&self.pool)
            .await?;
        into_records(rows)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
