//! Commit history per repository.

use async_trait::async_trait;

use super::{QueryFunction, fetch_for_selection};
use crate::Result;
use crate::database::AnalyticsDatabase;
use crate::domain::{ColumnType, Record, RecordSchema, RepoSelection};

const COMMITS_SQL: &str = "\
    SELECT id, commits, date \
    FROM augur_data.explorer_commits \
    WHERE id = ANY($1)";

/// One row per commit: repo id, commit hash and commit date.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommitsQuery;

#[async_trait]
impl QueryFunction for CommitsQuery {
    fn identity(&self) -> &str {
        "commits"
    }

    fn schema(&self) -> RecordSchema {
        RecordSchema::new()
            .column("id", ColumnType::Integer)
            .column("commits", ColumnType::Text)
            .column("date", ColumnType::Timestamp)
    }

    async fn run(
        &self,
        db: &dyn AnalyticsDatabase,
        selection: &RepoSelection,
    ) -> Result<Vec<Record>> {
        fetch_for_selection(self.identity(), db, COMMITS_SQL, selection).await
    }
}
