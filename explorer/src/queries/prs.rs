//! Pull request lifecycle timestamps.

use async_trait::async_trait;

use super::{QueryFunction, fetch_for_selection};
use crate::Result;
use crate::database::AnalyticsDatabase;
use crate::domain::{ColumnType, Record, RecordSchema, RepoSelection};

const PRS_SQL: &str = "\
    SELECT id, created, closed, merged \
    FROM augur_data.explorer_pr_assignments \
    WHERE id = ANY($1)";

/// One row per pull request. `closed` and `merged` are null while open.
#[derive(Debug, Clone, Copy, Default)]
pub struct PullRequestsQuery;

#[async_trait]
impl QueryFunction for PullRequestsQuery {
    fn identity(&self) -> &str {
        "prs"
    }

    fn schema(&self) -> RecordSchema {
        RecordSchema::new()
            .column("id", ColumnType::Integer)
            .column("created", ColumnType::Timestamp)
            .nullable("closed", ColumnType::Timestamp)
            .nullable("merged", ColumnType::Timestamp)
    }

    async fn run(
        &self,
        db: &dyn AnalyticsDatabase,
        selection: &RepoSelection,
    ) -> Result<Vec<Record>> {
        fetch_for_selection(self.identity(), db, PRS_SQL, selection).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::testing::{CannedDatabase, record};
    use serde_json::json;

    #[tokio::test]
    async fn test_open_pull_requests_validate() {
        let db = CannedDatabase::new(vec![
            record(json!({"id": 1, "created": "2022-01-01T00:00:00", "closed": null, "merged": null})),
            record(json!({
                "id": 1,
                "created": "2022-01-01T00:00:00",
                "closed": "2022-01-03T00:00:00",
                "merged": "2022-01-03T00:00:00"
            })),
        ]);
        let rows = PullRequestsQuery
            .run(&db, &RepoSelection::new([1i64]))
            .await
            .unwrap();
        assert!(PullRequestsQuery.schema().validate("prs", &rows).is_ok());
    }
}
