//! Contributor activity, with action codes turned into display labels.

use async_trait::async_trait;
use serde_json::Value;

use super::{QueryFunction, fetch_for_selection};
use crate::Result;
use crate::database::AnalyticsDatabase;
use crate::domain::{ColumnType, Record, RecordSchema, RepoSelection};

const CONTRIBUTORS_SQL: &str = "\
    SELECT * \
    FROM augur_data.explorer_contributor_actions \
    WHERE repo_id = ANY($1)";

/// Output column holding the display label.
pub const ACTION_COLUMN: &str = "Action";

fn action_label(code: &str) -> Option<&'static str> {
    match code {
        "open_pull_request" => Some("Open PR"),
        "pull_request_comment" => Some("PR Comment"),
        "issue_opened" => Some("Issue Opened"),
        "issue_closed" => Some("Issue Closed"),
        "commit" => Some("Commit"),
        _ => None,
    }
}

/// Move `action` to `Action`, relabelling known codes. Unknown codes pass
/// through unchanged.
fn relabel(mut record: Record) -> Record {
    if let Some(action) = record.remove("action") {
        let action = match action {
            Value::String(code) => match action_label(&code) {
                Some(label) => Value::String(label.to_string()),
                None => Value::String(code),
            },
            other => other,
        };
        record.insert(ACTION_COLUMN.to_string(), action);
    }
    record
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ContributorsQuery;

#[async_trait]
impl QueryFunction for ContributorsQuery {
    fn identity(&self) -> &str {
        "contributors"
    }

    fn schema(&self) -> RecordSchema {
        RecordSchema::new()
            .column("repo_id", ColumnType::Integer)
            .column(ACTION_COLUMN, ColumnType::Text)
            .nullable("created_at", ColumnType::Timestamp)
    }

    async fn run(
        &self,
        db: &dyn AnalyticsDatabase,
        selection: &RepoSelection,
    ) -> Result<Vec<Record>> {
        let rows = fetch_for_selection(self.identity(), db, CONTRIBUTORS_SQL, selection).await?;
        Ok(rows.into_iter().map(relabel).collect())
    }
}
