//! Search bar entries: repo group names and repo git URLs.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::info;

use crate::database::AnalyticsDatabase;
use crate::{Error, Result};

const ENTRY_LIST_SQL: &str = "SELECT * FROM augur_data.explorer_entry_list";

/// Sorted, deduplicated search entries loaded once at startup.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchEntries {
    entries: Vec<String>,
}

impl SearchEntries {
    pub fn new<I: IntoIterator<Item = String>>(entries: I) -> Self {
        let entries: BTreeSet<String> = entries
            .into_iter()
            .filter(|entry| !entry.trim().is_empty())
            .collect();
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Default selection shown before the user searches.
    pub fn first(&self) -> Option<&str> {
        self.entries.first().map(String::as_str)
    }

    /// Case-insensitive substring match, capped at `limit` results.
    pub fn search(&self, term: &str, limit: usize) -> Vec<&str> {
        let term = term.trim().to_lowercase();
        self.entries
            .iter()
            .filter(|entry| term.is_empty() || entry.to_lowercase().contains(&term))
            .take(limit)
            .map(String::as_str)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Load the entry list; any failure here is fatal to startup.
pub async fn load_entry_list(db: &dyn AnalyticsDatabase) -> Result<SearchEntries> {
    let rows = db.fetch_all_records(ENTRY_LIST_SQL).await.map_err(|e| match e {
        Error::DatabaseSqlx(e) => Error::query_execution("entry_list", e.to_string()),
        other => other,
    })?;

    let mut values = Vec::with_capacity(rows.len() * 2);
    for row in &rows {
        for column in ["rg_name", "repo_git"] {
            if let Some(Value::String(value)) = row.get(column) {
                values.push(value.clone());
            }
        }
    }

    let entries = SearchEntries::new(values);
    info!(entries = entries.len(), "Loaded search entry list");
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::testing::{CannedDatabase, record};
    use serde_json::json;

    #[tokio::test]
    async fn test_load_entry_list_dedups_and_sorts() {
        let db = CannedDatabase::new(vec![
            record(json!({"rg_name": "chaoss", "repo_git": "https://github.com/chaoss/augur"})),
            record(json!({"rg_name": "chaoss", "repo_git": "https://github.com/chaoss/grimoirelab"})),
            record(json!({"rg_name": "apache", "repo_git": null})),
        ]);

        let entries = load_entry_list(&db).await.unwrap();
        assert_eq!(
            entries.entries(),
            [
                "apache",
                "chaoss",
                "https://github.com/chaoss/augur",
                "https://github.com/chaoss/grimoirelab",
            ]
        );
        assert_eq!(entries.first(), Some("apache"));
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let entries = SearchEntries::new(["Augur".to_string(), "grimoire".to_string()]);
        assert_eq!(entries.search("aug", 10), vec!["Augur"]);
        assert_eq!(entries.search("", 1), vec!["Augur"]);
    }
}
