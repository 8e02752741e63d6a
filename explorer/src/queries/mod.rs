//! Query functions: named, schema-checked reads over a repo selection.

mod commits;
mod contributors;
mod entries;
mod prs;

pub use commits::CommitsQuery;
pub use contributors::ContributorsQuery;
pub use entries::{SearchEntries, load_entry_list};
pub use prs::PullRequestsQuery;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::database::AnalyticsDatabase;
use crate::domain::{Record, RecordSchema, RepoSelection};
use crate::{Error, Result};

/// A pure function of (database, repo selection) producing records.
///
/// Its identity is part of the cache key, so it must be stable across
/// processes and restarts.
#[async_trait]
pub trait QueryFunction: Send + Sync {
    fn identity(&self) -> &str;

    /// Shape every produced record must have.
    fn schema(&self) -> RecordSchema;

    /// Check `selection` before any job is created for it.
    ///
    /// The default accepts only non-empty selections of numeric repo ids,
    /// which is what SQL-backed queries can bind.
    fn validate(&self, selection: &RepoSelection) -> Result<()> {
        selection.repo_ids().map(|_| ())
    }

    async fn run(&self, db: &dyn AnalyticsDatabase, selection: &RepoSelection)
    -> Result<Vec<Record>>;
}

/// Run `sql` for the numeric repo ids in `selection`, attributing failures
/// to `identity`.
pub(crate) async fn fetch_for_selection(
    identity: &str,
    db: &dyn AnalyticsDatabase,
    sql: &str,
    selection: &RepoSelection,
) -> Result<Vec<Record>> {
    let repo_ids = selection.repo_ids()?;
    db.fetch_records(sql, &repo_ids)
        .await
        .map_err(|e| match e {
            Error::DatabaseSqlx(e) => Error::query_execution(identity, e.to_string()),
            other => other,
        })
}

/// Lookup table from identity to query function.
#[derive(Clone, Default)]
pub struct QueryRegistry {
    queries: BTreeMap<String, Arc<dyn QueryFunction>>,
}

impl QueryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the commits, prs and contributors queries.
    pub fn with_builtins() -> Self {
        Self::new()
            .with(Arc::new(CommitsQuery))
            .with(Arc::new(PullRequestsQuery))
            .with(Arc::new(ContributorsQuery))
    }

    pub fn with(mut self, query: Arc<dyn QueryFunction>) -> Self {
        self.register(query);
        self
    }

    /// Add `query`, replacing any previous one with the same identity.
    pub fn register(&mut self, query: Arc<dyn QueryFunction>) {
        self.queries.insert(query.identity().to_string(), query);
    }

    pub fn get(&self, identity: &str) -> Result<Arc<dyn QueryFunction>> {
        self.queries
            .get(identity)
            .cloned()
            .ok_or_else(|| Error::not_found("Query", identity))
    }

    /// Registered identities in sorted order.
    pub fn identities(&self) -> Vec<String> {
        self.queries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[rstest::rstest]
    #[case("1,2", true)]
    #[case("", false)]
    #[case("1,chaoss/augur", false)]
    fn test_default_validation_needs_numeric_ids(#[case] raw: &str, #[case] accepted: bool) {
        let selection = RepoSelection::parse(raw);
        for identity in ["commits", "prs", "contributors"] {
            let query = QueryRegistry::with_builtins().get(identity).unwrap();
            assert_eq!(query.validate(&selection).is_ok(), accepted, "{identity} {raw:?}");
        }
    }

    #[test]
    fn test_builtin_registry() {
        let registry = QueryRegistry::with_builtins();
        assert_eq!(
            registry.identities(),
            vec!["commits".to_string(), "contributors".to_string(), "prs".to_string()]
        );
        assert_eq!(registry.get("prs").unwrap().identity(), "prs");
        assert!(matches!(
            registry.get("issues"),
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_named_repos_are_rejected() {
        let db = testing::CannedDatabase::default();
        let selection = RepoSelection::parse("1,augur");
        let result = fetch_for_selection("commits", &db, "SELECT 1", &selection).await;
        assert!(matches!(result, Err(Error::InvalidSelection(_))));
        assert!(db.calls.lock().is_empty());
    }
}
