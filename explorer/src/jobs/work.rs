//! Units of work handed to the execution harness.

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

use crate::Result;
use crate::database::AnalyticsDatabase;
use crate::domain::{Record, RecordSchema, RepoSelection};
use crate::queries::QueryFunction;

/// Future producing the raw rows of one query.
pub type WorkFuture = BoxFuture<'static, Result<Vec<Record>>>;

/// A query bound to its arguments, ready to run once.
pub struct JobWork {
    label: String,
    schema: Option<RecordSchema>,
    run: Box<dyn FnOnce() -> WorkFuture + Send>,
}

impl JobWork {
    /// Wrap an arbitrary async computation.
    pub fn new<F, Fut>(label: impl Into<String>, run: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Vec<Record>>> + Send + 'static,
    {
        Self {
            label: label.into(),
            schema: None,
            run: Box::new(move || Box::pin(run())),
        }
    }

    /// Bind a query function to a database and selection, validating its
    /// rows against the query's schema.
    pub fn for_query(
        query: Arc<dyn QueryFunction>,
        database: Arc<dyn AnalyticsDatabase>,
        selection: RepoSelection,
    ) -> Self {
        let label = query.identity().to_string();
        let schema = query.schema();
        Self::new(label, move || async move {
            query.run(database.as_ref(), &selection).await
        })
        .with_schema(schema)
    }

    /// Validate produced rows against `schema`.
    pub fn with_schema(mut self, schema: RecordSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn into_parts(self) -> (String, Option<RecordSchema>, WorkFuture) {
        let future = (self.run)();
        (self.label, self.schema, future)
    }
}

impl std::fmt::Debug for JobWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobWork")
            .field("label", &self.label)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}
