//! Deterministic job fingerprints.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::selection::RepoSelection;

/// Identity of one computation: query identity plus normalized selection.
///
/// Rendered as `<identity>:<selection>`, e.g. `commits:[1,2]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobKey(String);

impl JobKey {
    pub fn fingerprint(query_identity: &str, selection: &RepoSelection) -> Self {
        Self(format!("{query_identity}:{selection}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The query identity portion of the key.
    pub fn query_identity(&self) -> &str {
        self.0.split_once(':').map(|(id, _)| id).unwrap_or(&self.0)
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
