//! Repository selection value object.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::{Error, Result};

/// A repository identifier chosen in the UI.
///
/// Numeric identifiers sort before named ones so that a mixed selection
/// always normalizes to the same order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RepoId {
    Id(i64),
    Name(String),
}

impl RepoId {
    /// Parse a raw token, treating anything that fits an `i64` as a numeric id.
    ///
    /// Returns `None` for blank tokens.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        match trimmed.parse::<i64>() {
            Ok(id) => Some(Self::Id(id)),
            Err(_) => Some(Self::Name(trimmed.to_string())),
        }
    }
}

impl From<i64> for RepoId {
    fn from(id: i64) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for RepoId {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepoId::Id(id) => write!(f, "{id}"),
            // JSON string form keeps names containing ',' or ']' unambiguous in keys.
            RepoId::Name(name) => write!(f, "{}", serde_json::Value::String(name.clone())),
        }
    }
}

/// A normalized (deduplicated, sorted) set of repositories.
///
/// Deserialization goes through [`RepoSelection::new`], so a decoded
/// selection fingerprints the same as one built in code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawSelection")]
pub struct RepoSelection {
    ids: Vec<RepoId>,
}

/// Accepted wire forms: a bare list or `{"ids": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawSelection {
    List(Vec<RepoId>),
    Object { ids: Vec<RepoId> },
}

impl From<RawSelection> for RepoSelection {
    fn from(raw: RawSelection) -> Self {
        match raw {
            RawSelection::List(ids) | RawSelection::Object { ids } => Self::new(ids),
        }
    }
}

impl From<Vec<RepoId>> for RepoSelection {
    fn from(ids: Vec<RepoId>) -> Self {
        Self::new(ids)
    }
}

impl RepoSelection {
    /// Normalize an arbitrary collection of identifiers.
    pub fn new<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<RepoId>,
    {
        let ids: BTreeSet<RepoId> = ids
            .into_iter()
            .map(Into::into)
            .filter(|id| !matches!(id, RepoId::Name(name) if name.trim().is_empty()))
            .collect();
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    /// Parse a comma separated list such as `"2,1,augur"`.
    pub fn parse(raw: &str) -> Self {
        Self::new(raw.split(',').filter_map(RepoId::parse))
    }

    pub fn ids(&self) -> &[RepoId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Reject empty selections before they reach the job registry.
    pub fn ensure_not_empty(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::invalid_selection("no repositories selected"));
        }
        Ok(())
    }

    /// Numeric repository ids for binding into SQL.
    ///
    /// Named entries that are not numeric cannot be bound and are rejected.
    pub fn repo_ids(&self) -> Result<Vec<i64>> {
        self.ensure_not_empty()?;
        self.ids
            .iter()
            .map(|id| match id {
                RepoId::Id(id) => Ok(*id),
                RepoId::Name(name) => Err(Error::invalid_selection(format!(
                    "'{name}' is not a repository id"
                ))),
            })
            .collect()
    }
}

impl fmt::Display for RepoSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, id) in self.ids.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{id}")?;
        }
        f.write_str("]")
    }
}
