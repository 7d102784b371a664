//! The set of object ids that currently compose a scene.
//!
//! Stored in the object cache as a comma-joined decimal list. The empty
//! string encodes the empty set. Empty tokens (a trailing or doubled
//! separator) are tolerated on read and never produced on write.

use std::collections::BTreeSet;
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

const SEPARATOR: char = ',';

/// Failure to parse a stored identifier list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid object id {token:?}: {source}")]
pub struct IdentifierSetError {
    /// The offending token.
    pub token: String,
    /// Underlying integer parse error.
    #[source]
    pub source: ParseIntError,
}

/// Live object ids of one scene, kept in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectIdentifierSet(BTreeSet<i64>);

impl ObjectIdentifierSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an id. Returns `false` if it was already present.
    pub fn insert(&mut self, id: i64) -> bool {
        self.0.insert(id)
    }

    /// Removes an id. Returns `false` if it was absent.
    pub fn remove(&mut self, id: i64) -> bool {
        self.0.remove(&id)
    }

    #[cfg(test)]
    fn contains(&self, id: i64) -> bool {
        self.0.contains(&id)
    }

    /// Number of ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        self.0.iter().copied()
    }

    /// Encodes the set for storage.
    #[must_use]
    pub fn serialize(&self) -> String {
        self.to_string()
    }

    /// Decodes a stored list.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierSetError`] on the first non-integer token.
    pub fn deserialize(raw: &str) -> Result<Self, IdentifierSetError> {
        raw.parse()
    }
}

impl fmt::Display for ObjectIdentifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids = self.0.iter();
        if let Some(first) = ids.next() {
            write!(f, "{first}")?;
            for id in ids {
                write!(f, "{SEPARATOR}{id}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for ObjectIdentifierSet {
    type Err = IdentifierSetError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        raw.split(SEPARATOR)
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| {
                token.parse::<i64>().map_err(|source| IdentifierSetError {
                    token: token.to_string(),
                    source,
                })
            })
            .collect::<Result<BTreeSet<_>, _>>()
            .map(Self)
    }
}

impl FromIterator<i64> for ObjectIdentifierSet {
    fn from_iter<I: IntoIterator<Item = i64>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
