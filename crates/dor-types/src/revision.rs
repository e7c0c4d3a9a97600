use std::fmt;

use serde::{Deserialize, Serialize};

/// Repository-wide revision number of a revision log.
///
/// Revision `0` is the empty repository; the first commit is revision `1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionNumber(u64);

impl RevisionNumber {
    /// The empty-repository revision.
    pub const ZERO: Self = Self(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Iterate `1..=self` in ascending order.
    pub fn ascending_from_first(&self) -> impl Iterator<Item = RevisionNumber> {
        (1..=self.0).map(RevisionNumber)
    }
}

impl fmt::Display for RevisionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Author and message recorded with a revision-log commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub author: String,
    pub message: String,
}

impl CommitInfo {
    pub fn new(author: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            message: message.into(),
        }
    }
}
