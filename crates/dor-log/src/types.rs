use chrono::{DateTime, Utc};
use dor_types::RevisionNumber;
use serde::{Deserialize, Serialize};

/// How a path changed in a revision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Add,
    Modify,
    Delete,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add => write!(f, "A"),
            Self::Modify => write!(f, "M"),
            Self::Delete => write!(f, "D"),
        }
    }
}

/// A path touched by a revision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedPath {
    pub path: String,
    pub kind: ChangeKind,
}

/// One committed revision: who, when, and which paths changed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionEntry {
    pub revision: RevisionNumber,
    pub author: String,
    pub message: String,
    pub date: DateTime<Utc>,
    /// Changed paths sorted by path.
    pub changes: Vec<ChangedPath>,
}

/// Per-path revision descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionInfo {
    pub revision: RevisionNumber,
    pub author: String,
    pub date: DateTime<Utc>,
    /// `true` if this revision deleted the path.
    pub deleted: bool,
}

/// A single path mutation submitted with a commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathChange {
    /// Create or replace the content at `path`.
    Put { path: String, content: Vec<u8> },
    /// Remove `path`.
    Delete { path: String },
}

impl PathChange {
    pub fn put(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self::Put {
            path: path.into(),
            content: content.into(),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::Delete { path: path.into() }
    }

    pub fn path(&self) -> &str {
        match self {
            Self::Put { path, .. } | Self::Delete { path } => path,
        }
    }
}
