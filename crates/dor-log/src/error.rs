use std::path::PathBuf;

use dor_types::RevisionNumber;

/// Errors from revision-log operations.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("no such revision {revision} (latest is {latest})")]
    NoSuchRevision {
        revision: RevisionNumber,
        latest: RevisionNumber,
    },

    /// The path has no content at the requested revision.
    #[error("path {path} does not exist at {revision}")]
    PathNotFound {
        path: String,
        revision: RevisionNumber,
    },

    #[error("commit contains no changes")]
    EmptyCommit,

    /// A repository already exists at the creation location.
    #[error("repository already exists at {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("not a revision log repository: {}", .0.display())]
    NotARepository(PathBuf),

    /// The on-disk journal is inconsistent.
    #[error("corrupt journal at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    /// The log session has been closed.
    #[error("revision log is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for revision-log operations.
pub type LogResult<T> = Result<T, LogError>;
