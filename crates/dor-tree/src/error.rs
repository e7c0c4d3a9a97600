use std::path::PathBuf;

/// Errors from file tree operations.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// A user-chosen entry name is not acceptable.
    #[error("invalid entry name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("not a file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("directory not empty: {}", .0.display())]
    DirectoryNotEmpty(PathBuf),

    /// The sidecar metadata file could not be decoded.
    #[error("corrupt sidecar in {}: {reason}", .path.display())]
    CorruptSidecar { path: PathBuf, reason: String },

    #[error("slot error: {0}")]
    Slot(#[from] dor_slot::SlotError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for tree operations.
pub type TreeResult<T> = Result<T, TreeError>;
