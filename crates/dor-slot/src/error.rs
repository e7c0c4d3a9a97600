use std::path::PathBuf;

use dor_types::SlotId;

/// Errors from slot addressing and physical slot operations.
#[derive(Debug, thiserror::Error)]
pub enum SlotError {
    /// The layout configuration is unusable.
    #[error("invalid slot layout: {0}")]
    InvalidLayout(String),

    /// The identifier does not fit in the configured digit width.
    #[error("slot id {id} exceeds the configured width of {width} digits")]
    IdOutOfRange { id: SlotId, width: usize },

    /// The path escapes the slot root or is otherwise malformed.
    #[error("invalid slot path: {}", .0.display())]
    InvalidPath(PathBuf),

    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("directory not empty: {}", .0.display())]
    DirectoryNotEmpty(PathBuf),

    /// The slot backend does not accept mutations.
    #[error("slot is read-only")]
    ReadOnly,

    /// The archive backing a slot could not be decoded.
    #[error("archive error: {0}")]
    Archive(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for slot operations.
pub type SlotResult<T> = Result<T, SlotError>;
