use dor_tree::TreeError;

/// Errors from collection path operations.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    /// The string is not of the form `<owner>:<relative-path>`.
    #[error("invalid collection path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// The requested open options cannot be satisfied together.
    #[error("invalid open options: {0}")]
    InvalidOptions(String),

    #[error("unknown attribute: {0}")]
    UnknownAttribute(String),

    #[error("attribute is read-only: {0}")]
    ReadOnlyAttribute(String),

    #[error("invalid value for attribute {name}: {reason}")]
    InvalidAttributeValue { name: String, reason: String },

    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<dor_slot::SlotError> for PathError {
    fn from(err: dor_slot::SlotError) -> Self {
        PathError::Tree(TreeError::Slot(err))
    }
}

/// Result alias for collection path operations.
pub type PathResult<T> = Result<T, PathError>;
