use dor_types::SlotId;

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The object does not exist.
    #[error("object not found: {0}")]
    NotFound(SlotId),

    /// The identifier is already occupied.
    #[error("object already exists: {0}")]
    Collision(SlotId),

    #[error("slot error: {0}")]
    Slot(#[from] dor_slot::SlotError),

    #[error("revision log error: {0}")]
    Log(#[from] dor_log::LogError),

    #[error("configuration error: {0}")]
    Config(String),

    /// No store is registered under the given name.
    #[error("unknown store: {0}")]
    UnknownStore(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
