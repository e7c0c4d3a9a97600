use std::path::PathBuf;

use dor_types::{RevisionNumber, SlotId};

use crate::transform::TransformError;

/// Errors that abort a migration run.
///
/// Every variant raised before cutover leaves the source store and log
/// untouched; partially built target roots stay on disk for inspection.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// The content transform rejected a document.
    #[error("transform of object {id} at {revision} failed: {source}")]
    Transformation {
        id: SlotId,
        revision: RevisionNumber,
        #[source]
        source: TransformError,
    },

    /// The source or target revision log failed.
    #[error("revision log error: {0}")]
    Backend(#[from] dor_log::LogError),

    #[error("store error: {0}")]
    Store(#[from] dor_store::StoreError),

    #[error("slot error: {0}")]
    Slot(#[from] dor_slot::SlotError),

    /// A fresh run found leftovers from an earlier one.
    #[error("target already exists: {0}")]
    TargetExists(PathBuf),

    #[error("invalid migration config: {0}")]
    Config(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("cutover failed: {0}")]
    Cutover(String),

    /// The background date-fix worker stopped unexpectedly.
    #[error("date-fix worker failed: {0}")]
    Worker(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for migration operations.
pub type MigrationResult<T> = Result<T, MigrationError>;
