//! Foundation types for the digital object repository.
//!
//! Every other `dor-*` crate depends on this one.
//!
//! # Key Types
//!
//! - [`SlotId`] -- Numeric object identifier, mapped to a filesystem slot
//! - [`RevisionNumber`] -- Repository-wide, monotonically increasing revision counter
//! - [`ContentHash`] -- BLAKE3 digest of file or object content
//! - [`HashingWriter`] -- Write adapter that hashes bytes as they pass through
//! - [`CommitInfo`] -- Author and message attached to a revision-log commit

pub mod error;
pub mod hash;
pub mod id;
pub mod revision;

pub use error::TypeError;
pub use hash::{copy_hashing, ContentHash, HashingWriter};
pub use id::SlotId;
pub use revision::{CommitInfo, RevisionNumber};
