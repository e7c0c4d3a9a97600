//! Append-only revision log for the digital object repository.
//!
//! A revision log records every mutation of a versioned store as an
//! immutable, numbered revision. Revisions are never rewritten once
//! committed; the only mutable property is the recorded date, which history
//! migration overwrites to preserve the original commit time.
//!
//! # Backends
//!
//! All backends implement the [`RevisionLog`] trait:
//!
//! - [`InMemoryRevisionLog`] -- for tests and embedding
//! - [`JournalRevisionLog`] -- a CRC-framed append-only file on disk
//!
//! New on-disk logs are created through a [`RevisionLogFactory`].

pub mod error;
pub mod journal;
pub mod memory;
mod state;
pub mod traits;
pub mod types;

pub use error::{LogError, LogResult};
pub use journal::{JournalFactory, JournalRevisionLog};
pub use memory::InMemoryRevisionLog;
pub use traits::{RevisionLog, RevisionLogFactory};
pub use types::{ChangeKind, ChangedPath, PathChange, RevisionEntry, RevisionInfo};
