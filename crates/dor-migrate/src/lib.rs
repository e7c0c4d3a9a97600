//! History migration for versioned object stores.
//!
//! A [`HistoryMigrator`] rebuilds a store from the history of its revision
//! log. Every source revision is replayed in ascending order into fresh
//! target roots, with object content rewritten by a [`ContentTransform`]:
//!
//! ```text
//! INIT -> REPLAY (per revision) -> FIX_TIMESTAMPS -> CUTOVER -> DONE
//! ```
//!
//! - Revisions whose migrated content is [semantically
//!   equal](SemanticEquality) to what the target already holds are skipped.
//! - Target commits keep the source author and message; their dates are
//!   rewritten to the source dates by a background [`DateFixWorker`].
//! - Slot files are stamped with their historical last-modified times.
//! - Cutover renames the source roots to backups and moves the new roots
//!   into their place.
//!
//! Any failure before cutover leaves the source roots untouched. With a
//! checkpoint configured, an interrupted run resumes after the last fully
//! applied revision, or at cutover if replay had already finished.

pub mod checkpoint;
pub mod config;
pub mod cutover;
pub mod equality;
pub mod error;
pub mod migrator;
pub mod report;
pub mod timestamps;
pub mod transform;
pub mod worker;

pub use checkpoint::Checkpoint;
pub use config::MigrationConfig;
pub use cutover::{cutover, RootSwap};
pub use equality::{AuditFieldMask, ByteEquality, SemanticEquality, XmlToken, DEFAULT_AUDIT_FIELDS};
pub use error::{MigrationError, MigrationResult};
pub use migrator::{HistoryMigrator, MigrationPhase, TargetStore};
pub use report::{ActionKind, MigrationAction, MigrationReport};
pub use timestamps::{PendingTimestamp, PendingTimestamps};
pub use transform::{
    ContentTransform, IdentityTransform, LegacyStrategy, TransformError, TransformOptions,
};
pub use worker::DateFixWorker;
