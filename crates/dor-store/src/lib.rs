//! Slot-addressed object storage for the digital object repository.
//!
//! Objects are opaque content blobs keyed by a numeric [`SlotId`]. Each
//! object lives in its own slot file whose location is derived from the
//! identifier by a [`SlotLayout`](dor_slot::SlotLayout).
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`FsObjectStore`] -- one file per object under a slot tree on disk
//! - [`InMemoryObjectStore`] -- `BTreeMap`-based store for tests and embedding
//! - [`VersioningObjectStore`] -- wraps another store and mirrors every
//!   mutation as a commit in a [`RevisionLog`](dor_log::RevisionLog)
//!
//! # Design Rules
//!
//! 1. An object either exists with complete content or is absent.
//! 2. `create` never overwrites: an occupied ID is a [`StoreError::Collision`].
//! 3. `update` and `delete` on an absent ID are [`StoreError::NotFound`];
//!    `retrieve` returns `Ok(None)`.
//! 4. One writer per ID at a time; identifier allocation is race-free.
//!
//! Stores are built once from a [`RepositoryConfig`] into a
//! [`StoreRegistry`] that is passed to consumers explicitly.

pub mod config;
pub mod error;
pub mod fs;
pub mod memory;
pub mod registry;
pub mod traits;
pub mod versioning;

pub use config::{RepositoryConfig, StoreConfig};
pub use dor_types::SlotId;
pub use error::{StoreError, StoreResult};
pub use fs::FsObjectStore;
pub use memory::InMemoryObjectStore;
pub use registry::{open_store, FsVersioningStore, StoreRegistry};
pub use traits::ObjectStore;
pub use versioning::{HeadSync, Version, VersioningObjectStore, DEFAULT_AUTHOR};
