//! File collection trees for the digital object repository.
//!
//! Each owner identifier has its own hierarchical tree of directories and
//! files, independent of the object store. A [`FileTree`] is a logical
//! layer composed over a [`PhysicalSlot`](dor_slot::PhysicalSlot): the slot
//! moves bytes, the tree keeps a sidecar record per directory with every
//! child's kind, content hash, size and optional label.
//!
//! # Sidecar invariant
//!
//! Every mutation (write, create, rename, delete, set label) rewrites the
//! affected sidecar before returning. [`FileTree::repair_metadata`]
//! recomputes all sidecars from the actual bytes after out-of-band edits.
//!
//! Nested tar archives are opened with [`FileTree::open_archive`], which
//! returns a read-only tree over an [`ArchiveSlot`](dor_slot::ArchiveSlot).

pub mod collections;
pub mod error;
pub mod names;
pub mod node;
pub mod sidecar;
pub mod tree;

pub use collections::FileCollections;
pub use error::{TreeError, TreeResult};
pub use names::{is_reserved, validate_name, SIDECAR_NAME};
pub use node::{DirectoryNode, FileNode, Node};
pub use sidecar::{DirectoryMetadata, EntryRecord};
pub use tree::{FileTree, FileWriter, RepairReport};
