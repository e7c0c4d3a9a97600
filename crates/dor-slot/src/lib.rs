//! Slot addressing for the digital object repository.
//!
//! A *slot* is the deterministic physical location of a numeric identifier.
//! The identifier is zero-padded to a fixed width and split into nested
//! directory segments by a list of digit-group widths; the padded identifier
//! itself is the leaf name:
//!
//! ```text
//! layout 2-2-4, id 137  ->  00/00/00000137
//! ```
//!
//! # Modules
//!
//! - [`layout`] -- [`SlotLayout`], the ID ↔ path mapping
//! - [`physical`] -- the [`PhysicalSlot`] trait: raw bytes and children under a root
//! - [`disk`] -- [`DiskSlot`], a directory on the local filesystem
//! - [`archive`] -- [`ArchiveSlot`], a read-only view of a tar archive
//! - [`allocator`] -- free-ID discovery and exclusive slot reservation

pub mod allocator;
pub mod archive;
pub mod disk;
pub mod error;
pub mod layout;
pub mod physical;

pub use allocator::{claim_slot_file, next_free_id, scan_dir_ids, scan_ids, SlotAllocator};
pub use archive::ArchiveSlot;
pub use disk::{set_file_modified, DiskSlot};
pub use error::{SlotError, SlotResult};
pub use layout::SlotLayout;
pub use physical::{EntryKind, PhysicalSlot, SlotEntry, SlotMetadata, SlotWriter};
