use std::io::{Read, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SlotResult;

/// Kind of an entry inside a physical slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Directory,
    File,
}

/// A named child of a slot directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotEntry {
    pub name: String,
    pub kind: EntryKind,
}

/// Filesystem-level attributes of a slot entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotMetadata {
    pub kind: EntryKind,
    /// Content length in bytes (zero for directories).
    pub len: u64,
    pub modified: Option<DateTime<Utc>>,
    pub created: Option<DateTime<Utc>>,
}

impl SlotMetadata {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// A pending file write. Bytes become visible only on [`commit`](SlotWriter::commit).
pub trait SlotWriter: Write {
    /// Publish the written bytes at the target path, replacing any previous
    /// content. Dropping a writer without committing discards the bytes.
    fn commit(self: Box<Self>) -> SlotResult<()>;
}

/// Raw bytes and children beneath a root.
///
/// All paths are relative to the slot root. Implementations must reject
/// paths that escape the root. A `PhysicalSlot` knows nothing about sidecar
/// metadata or hashes; the logical file tree is composed on top of it.
pub trait PhysicalSlot: Send + Sync {
    /// Attributes of the entry at `path`, or `None` if absent.
    fn metadata(&self, path: &Path) -> SlotResult<Option<SlotMetadata>>;

    /// Open a file for streaming reads.
    fn open_read(&self, path: &Path) -> SlotResult<Box<dyn Read + '_>>;

    /// Begin an atomic replacement of the file at `path`.
    ///
    /// The parent directory must exist.
    fn open_write(&self, path: &Path) -> SlotResult<Box<dyn SlotWriter + '_>>;

    /// Children of the directory at `path`, sorted by name.
    fn list(&self, path: &Path) -> SlotResult<Vec<SlotEntry>>;

    /// Create a single directory. The parent must exist; `path` must not.
    fn create_dir(&self, path: &Path) -> SlotResult<()>;

    /// Remove a file.
    fn remove_file(&self, path: &Path) -> SlotResult<()>;

    /// Remove an empty directory.
    fn remove_dir(&self, path: &Path) -> SlotResult<()>;

    /// Remove a directory and everything beneath it.
    fn remove_dir_all(&self, path: &Path) -> SlotResult<()>;

    /// Rename an entry within the slot.
    fn rename(&self, from: &Path, to: &Path) -> SlotResult<()>;

    /// Overwrite the last-modified time of a file.
    fn set_modified(&self, path: &Path, time: DateTime<Utc>) -> SlotResult<()>;

    /// Whether mutations are rejected.
    fn is_read_only(&self) -> bool {
        false
    }

    /// Whether an entry exists at `path`.
    fn exists(&self, path: &Path) -> SlotResult<bool> {
        Ok(self.metadata(path)?.is_some())
    }

    /// Read a whole file into memory.
    fn read(&self, path: &Path) -> SlotResult<Vec<u8>> {
        let mut reader = self.open_read(path)?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Atomically replace a whole file.
    fn write(&self, path: &Path, data: &[u8]) -> SlotResult<()> {
        let mut writer = self.open_write(path)?;
        writer.write_all(data)?;
        writer.commit()
    }
}
