use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use dor_slot::{EntryKind, PhysicalSlot, SlotError};
use dor_types::ContentHash;
use serde::{Deserialize, Serialize};

use crate::error::{TreeError, TreeResult};
use crate::names::SIDECAR_NAME;

/// Sidecar attributes of one child entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub kind: EntryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<ContentHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl EntryRecord {
    pub fn directory() -> Self {
        Self {
            kind: EntryKind::Directory,
            hash: None,
            size: None,
            label: None,
        }
    }

    pub fn file(hash: ContentHash, size: u64) -> Self {
        Self {
            kind: EntryKind::File,
            hash: Some(hash),
            size: Some(size),
            label: None,
        }
    }
}

/// Contents of one directory's sidecar file, keyed by child name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryMetadata {
    #[serde(default)]
    pub entries: BTreeMap<String, EntryRecord>,
}

impl DirectoryMetadata {
    /// Location of the sidecar for directory `dir`.
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(SIDECAR_NAME)
    }

    /// Read the sidecar of `dir`. A missing sidecar reads as empty.
    pub fn load<S: PhysicalSlot + ?Sized>(slot: &S, dir: &Path) -> TreeResult<Self> {
        let path = Self::path_in(dir);
        let bytes = match slot.read(&path) {
            Ok(bytes) => bytes,
            Err(SlotError::NotFound(_)) => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes).map_err(|e| TreeError::CorruptSidecar {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Atomically replace the sidecar of `dir`.
    pub fn save<S: PhysicalSlot + ?Sized>(&self, slot: &S, dir: &Path) -> TreeResult<()> {
        let bytes = serde_json::to_vec_pretty(self).map_err(|e| TreeError::CorruptSidecar {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;
        slot.write(&Self::path_in(dir), &bytes)?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&EntryRecord> {
        self.entries.get(name)
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.entries.get(name).and_then(|r| r.label.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dor_slot::DiskSlot;

    #[test]
    fn missing_sidecar_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let slot = DiskSlot::new(dir.path());
        let meta = DirectoryMetadata::load(&slot, Path::new("")).unwrap();
        assert!(meta.entries.is_empty());
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let slot = DiskSlot::new(dir.path());
        let mut meta = DirectoryMetadata::default();
        let mut record = EntryRecord::file(ContentHash::of(b"abc"), 3);
        record.label = Some("scan".into());
        meta.entries.insert("a.txt".into(), record);
        meta.entries.insert("sub".into(), EntryRecord::directory());
        meta.save(&slot, Path::new("")).unwrap();

        let loaded = DirectoryMetadata::load(&slot, Path::new("")).unwrap();
        assert_eq!(loaded, meta);
        assert_eq!(loaded.label("a.txt"), Some("scan"));

        let text = std::fs::read_to_string(dir.path().join(SIDECAR_NAME)).unwrap();
        assert!(text.contains("\"directory\""));
        assert!(!text.contains("\"label\": null"));
    }

    #[test]
    fn garbage_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SIDECAR_NAME), b"{not json").unwrap();
        let slot = DiskSlot::new(dir.path());
        assert!(matches!(
            DirectoryMetadata::load(&slot, Path::new("")),
            Err(TreeError::CorruptSidecar { .. })
        ));
    }
}
