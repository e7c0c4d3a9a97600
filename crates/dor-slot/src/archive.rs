use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use tar::{Archive, EntryType};
use tracing::debug;

use crate::error::{SlotError, SlotResult};
use crate::physical::{EntryKind, PhysicalSlot, SlotEntry, SlotMetadata, SlotWriter};

#[derive(Clone, Debug)]
struct ArchiveEntry {
    kind: EntryKind,
    data: Vec<u8>,
    modified: Option<DateTime<Utc>>,
}

/// Read-only view of a tar archive as a physical slot.
///
/// Lets a nested archive stored as a plain file be traversed with the same
/// file-tree code as an on-disk directory. The archive is decoded once into
/// memory; every mutation fails with [`SlotError::ReadOnly`].
#[derive(Clone, Debug, Default)]
pub struct ArchiveSlot {
    entries: BTreeMap<PathBuf, ArchiveEntry>,
}

/// Normalize an archive member path: drop `.` and leading `/`, reject `..`.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir | Component::RootDir => {}
            _ => return None,
        }
    }
    Some(out)
}

impl ArchiveSlot {
    /// Decode a tar archive from a reader.
    pub fn from_reader<R: Read>(reader: R) -> SlotResult<Self> {
        let mut slot = Self::default();
        let mut archive = Archive::new(reader);
        let entries = archive
            .entries()
            .map_err(|e| SlotError::Archive(e.to_string()))?;

        for entry in entries {
            let mut entry = entry.map_err(|e| SlotError::Archive(e.to_string()))?;
            let raw_path = entry
                .path()
                .map_err(|e| SlotError::Archive(e.to_string()))?
                .into_owned();
            let Some(path) = normalize(&raw_path) else {
                debug!(path = %raw_path.display(), "skipping archive member outside root");
                continue;
            };
            if path.as_os_str().is_empty() {
                continue;
            }
            let modified = entry
                .header()
                .mtime()
                .ok()
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs as i64, 0));

            let kind = match entry.header().entry_type() {
                EntryType::Directory => EntryKind::Directory,
                EntryType::Regular | EntryType::Continuous => EntryKind::File,
                other => {
                    debug!(path = %path.display(), kind = ?other, "skipping unsupported archive member");
                    continue;
                }
            };
            let mut data = Vec::new();
            if kind == EntryKind::File {
                entry.read_to_end(&mut data)?;
            }
            slot.insert_parents(&path);
            slot.entries.insert(
                path,
                ArchiveEntry {
                    kind,
                    data,
                    modified,
                },
            );
        }
        Ok(slot)
    }

    /// Decode a tar archive held in memory.
    pub fn from_bytes(bytes: &[u8]) -> SlotResult<Self> {
        Self::from_reader(Cursor::new(bytes))
    }

    /// Register implicit directories for members listed without them.
    fn insert_parents(&mut self, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir.as_os_str().is_empty() {
                break;
            }
            self.entries
                .entry(dir.to_path_buf())
                .or_insert_with(|| ArchiveEntry {
                    kind: EntryKind::Directory,
                    data: Vec::new(),
                    modified: None,
                });
            current = dir.parent();
        }
    }

    fn lookup(&self, path: &Path) -> SlotResult<Option<&ArchiveEntry>> {
        let key = normalize(path).ok_or_else(|| SlotError::InvalidPath(path.to_path_buf()))?;
        Ok(self.entries.get(&key))
    }
}

impl PhysicalSlot for ArchiveSlot {
    fn metadata(&self, path: &Path) -> SlotResult<Option<SlotMetadata>> {
        let key = normalize(path).ok_or_else(|| SlotError::InvalidPath(path.to_path_buf()))?;
        if key.as_os_str().is_empty() {
            return Ok(Some(SlotMetadata {
                kind: EntryKind::Directory,
                len: 0,
                modified: None,
                created: None,
            }));
        }
        Ok(self.entries.get(&key).map(|entry| SlotMetadata {
            kind: entry.kind,
            len: entry.data.len() as u64,
            modified: entry.modified,
            created: None,
        }))
    }

    fn open_read(&self, path: &Path) -> SlotResult<Box<dyn Read + '_>> {
        match self.lookup(path)? {
            Some(entry) if entry.kind == EntryKind::File => {
                Ok(Box::new(Cursor::new(entry.data.as_slice())))
            }
            _ => Err(SlotError::NotFound(path.to_path_buf())),
        }
    }

    fn open_write(&self, _path: &Path) -> SlotResult<Box<dyn SlotWriter + '_>> {
        Err(SlotError::ReadOnly)
    }

    fn list(&self, path: &Path) -> SlotResult<Vec<SlotEntry>> {
        let key = normalize(path).ok_or_else(|| SlotError::InvalidPath(path.to_path_buf()))?;
        if !key.as_os_str().is_empty() {
            match self.entries.get(&key) {
                Some(entry) if entry.kind == EntryKind::Directory => {}
                _ => return Err(SlotError::NotFound(path.to_path_buf())),
            }
        }
        let entries = self
            .entries
            .iter()
            .filter(|(p, _)| p.parent() == Some(key.as_path()))
            .filter_map(|(p, entry)| {
                let name = p.file_name()?.to_str()?.to_string();
                Some(SlotEntry {
                    name,
                    kind: entry.kind,
                })
            })
            .collect();
        // BTreeMap iteration already yields children in name order.
        Ok(entries)
    }

    fn create_dir(&self, _path: &Path) -> SlotResult<()> {
        Err(SlotError::ReadOnly)
    }

    fn remove_file(&self, _path: &Path) -> SlotResult<()> {
        Err(SlotError::ReadOnly)
    }

    fn remove_dir(&self, _path: &Path) -> SlotResult<()> {
        Err(SlotError::ReadOnly)
    }

    fn remove_dir_all(&self, _path: &Path) -> SlotResult<()> {
        Err(SlotError::ReadOnly)
    }

    fn rename(&self, _from: &Path, _to: &Path) -> SlotResult<()> {
        Err(SlotError::ReadOnly)
    }

    fn set_modified(&self, _path: &Path, _time: DateTime<Utc>) -> SlotResult<()> {
        Err(SlotError::ReadOnly)
    }

    fn is_read_only(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tar::{Builder, Header};

    fn build_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = Builder::new(Vec::new());
        for (path, data) in files {
            let mut header = Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(1_000_000_000);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn files_and_implicit_directories_are_listed() {
        let bytes = build_archive(&[("top.txt", b"top"), ("sub/deeper/leaf.bin", b"leaf")]);
        let slot = ArchiveSlot::from_bytes(&bytes).unwrap();

        let root: Vec<_> = slot
            .list(Path::new(""))
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(root, vec!["sub", "top.txt"]);

        let meta = slot.metadata(Path::new("sub/deeper")).unwrap().unwrap();
        assert!(meta.is_dir());
        assert_eq!(slot.read(Path::new("sub/deeper/leaf.bin")).unwrap(), b"leaf");
        let leaf = slot.metadata(Path::new("sub/deeper/leaf.bin")).unwrap().unwrap();
        assert_eq!(leaf.len, 4);
        assert_eq!(leaf.modified.unwrap().timestamp(), 1_000_000_000);
    }

    #[test]
    fn mutations_are_rejected() {
        let slot = ArchiveSlot::from_bytes(&build_archive(&[("a", b"a")])).unwrap();
        assert!(slot.is_read_only());
        assert!(matches!(slot.write(Path::new("b"), b"b"), Err(SlotError::ReadOnly)));
        assert!(matches!(slot.remove_file(Path::new("a")), Err(SlotError::ReadOnly)));
        assert!(matches!(slot.create_dir(Path::new("d")), Err(SlotError::ReadOnly)));
    }

    #[test]
    fn listing_a_file_is_not_found() {
        let slot = ArchiveSlot::from_bytes(&build_archive(&[("a", b"a")])).unwrap();
        assert!(matches!(slot.list(Path::new("a")), Err(SlotError::NotFound(_))));
        assert!(matches!(slot.read(Path::new("zz")), Err(SlotError::NotFound(_))));
    }
}
