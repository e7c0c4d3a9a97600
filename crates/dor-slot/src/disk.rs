use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{SlotError, SlotResult};
use crate::physical::{EntryKind, PhysicalSlot, SlotEntry, SlotMetadata, SlotWriter};

/// A directory on the local filesystem used as a physical slot.
///
/// File replacement goes through a temporary file in the target directory
/// and a rename, so readers never observe a partially written file.
#[derive(Clone, Debug)]
pub struct DiskSlot {
    root: PathBuf,
}

impl DiskSlot {
    /// Use `root` as the slot root. The directory is not created.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Use `root` as the slot root, creating it if missing.
    pub fn create(root: impl Into<PathBuf>) -> SlotResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a relative slot path.
    pub fn resolve(&self, path: &Path) -> SlotResult<PathBuf> {
        for component in path.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return Err(SlotError::InvalidPath(path.to_path_buf())),
            }
        }
        Ok(self.root.join(path))
    }
}

/// Map an I/O error to the slot error for `path`.
fn map_io(err: io::Error, path: &Path) -> SlotError {
    match err.kind() {
        io::ErrorKind::NotFound => SlotError::NotFound(path.to_path_buf()),
        io::ErrorKind::AlreadyExists => SlotError::AlreadyExists(path.to_path_buf()),
        _ => SlotError::Io(err),
    }
}

pub(crate) fn to_utc(time: io::Result<SystemTime>) -> Option<DateTime<Utc>> {
    time.ok().map(DateTime::<Utc>::from)
}

/// Set the last-modified time of a file on the local filesystem.
pub fn set_file_modified(path: &Path, time: DateTime<Utc>) -> SlotResult<()> {
    let file = File::options()
        .write(true)
        .open(path)
        .map_err(|e| map_io(e, path))?;
    file.set_modified(SystemTime::from(time))?;
    Ok(())
}

struct DiskWriter {
    temp: NamedTempFile,
    target: PathBuf,
}

impl Write for DiskWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.temp.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.temp.flush()
    }
}

impl SlotWriter for DiskWriter {
    fn commit(self: Box<Self>) -> SlotResult<()> {
        let DiskWriter { mut temp, target } = *self;
        temp.flush()?;
        temp.as_file().sync_all()?;
        temp.persist(&target).map_err(|e| SlotError::Io(e.error))?;
        Ok(())
    }
}

impl PhysicalSlot for DiskSlot {
    fn metadata(&self, path: &Path) -> SlotResult<Option<SlotMetadata>> {
        let full = self.resolve(path)?;
        let meta = match fs::metadata(&full) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let kind = if meta.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        Ok(Some(SlotMetadata {
            kind,
            len: if meta.is_dir() { 0 } else { meta.len() },
            modified: to_utc(meta.modified()),
            created: to_utc(meta.created()),
        }))
    }

    fn open_read(&self, path: &Path) -> SlotResult<Box<dyn Read + '_>> {
        let full = self.resolve(path)?;
        let file = File::open(&full).map_err(|e| map_io(e, path))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn open_write(&self, path: &Path) -> SlotResult<Box<dyn SlotWriter + '_>> {
        let full = self.resolve(path)?;
        let parent = full
            .parent()
            .ok_or_else(|| SlotError::InvalidPath(path.to_path_buf()))?;
        if !parent.is_dir() {
            return Err(SlotError::NotFound(parent.to_path_buf()));
        }
        if full.is_dir() {
            return Err(SlotError::AlreadyExists(path.to_path_buf()));
        }
        let temp = NamedTempFile::new_in(parent)?;
        Ok(Box::new(DiskWriter { temp, target: full }))
    }

    fn list(&self, path: &Path) -> SlotResult<Vec<SlotEntry>> {
        let full = self.resolve(path)?;
        let mut entries = Vec::new();
        for entry in fs::read_dir(&full).map_err(|e| map_io(e, path))? {
            let entry = entry?;
            let Ok(name) = entry.file_name().into_string() else {
                debug!(dir = %full.display(), "skipping non-UTF-8 entry name");
                continue;
            };
            // Leftovers from interrupted writes.
            if name.starts_with(".tmp") {
                continue;
            }
            let kind = if entry.file_type()?.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };
            entries.push(SlotEntry { name, kind });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn create_dir(&self, path: &Path) -> SlotResult<()> {
        let full = self.resolve(path)?;
        fs::create_dir(&full).map_err(|e| map_io(e, path))
    }

    fn remove_file(&self, path: &Path) -> SlotResult<()> {
        let full = self.resolve(path)?;
        fs::remove_file(&full).map_err(|e| map_io(e, path))
    }

    fn remove_dir(&self, path: &Path) -> SlotResult<()> {
        let full = self.resolve(path)?;
        match fs::read_dir(&full).map_err(|e| map_io(e, path))?.next() {
            Some(_) => Err(SlotError::DirectoryNotEmpty(path.to_path_buf())),
            None => fs::remove_dir(&full).map_err(|e| map_io(e, path)),
        }
    }

    fn remove_dir_all(&self, path: &Path) -> SlotResult<()> {
        let full = self.resolve(path)?;
        fs::remove_dir_all(&full).map_err(|e| map_io(e, path))
    }

    fn rename(&self, from: &Path, to: &Path) -> SlotResult<()> {
        let src = self.resolve(from)?;
        let dst = self.resolve(to)?;
        if dst.exists() {
            return Err(SlotError::AlreadyExists(to.to_path_buf()));
        }
        fs::rename(&src, &dst).map_err(|e| map_io(e, from))
    }

    fn set_modified(&self, path: &Path, time: DateTime<Utc>) -> SlotResult<()> {
        let full = self.resolve(path)?;
        set_file_modified(&full, time)
    }
}
