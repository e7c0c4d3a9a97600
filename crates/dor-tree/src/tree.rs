use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use dor_slot::{ArchiveSlot, EntryKind, PhysicalSlot, SlotMetadata, SlotWriter};
use dor_types::{copy_hashing, ContentHash, HashingWriter};
use tracing::{debug, warn};

use crate::error::{TreeError, TreeResult};
use crate::names::{is_reserved, validate_name};
use crate::node::{DirectoryNode, FileNode, Node};
use crate::sidecar::{DirectoryMetadata, EntryRecord};

/// Counts from a [`FileTree::repair_metadata`] pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub directories: usize,
    /// Records added for children the sidecar did not know about.
    pub added: usize,
    /// Records whose kind, hash or size were wrong.
    pub corrected: usize,
    /// Records for children that no longer exist.
    pub removed: usize,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        self.added == 0 && self.corrected == 0 && self.removed == 0
    }
}

/// Logical directory/file tree composed over a [`PhysicalSlot`].
///
/// Every directory carries a sidecar file recording each child's kind,
/// content hash, size and optional label. Each mutation rewrites the
/// affected sidecar before returning, so the sidecar always describes
/// the actual children.
pub struct FileTree<S> {
    slot: S,
    /// Serializes sidecar read-modify-write cycles. Shared by every tree
    /// handle over the same slot.
    sidecar_lock: Arc<Mutex<()>>,
}

/// Split a non-root path into its parent directory and leaf name.
fn split(path: &Path) -> TreeResult<(PathBuf, String)> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| TreeError::InvalidName {
            name: path.display().to_string(),
            reason: "path has no entry name".into(),
        })?;
    let parent = path.parent().unwrap_or(Path::new("")).to_path_buf();
    Ok((parent, name.to_string()))
}

fn hash_reader(reader: &mut dyn Read) -> io::Result<(ContentHash, u64)> {
    let (_, hash, size) = copy_hashing(reader, io::sink())?;
    Ok((hash, size))
}

impl<S: PhysicalSlot> FileTree<S> {
    pub fn new(slot: S) -> Self {
        Self::with_lock(slot, Arc::default())
    }

    /// A tree whose sidecar updates contend on `lock`. Handles over the
    /// same slot must share one lock.
    pub fn with_lock(slot: S, lock: Arc<Mutex<()>>) -> Self {
        Self {
            slot,
            sidecar_lock: lock,
        }
    }

    pub fn slot(&self) -> &S {
        &self.slot
    }

    pub fn is_read_only(&self) -> bool {
        self.slot.is_read_only()
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    fn require_dir(&self, dir: &Path) -> TreeResult<()> {
        match self.slot.metadata(dir)? {
            Some(meta) if meta.is_dir() => Ok(()),
            Some(_) => Err(TreeError::NotADirectory(dir.to_path_buf())),
            None => Err(TreeError::NotFound(dir.to_path_buf())),
        }
    }

    fn require(&self, path: &Path) -> TreeResult<SlotMetadata> {
        self.slot
            .metadata(path)?
            .ok_or_else(|| TreeError::NotFound(path.to_path_buf()))
    }

    fn make_node(path: PathBuf, meta: &SlotMetadata, record: Option<&EntryRecord>) -> Node {
        let label = record.and_then(|r| r.label.clone());
        match meta.kind {
            EntryKind::Directory => Node::Directory(DirectoryNode {
                path,
                label,
                modified: meta.modified,
                created: meta.created,
            }),
            EntryKind::File => Node::File(FileNode {
                path,
                size: meta.len,
                hash: record.and_then(|r| r.hash),
                label,
                modified: meta.modified,
                created: meta.created,
            }),
        }
    }

    /// The node at `path`, or `None` if absent. The empty path is the root.
    pub fn node(&self, path: &Path) -> TreeResult<Option<Node>> {
        let Some(meta) = self.slot.metadata(path)? else {
            return Ok(None);
        };
        if path.file_name().is_none() {
            return Ok(Some(Self::make_node(path.to_path_buf(), &meta, None)));
        }
        let (parent, name) = split(path)?;
        if is_reserved(&name) {
            return Ok(None);
        }
        let sidecar = DirectoryMetadata::load(&self.slot, &parent)?;
        Ok(Some(Self::make_node(
            path.to_path_buf(),
            &meta,
            sidecar.get(&name),
        )))
    }

    pub fn exists(&self, path: &Path) -> TreeResult<bool> {
        Ok(self.node(path)?.is_some())
    }

    /// Visible child names of `dir`, sorted.
    fn child_names(&self, dir: &Path) -> TreeResult<Vec<(String, EntryKind)>> {
        Ok(self
            .slot
            .list(dir)?
            .into_iter()
            .filter(|e| !is_reserved(&e.name))
            .map(|e| (e.name, e.kind))
            .collect())
    }

    /// Children of `dir`, sorted by name.
    pub fn list(&self, dir: &Path) -> TreeResult<Vec<Node>> {
        self.require_dir(dir)?;
        let sidecar = DirectoryMetadata::load(&self.slot, dir)?;
        let mut nodes = Vec::new();
        for (name, _) in self.child_names(dir)? {
            let path = dir.join(&name);
            if let Some(meta) = self.slot.metadata(&path)? {
                nodes.push(Self::make_node(path, &meta, sidecar.get(&name)));
            }
        }
        Ok(nodes)
    }

    /// Every node beneath `dir`, parents before children.
    pub fn walk(&self, dir: &Path) -> TreeResult<Vec<Node>> {
        let mut out = Vec::new();
        for node in self.list(dir)? {
            let descend = node.is_dir().then(|| node.path().to_path_buf());
            out.push(node);
            if let Some(sub) = descend {
                out.extend(self.walk(&sub)?);
            }
        }
        Ok(out)
    }

    /// Open a file for streaming reads.
    pub fn open_read(&self, path: &Path) -> TreeResult<Box<dyn Read + '_>> {
        if !self.require(path)?.is_file() {
            return Err(TreeError::NotAFile(path.to_path_buf()));
        }
        Ok(self.slot.open_read(path)?)
    }

    /// Read a whole file into memory.
    pub fn read(&self, path: &Path) -> TreeResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.open_read(path)?.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Hash of a file's content: the sidecar value when it is present and
    /// matches the file size, otherwise computed from the bytes.
    pub fn content_hash(&self, path: &Path) -> TreeResult<ContentHash> {
        let meta = self.require(path)?;
        if !meta.is_file() {
            return Err(TreeError::NotAFile(path.to_path_buf()));
        }
        let (parent, name) = split(path)?;
        let sidecar = DirectoryMetadata::load(&self.slot, &parent)?;
        if let Some(EntryRecord {
            hash: Some(hash),
            size: Some(size),
            ..
        }) = sidecar.get(&name)
        {
            if *size == meta.len {
                return Ok(*hash);
            }
        }
        let (hash, _) = hash_reader(&mut self.slot.open_read(path)?)?;
        Ok(hash)
    }

    /// Filesystem attributes of the entry at `path`.
    pub fn metadata(&self, path: &Path) -> TreeResult<SlotMetadata> {
        self.require(path)
    }

    /// Open a tar archive stored at `path` as a read-only tree.
    pub fn open_archive(&self, path: &Path) -> TreeResult<FileTree<ArchiveSlot>> {
        let reader = self.open_read(path)?;
        Ok(FileTree::new(ArchiveSlot::from_reader(reader)?))
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Load, modify and save the sidecar of `dir`. Caller holds the lock.
    fn update_sidecar(
        &self,
        dir: &Path,
        f: impl FnOnce(&mut DirectoryMetadata),
    ) -> TreeResult<()> {
        let mut sidecar = DirectoryMetadata::load(&self.slot, dir)?;
        f(&mut sidecar);
        sidecar.save(&self.slot, dir)
    }

    /// Sidecar record describing the current state of `path`.
    fn fresh_record(&self, path: &Path, meta: &SlotMetadata) -> TreeResult<EntryRecord> {
        match meta.kind {
            EntryKind::Directory => Ok(EntryRecord::directory()),
            EntryKind::File => {
                let (hash, size) = hash_reader(&mut self.slot.open_read(path)?)?;
                Ok(EntryRecord::file(hash, size))
            }
        }
    }

    pub fn create_directory(&self, path: &Path) -> TreeResult<Node> {
        let (parent, name) = split(path)?;
        validate_name(&name)?;
        self.require_dir(&parent)?;
        let _guard = self.sidecar_lock.lock().expect("lock poisoned");
        if self.slot.exists(path)? {
            return Err(TreeError::AlreadyExists(path.to_path_buf()));
        }
        self.slot.create_dir(path)?;
        if let Err(e) = self.update_sidecar(&parent, |meta| {
            meta.entries.insert(name, EntryRecord::directory());
        }) {
            if let Err(cleanup) = self.slot.remove_dir(path) {
                warn!(path = %path.display(), error = %cleanup, "failed to remove directory after sidecar error");
            }
            return Err(e);
        }
        debug!(path = %path.display(), "created directory");
        let meta = self.require(path)?;
        Ok(Self::make_node(path.to_path_buf(), &meta, None))
    }

    /// Begin writing a file. Content and hash are produced in one pass and
    /// published by [`FileWriter::commit`].
    pub fn open_write(&self, path: &Path) -> TreeResult<FileWriter<'_, S>> {
        let (parent, name) = split(path)?;
        validate_name(&name)?;
        self.require_dir(&parent)?;
        if let Some(meta) = self.slot.metadata(path)? {
            if meta.is_dir() {
                return Err(TreeError::NotAFile(path.to_path_buf()));
            }
        }
        let writer = self.slot.open_write(path)?;
        Ok(FileWriter {
            tree: self,
            path: path.to_path_buf(),
            inner: HashingWriter::new(writer),
        })
    }

    /// Create or replace a file with everything `reader` yields.
    pub fn write_file(&self, path: &Path, reader: &mut dyn Read) -> TreeResult<FileNode> {
        let mut writer = self.open_write(path)?;
        io::copy(reader, &mut writer)?;
        writer.commit()
    }

    pub fn write_bytes(&self, path: &Path, data: &[u8]) -> TreeResult<FileNode> {
        self.write_file(path, &mut io::Cursor::new(data))
    }

    fn record_file(&self, path: &Path, hash: ContentHash, size: u64) -> TreeResult<()> {
        let (parent, name) = split(path)?;
        self.update_sidecar(&parent, |meta| {
            let label = meta.entries.get(&name).and_then(|r| r.label.clone());
            let mut record = EntryRecord::file(hash, size);
            record.label = label;
            meta.entries.insert(name, record);
        })
    }

    /// Remove a file or an empty directory.
    pub fn delete(&self, path: &Path) -> TreeResult<()> {
        let (parent, name) = split(path)?;
        let _guard = self.sidecar_lock.lock().expect("lock poisoned");
        let meta = self.require(path)?;
        if meta.is_dir() {
            if !self.child_names(path)?.is_empty() {
                return Err(TreeError::DirectoryNotEmpty(path.to_path_buf()));
            }
            let sidecar = DirectoryMetadata::path_in(path);
            if self.slot.exists(&sidecar)? {
                self.slot.remove_file(&sidecar)?;
            }
            self.slot.remove_dir(path)?;
        } else {
            self.slot.remove_file(path)?;
        }
        self.update_sidecar(&parent, |meta| {
            meta.entries.remove(&name);
        })?;
        debug!(path = %path.display(), "deleted entry");
        Ok(())
    }

    /// Remove an entry and, for directories, everything beneath it.
    pub fn delete_all(&self, path: &Path) -> TreeResult<()> {
        let (parent, name) = split(path)?;
        let _guard = self.sidecar_lock.lock().expect("lock poisoned");
        if self.require(path)?.is_dir() {
            self.slot.remove_dir_all(path)?;
        } else {
            self.slot.remove_file(path)?;
        }
        self.update_sidecar(&parent, |meta| {
            meta.entries.remove(&name);
        })
    }

    /// Rename or move an entry. The target must not exist.
    pub fn rename(&self, from: &Path, to: &Path) -> TreeResult<()> {
        let (from_parent, from_name) = split(from)?;
        let (to_parent, to_name) = split(to)?;
        validate_name(&to_name)?;
        self.require_dir(&to_parent)?;
        let _guard = self.sidecar_lock.lock().expect("lock poisoned");
        let meta = self.require(from)?;
        if self.slot.exists(to)? {
            return Err(TreeError::AlreadyExists(to.to_path_buf()));
        }
        if meta.is_dir() && to.starts_with(from) {
            return Err(TreeError::InvalidName {
                name: to_name,
                reason: "cannot move a directory beneath itself".into(),
            });
        }

        let mut source = DirectoryMetadata::load(&self.slot, &from_parent)?;
        let record = match source.entries.remove(&from_name) {
            Some(record) => record,
            None => self.fresh_record(from, &meta)?,
        };
        self.slot.rename(from, to)?;
        if from_parent == to_parent {
            source.entries.insert(to_name, record);
            source.save(&self.slot, &from_parent)?;
        } else {
            source.save(&self.slot, &from_parent)?;
            self.update_sidecar(&to_parent, |meta| {
                meta.entries.insert(to_name, record);
            })?;
        }
        debug!(from = %from.display(), to = %to.display(), "renamed entry");
        Ok(())
    }

    /// Set or clear the label of an entry.
    pub fn set_label(&self, path: &Path, label: Option<&str>) -> TreeResult<()> {
        let (parent, name) = split(path)?;
        let _guard = self.sidecar_lock.lock().expect("lock poisoned");
        let meta = self.require(path)?;
        let mut sidecar = DirectoryMetadata::load(&self.slot, &parent)?;
        let record = match sidecar.entries.remove(&name) {
            Some(record) => record,
            None => self.fresh_record(path, &meta)?,
        };
        sidecar.entries.insert(
            name,
            EntryRecord {
                label: label.map(str::to_string),
                ..record
            },
        );
        sidecar.save(&self.slot, &parent)
    }

    /// Overwrite the last-modified time of a file.
    pub fn set_modified(&self, path: &Path, time: DateTime<Utc>) -> TreeResult<()> {
        if !self.require(path)?.is_file() {
            return Err(TreeError::NotAFile(path.to_path_buf()));
        }
        Ok(self.slot.set_modified(path, time)?)
    }

    // -----------------------------------------------------------------------
    // Repair
    // -----------------------------------------------------------------------

    /// Recompute every sidecar from the actual children.
    ///
    /// File hashes and sizes are recomputed from the bytes on disk; labels
    /// survive; records for vanished children are dropped. An unreadable
    /// sidecar is rebuilt from scratch.
    pub fn repair_metadata(&self) -> TreeResult<RepairReport> {
        let _guard = self.sidecar_lock.lock().expect("lock poisoned");
        let mut report = RepairReport::default();
        self.repair_dir(Path::new(""), &mut report)?;
        debug!(
            directories = report.directories,
            added = report.added,
            corrected = report.corrected,
            removed = report.removed,
            "repaired tree metadata"
        );
        Ok(report)
    }

    fn repair_dir(&self, dir: &Path, report: &mut RepairReport) -> TreeResult<()> {
        report.directories += 1;
        let (old, mut dirty) = match DirectoryMetadata::load(&self.slot, dir) {
            Ok(old) => (old, false),
            Err(TreeError::CorruptSidecar { reason, .. }) => {
                warn!(dir = %dir.display(), reason = %reason, "discarding unreadable sidecar");
                (DirectoryMetadata::default(), true)
            }
            Err(e) => return Err(e),
        };

        let mut fresh = DirectoryMetadata::default();
        for (name, kind) in self.child_names(dir)? {
            let path = dir.join(&name);
            let mut record = match kind {
                EntryKind::Directory => {
                    self.repair_dir(&path, report)?;
                    EntryRecord::directory()
                }
                EntryKind::File => {
                    let (hash, size) = hash_reader(&mut self.slot.open_read(&path)?)?;
                    EntryRecord::file(hash, size)
                }
            };
            match old.get(&name) {
                Some(previous) => {
                    record.label = previous.label.clone();
                    if *previous != record {
                        warn!(path = %path.display(), "correcting stale sidecar entry");
                        report.corrected += 1;
                        dirty = true;
                    }
                }
                None => {
                    warn!(path = %path.display(), "adding missing sidecar entry");
                    report.added += 1;
                    dirty = true;
                }
            }
            fresh.entries.insert(name, record);
        }

        for name in old.entries.keys() {
            if !fresh.entries.contains_key(name) {
                warn!(path = %dir.join(name).display(), "dropping sidecar entry for missing child");
                report.removed += 1;
                dirty = true;
            }
        }

        if dirty {
            fresh.save(&self.slot, dir)?;
        }
        Ok(())
    }
}

impl<S: std::fmt::Debug> std::fmt::Debug for FileTree<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileTree").field("slot", &self.slot).finish()
    }
}

/// A pending file write that hashes bytes as they pass through.
pub struct FileWriter<'a, S: PhysicalSlot> {
    tree: &'a FileTree<S>,
    path: PathBuf,
    inner: HashingWriter<Box<dyn SlotWriter + 'a>>,
}

impl<'a, S: PhysicalSlot> FileWriter<'a, S> {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Publish the file and record its hash and size in the sidecar.
    pub fn commit(self) -> TreeResult<FileNode> {
        let FileWriter { tree, path, inner } = self;
        let (writer, hash, size) = inner.finish();
        let _guard = tree.sidecar_lock.lock().expect("lock poisoned");
        let replaced = tree.slot.exists(&path)?;
        writer.commit()?;
        if let Err(e) = tree.record_file(&path, hash, size) {
            if replaced {
                warn!(path = %path.display(), error = %e, "file replaced but sidecar not updated; run repair_metadata");
            } else if let Err(undo) = tree.slot.remove_file(&path) {
                warn!(path = %path.display(), error = %undo, "failed to remove unrecorded file; run repair_metadata");
            }
            return Err(e);
        }
        debug!(path = %path.display(), size, hash = %hash.short_hex(), "wrote file");

        let meta = tree.require(&path)?;
        let (parent, name) = split(&path)?;
        let label = DirectoryMetadata::load(&tree.slot, &parent)?
            .label(&name)
            .map(str::to_string);
        Ok(FileNode {
            path,
            size,
            hash: Some(hash),
            label,
            modified: meta.modified,
            created: meta.created,
        })
    }
}

impl<S: PhysicalSlot> Write for FileWriter<'_, S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
