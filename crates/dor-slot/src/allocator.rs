use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use dor_types::SlotId;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{SlotError, SlotResult};
use crate::layout::SlotLayout;

/// Every occupied slot identifier under `root`, sorted ascending.
///
/// Entries that do not decode under `layout` are ignored.
pub fn scan_ids(root: &Path, layout: &SlotLayout) -> SlotResult<Vec<SlotId>> {
    scan(root, layout, false)
}

/// Like [`scan_ids`], for layouts whose leaves are directories.
pub fn scan_dir_ids(root: &Path, layout: &SlotLayout) -> SlotResult<Vec<SlotId>> {
    scan(root, layout, true)
}

fn scan(root: &Path, layout: &SlotLayout, leaf_is_dir: bool) -> SlotResult<Vec<SlotId>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut ids = Vec::new();
    let max_depth = layout.groups().len() + 1;
    for entry in WalkDir::new(root).min_depth(max_depth).max_depth(max_depth) {
        let entry = entry.map_err(|e| {
            SlotError::Io(
                e.into_io_error()
                    .unwrap_or_else(|| io::Error::other("walkdir loop detected")),
            )
        })?;
        let is_leaf = if leaf_is_dir {
            entry.file_type().is_dir()
        } else {
            entry.file_type().is_file()
        };
        if !is_leaf {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        if let Some(id) = layout.id_for_path(relative) {
            ids.push(id);
        }
    }
    ids.sort();
    Ok(ids)
}

/// Largest occupied identifier plus one; `1` for an empty root.
///
/// This is a point-in-time answer: two callers may receive the same value.
/// Use [`SlotAllocator`] when identifiers are handed out concurrently.
pub fn next_free_id(root: &Path, layout: &SlotLayout) -> SlotResult<SlotId> {
    let next = scan_ids(root, layout)?
        .last()
        .map(|id| id.next())
        .unwrap_or(SlotId::new(1));
    Ok(next)
}

/// Attempts before giving up on a parent directory that keeps vanishing.
const CLAIM_ATTEMPTS: usize = 16;

/// Create `path` as a new empty file, creating its parents as needed.
///
/// Fails with [`io::ErrorKind::AlreadyExists`] if the file exists. Empty
/// group directories may be pruned by a concurrent delete of a sibling
/// slot between creating the parents and the file; that case is retried.
pub fn claim_slot_file(path: &Path) -> io::Result<()> {
    let mut attempt = 1;
    loop {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(_) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound && attempt < CLAIM_ATTEMPTS => {
                debug!(path = %path.display(), attempt, "slot parent vanished; retrying");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Hands out unused slot identifiers without races.
///
/// The counter is seeded once from a scan of the root. Each reservation
/// creates the slot's leaf file with `create_new`, so a slot taken by another
/// writer (in this process or elsewhere) is skipped rather than reused.
#[derive(Debug)]
pub struct SlotAllocator {
    root: PathBuf,
    layout: SlotLayout,
    next: AtomicU64,
}

impl SlotAllocator {
    pub fn open(root: impl Into<PathBuf>, layout: SlotLayout) -> SlotResult<Self> {
        let root = root.into();
        let next = next_free_id(&root, &layout)?;
        debug!(root = %root.display(), next = %next, "slot allocator seeded");
        Ok(Self {
            root,
            layout,
            next: AtomicU64::new(next.value()),
        })
    }

    /// Reserve a fresh identifier. The returned path exists as an empty file.
    pub fn reserve(&self) -> SlotResult<(SlotId, PathBuf)> {
        loop {
            let id = SlotId::new(self.next.fetch_add(1, Ordering::SeqCst));
            if id > self.layout.max_id() {
                return Err(SlotError::IdOutOfRange {
                    id,
                    width: self.layout.width(),
                });
            }
            let path = self.root.join(self.layout.path_for(id)?);
            match claim_slot_file(&path) {
                Ok(()) => return Ok((id, path)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    warn!(id = %id, "slot already taken; trying next");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Make sure future reservations never return `id` or anything below it.
    pub fn observe(&self, id: SlotId) {
        self.next.fetch_max(id.next().value(), Ordering::SeqCst);
    }
}
