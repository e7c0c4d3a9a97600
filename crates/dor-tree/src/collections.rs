use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dor_slot::{scan_dir_ids, DiskSlot, SlotLayout};
use dor_types::SlotId;
use tracing::{debug, info};

use crate::error::TreeResult;
use crate::tree::FileTree;

/// Per-owner file trees under one root directory.
///
/// Each owner's tree lives at the slot path of its identifier, so owner
/// 137 under the default layout is rooted at `00/00/00000137/`.
///
/// Clones share one sidecar lock per owner, so trees handed out for the
/// same owner never interleave sidecar updates.
#[derive(Clone, Debug)]
pub struct FileCollections {
    root: PathBuf,
    layout: SlotLayout,
    locks: Arc<Mutex<HashMap<SlotId, Arc<Mutex<()>>>>>,
}

impl FileCollections {
    pub fn new(root: impl Into<PathBuf>, layout: SlotLayout) -> Self {
        Self {
            root: root.into(),
            layout,
            locks: Arc::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn layout(&self) -> &SlotLayout {
        &self.layout
    }

    /// Directory holding the tree of `owner`.
    pub fn collection_root(&self, owner: SlotId) -> TreeResult<PathBuf> {
        Ok(self.root.join(self.layout.path_for(owner)?))
    }

    fn sidecar_lock(&self, owner: SlotId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("lock poisoned");
        Arc::clone(locks.entry(owner).or_default())
    }

    /// The tree of `owner`, created on first access when `create` is set.
    ///
    /// Returns `None` if the tree does not exist and `create` is false.
    pub fn collection(&self, owner: SlotId, create: bool) -> TreeResult<Option<FileTree<DiskSlot>>> {
        let root = self.collection_root(owner)?;
        if root.is_dir() {
            let slot = DiskSlot::new(root);
            return Ok(Some(FileTree::with_lock(slot, self.sidecar_lock(owner))));
        }
        if !create {
            return Ok(None);
        }
        let slot = DiskSlot::create(&root)?;
        info!(owner = %owner, root = %root.display(), "created file collection");
        Ok(Some(FileTree::with_lock(slot, self.sidecar_lock(owner))))
    }

    /// Owners with an existing tree, ascending.
    pub fn owners(&self) -> TreeResult<Vec<SlotId>> {
        Ok(scan_dir_ids(&self.root, &self.layout)?)
    }

    /// Remove the whole tree of `owner`. Returns whether it existed.
    pub fn delete_collection(&self, owner: SlotId) -> TreeResult<bool> {
        let root = self.collection_root(owner)?;
        if !root.is_dir() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&root)?;
        debug!(owner = %owner, "deleted file collection");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collections_are_created_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let collections = FileCollections::new(dir.path(), SlotLayout::default());
        let owner = SlotId::new(137);

        assert!(collections.collection(owner, false).unwrap().is_none());
        let tree = collections.collection(owner, true).unwrap().unwrap();
        tree.write_bytes(Path::new("a.txt"), b"x").unwrap();
        assert!(dir.path().join("00/00/00000137/a.txt").is_file());

        let again = collections.collection(owner, false).unwrap().unwrap();
        assert_eq!(again.read(Path::new("a.txt")).unwrap(), b"x");
        assert_eq!(collections.owners().unwrap(), vec![owner]);
    }

    #[test]
    fn trees_for_one_owner_share_a_lock() {
        let dir = tempfile::tempdir().unwrap();
        let collections = FileCollections::new(dir.path(), SlotLayout::default());
        let owner = SlotId::new(7);
        collections.collection(owner, true).unwrap();
        let clone = collections.clone();

        let a = collections.sidecar_lock(owner);
        let b = clone.sidecar_lock(owner);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &collections.sidecar_lock(SlotId::new(8))));
    }

    #[test]
    fn delete_collection_reports_presence() {
        let dir = tempfile::tempdir().unwrap();
        let collections = FileCollections::new(dir.path(), SlotLayout::default());
        collections.collection(SlotId::new(4), true).unwrap();
        assert!(collections.delete_collection(SlotId::new(4)).unwrap());
        assert!(!collections.delete_collection(SlotId::new(4)).unwrap());
        assert!(collections.owners().unwrap().is_empty());
    }
}
