use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use dor_slot::{claim_slot_file, scan_ids, set_file_modified, DiskSlot, PhysicalSlot, SlotAllocator, SlotLayout};
use dor_types::SlotId;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::traits::ObjectStore;

/// Object store keeping one file per object in a slot tree on disk.
///
/// Content writes are atomic: bytes go to a temporary file beside the slot
/// and are renamed into place.
#[derive(Debug)]
pub struct FsObjectStore {
    slot: DiskSlot,
    layout: SlotLayout,
    allocator: SlotAllocator,
}

impl FsObjectStore {
    /// Open (or create) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>, layout: SlotLayout) -> StoreResult<Self> {
        let slot = DiskSlot::create(root)?;
        let allocator = SlotAllocator::open(slot.root(), layout.clone())?;
        Ok(Self {
            slot,
            layout,
            allocator,
        })
    }

    pub fn root(&self) -> &Path {
        self.slot.root()
    }

    pub fn layout(&self) -> &SlotLayout {
        &self.layout
    }

    /// Absolute path of the slot file for `id`.
    pub fn path_of(&self, id: SlotId) -> StoreResult<PathBuf> {
        Ok(self.root().join(self.layout.path_for(id)?))
    }

    fn relative(&self, id: SlotId) -> StoreResult<PathBuf> {
        Ok(self.layout.path_for(id)?)
    }

    /// Remove now-empty digit-group directories above a deleted slot.
    fn prune_empty_parents(&self, relative: &Path) {
        let mut current = relative.parent();
        while let Some(dir) = current {
            if dir.as_os_str().is_empty() {
                break;
            }
            match self.slot.remove_dir(dir) {
                Ok(()) => {}
                Err(_) => break,
            }
            current = dir.parent();
        }
    }
}

impl ObjectStore for FsObjectStore {
    fn create(&self, content: &[u8]) -> StoreResult<SlotId> {
        let (id, _) = self.allocator.reserve()?;
        let relative = self.relative(id)?;
        if let Err(e) = self.slot.write(&relative, content) {
            // Release the reservation so the slot is not left empty.
            if let Err(cleanup) = self.slot.remove_file(&relative) {
                warn!(id = %id, error = %cleanup, "failed to release slot reservation");
            }
            return Err(e.into());
        }
        debug!(id = %id, size = content.len(), "created object");
        Ok(id)
    }

    fn create_with_id(&self, content: &[u8], id: SlotId) -> StoreResult<()> {
        let path = self.path_of(id)?;
        // Claim the slot exclusively before writing content.
        match claim_slot_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StoreError::Collision(id));
            }
            Err(e) => return Err(e.into()),
        }
        self.allocator.observe(id);

        let relative = self.relative(id)?;
        if let Err(e) = self.slot.write(&relative, content) {
            if let Err(cleanup) = self.slot.remove_file(&relative) {
                warn!(id = %id, error = %cleanup, "failed to release claimed slot");
            }
            return Err(e.into());
        }
        debug!(id = %id, size = content.len(), "created object");
        Ok(())
    }

    fn update(&self, content: &[u8], id: SlotId) -> StoreResult<()> {
        let relative = self.relative(id)?;
        if !self.slot.exists(&relative)? {
            return Err(StoreError::NotFound(id));
        }
        self.slot.write(&relative, content)?;
        debug!(id = %id, size = content.len(), "updated object");
        Ok(())
    }

    fn retrieve(&self, id: SlotId) -> StoreResult<Option<Vec<u8>>> {
        match fs::read(self.path_of(id)?) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, id: SlotId) -> StoreResult<()> {
        let relative = self.relative(id)?;
        match self.slot.remove_file(&relative) {
            Ok(()) => {}
            Err(dor_slot::SlotError::NotFound(_)) => return Err(StoreError::NotFound(id)),
            Err(e) => return Err(e.into()),
        }
        self.prune_empty_parents(&relative);
        debug!(id = %id, "deleted object");
        Ok(())
    }

    fn last_modified(&self, id: SlotId) -> StoreResult<Option<DateTime<Utc>>> {
        let relative = self.relative(id)?;
        Ok(self
            .slot
            .metadata(&relative)?
            .filter(|meta| meta.is_file())
            .and_then(|meta| meta.modified))
    }

    fn set_last_modified(&self, id: SlotId, time: DateTime<Utc>) -> StoreResult<()> {
        let path = self.path_of(id)?;
        match set_file_modified(&path, time) {
            Ok(()) => Ok(()),
            Err(dor_slot::SlotError::NotFound(_)) => Err(StoreError::NotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    fn ids(&self) -> StoreResult<Vec<SlotId>> {
        Ok(scan_ids(self.root(), &self.layout)?)
    }

    fn exists(&self, id: SlotId) -> StoreResult<bool> {
        Ok(self.path_of(id)?.is_file())
    }
}
