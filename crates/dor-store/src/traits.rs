use chrono::{DateTime, Utc};
use dor_types::SlotId;

use crate::error::StoreResult;

/// CRUD of opaque content blobs keyed by numeric identifier.
///
/// All implementations must satisfy these invariants:
/// - An object is either present with its full content or absent.
/// - `create_with_id` on an occupied ID fails with `Collision` and leaves
///   the existing object untouched.
/// - `update` and `delete` on an absent ID fail with `NotFound`.
/// - All I/O errors are propagated, never silently ignored.
pub trait ObjectStore: Send + Sync {
    /// Store `content` under a freshly allocated identifier.
    fn create(&self, content: &[u8]) -> StoreResult<SlotId>;

    /// Store `content` under `id`, which must be unoccupied.
    fn create_with_id(&self, content: &[u8], id: SlotId) -> StoreResult<()>;

    /// Replace the content of an existing object.
    fn update(&self, content: &[u8], id: SlotId) -> StoreResult<()>;

    /// Read an object's content.
    ///
    /// Returns `Ok(None)` if the object does not exist.
    fn retrieve(&self, id: SlotId) -> StoreResult<Option<Vec<u8>>>;

    /// Remove an existing object.
    fn delete(&self, id: SlotId) -> StoreResult<()>;

    /// Last-modified time of an object, or `None` if absent.
    fn last_modified(&self, id: SlotId) -> StoreResult<Option<DateTime<Utc>>>;

    /// Overwrite an object's last-modified time.
    fn set_last_modified(&self, id: SlotId, time: DateTime<Utc>) -> StoreResult<()>;

    /// Every stored identifier, ascending.
    fn ids(&self) -> StoreResult<Vec<SlotId>>;

    /// Check whether an object exists.
    fn exists(&self, id: SlotId) -> StoreResult<bool> {
        Ok(self.last_modified(id)?.is_some())
    }
}
