use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use dor_types::SlotId;

use crate::error::{StoreError, StoreResult};
use crate::traits::ObjectStore;

struct StoredEntry {
    content: Vec<u8>,
    modified: DateTime<Utc>,
}

/// In-memory, `BTreeMap`-based object store.
///
/// Intended for tests and embedding. Content is cloned on read and write.
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<SlotId, StoredEntry>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored objects.
    pub fn total_bytes(&self) -> u64 {
        self.objects
            .read()
            .expect("lock poisoned")
            .values()
            .map(|entry| entry.content.len() as u64)
            .sum()
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("objects", &self.len())
            .finish()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn create(&self, content: &[u8]) -> StoreResult<SlotId> {
        let mut map = self.objects.write().expect("lock poisoned");
        // Allocation and insertion happen under one write lock.
        let id = map
            .keys()
            .next_back()
            .map(|id| id.next())
            .unwrap_or(SlotId::new(1));
        map.insert(
            id,
            StoredEntry {
                content: content.to_vec(),
                modified: Utc::now(),
            },
        );
        Ok(id)
    }

    fn create_with_id(&self, content: &[u8], id: SlotId) -> StoreResult<()> {
        let mut map = self.objects.write().expect("lock poisoned");
        if map.contains_key(&id) {
            return Err(StoreError::Collision(id));
        }
        map.insert(
            id,
            StoredEntry {
                content: content.to_vec(),
                modified: Utc::now(),
            },
        );
        Ok(())
    }

    fn update(&self, content: &[u8], id: SlotId) -> StoreResult<()> {
        let mut map = self.objects.write().expect("lock poisoned");
        let entry = map.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        entry.content = content.to_vec();
        entry.modified = Utc::now();
        Ok(())
    }

    fn retrieve(&self, id: SlotId) -> StoreResult<Option<Vec<u8>>> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.get(&id).map(|entry| entry.content.clone()))
    }

    fn delete(&self, id: SlotId) -> StoreResult<()> {
        let mut map = self.objects.write().expect("lock poisoned");
        map.remove(&id).map(|_| ()).ok_or(StoreError::NotFound(id))
    }

    fn last_modified(&self, id: SlotId) -> StoreResult<Option<DateTime<Utc>>> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.get(&id).map(|entry| entry.modified))
    }

    fn set_last_modified(&self, id: SlotId, time: DateTime<Utc>) -> StoreResult<()> {
        let mut map = self.objects.write().expect("lock poisoned");
        let entry = map.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        entry.modified = time;
        Ok(())
    }

    fn ids(&self) -> StoreResult<Vec<SlotId>> {
        Ok(self
            .objects
            .read()
            .expect("lock poisoned")
            .keys()
            .copied()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn crud_contract() {
        let store = InMemoryObjectStore::new();
        let id = SlotId::new(5);

        store.create_with_id(b"X", id).unwrap();
        assert_eq!(store.retrieve(id).unwrap(), Some(b"X".to_vec()));
        assert!(matches!(
            store.create_with_id(b"Z", id),
            Err(StoreError::Collision(_))
        ));

        store.update(b"Y", id).unwrap();
        assert_eq!(store.retrieve(id).unwrap(), Some(b"Y".to_vec()));

        store.delete(id).unwrap();
        assert_eq!(store.retrieve(id).unwrap(), None);
        assert!(matches!(store.delete(id), Err(StoreError::NotFound(_))));
        assert!(matches!(store.update(b"Y", id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn create_allocates_sequentially() {
        let store = InMemoryObjectStore::new();
        assert_eq!(store.create(b"a").unwrap(), SlotId::new(1));
        store.create_with_id(b"b", SlotId::new(10)).unwrap();
        assert_eq!(store.create(b"c").unwrap(), SlotId::new(11));
        assert_eq!(store.len(), 3);
        assert_eq!(store.total_bytes(), 3);
    }

    #[test]
    fn concurrent_creates_get_distinct_ids() {
        let store = Arc::new(InMemoryObjectStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || (0..25).map(|_| store.create(b"x").unwrap()).collect::<Vec<_>>())
            })
            .collect();
        let mut all: Vec<SlotId> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 200);
    }

    #[test]
    fn timestamps_are_settable() {
        let store = InMemoryObjectStore::new();
        let id = store.create(b"x").unwrap();
        let when = DateTime::<Utc>::from_timestamp(1_000_000_000, 0).unwrap();
        store.set_last_modified(id, when).unwrap();
        assert_eq!(store.last_modified(id).unwrap(), Some(when));
        assert!(store.exists(id).unwrap());
        assert!(!store.exists(SlotId::new(99)).unwrap());
    }
}
