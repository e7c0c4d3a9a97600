use std::collections::BTreeMap;
use std::sync::Arc;

use dor_log::{JournalRevisionLog, LogError};
use tracing::info;

use crate::config::{RepositoryConfig, StoreConfig};
use crate::error::{StoreError, StoreResult};
use crate::fs::FsObjectStore;
use crate::versioning::VersioningObjectStore;

/// A disk-backed store versioned into a journal.
pub type FsVersioningStore = VersioningObjectStore<FsObjectStore, JournalRevisionLog>;

/// Configured stores by name.
///
/// Built once at startup and handed to consumers explicitly.
#[derive(Debug, Default)]
pub struct StoreRegistry {
    stores: BTreeMap<String, Arc<FsVersioningStore>>,
}

impl StoreRegistry {
    /// Open every configured store, creating missing roots and journals.
    pub fn from_config(config: &RepositoryConfig) -> StoreResult<Self> {
        config.validate()?;
        let mut stores = BTreeMap::new();
        for store_config in &config.stores {
            let store = open_store(store_config)?;
            info!(
                store = %store_config.name,
                root = %store_config.root.display(),
                layout = %store_config.layout,
                "opened object store"
            );
            stores.insert(store_config.name.clone(), Arc::new(store));
        }
        Ok(Self { stores })
    }

    pub fn get(&self, name: &str) -> Option<Arc<FsVersioningStore>> {
        self.stores.get(name).cloned()
    }

    /// Like [`get`](Self::get), failing with `UnknownStore` when absent.
    pub fn require(&self, name: &str) -> StoreResult<Arc<FsVersioningStore>> {
        self.get(name)
            .ok_or_else(|| StoreError::UnknownStore(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

/// Open one configured store, creating its journal on first use.
pub fn open_store(config: &StoreConfig) -> StoreResult<FsVersioningStore> {
    let store = FsObjectStore::open(&config.root, config.layout.clone())?;
    let log = match JournalRevisionLog::open(&config.log_root) {
        Ok(log) => log,
        Err(LogError::NotARepository(_)) => JournalRevisionLog::create(&config.log_root)?,
        Err(e) => return Err(e.into()),
    };
    Ok(
        VersioningObjectStore::new(store, Arc::new(log), config.layout.clone())
            .with_default_author(config.default_author.clone()),
    )
}
