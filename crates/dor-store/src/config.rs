use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use dor_slot::SlotLayout;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::versioning::DEFAULT_AUTHOR;

/// Repository configuration: the set of stores to open at startup.
///
/// ```toml
/// [[stores]]
/// name = "metadata"
/// root = "/srv/dor/metadata"
/// log_root = "/srv/dor/metadata-log"
/// layout = "2-2-4"
/// default_author = "system"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    #[serde(default)]
    pub stores: Vec<StoreConfig>,
}

/// One versioned object store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub name: String,
    /// Directory holding the slot tree.
    pub root: PathBuf,
    /// Directory holding the shadow revision journal.
    pub log_root: PathBuf,
    #[serde(default)]
    pub layout: SlotLayout,
    #[serde(default = "default_author")]
    pub default_author: String,
}

fn default_author() -> String {
    DEFAULT_AUTHOR.to_string()
}

impl StoreConfig {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>, log_root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            log_root: log_root.into(),
            layout: SlotLayout::default(),
            default_author: default_author(),
        }
    }
}

impl RepositoryConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> StoreResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| StoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> StoreResult<String> {
        toml::to_string(self).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Reject empty or duplicate store names and shared roots.
    pub fn validate(&self) -> StoreResult<()> {
        let mut names = BTreeSet::new();
        for store in &self.stores {
            if store.name.trim().is_empty() {
                return Err(StoreError::Config("store name must not be empty".into()));
            }
            if !names.insert(store.name.as_str()) {
                return Err(StoreError::Config(format!("duplicate store name: {}", store.name)));
            }
            if store.root == store.log_root {
                return Err(StoreError::Config(format!(
                    "store {} uses the same directory for objects and log",
                    store.name
                )));
            }
        }
        Ok(())
    }
}
