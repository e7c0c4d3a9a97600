use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use dor_slot::SlotLayout;
use serde::{Deserialize, Serialize};

use crate::equality::DEFAULT_AUDIT_FIELDS;
use crate::error::{MigrationError, MigrationResult};
use crate::transform::TransformOptions;

/// Where a migration reads from, builds into, and parks the originals.
///
/// ```toml
/// source_store_root = "/srv/dor/metadata"
/// source_log_root = "/srv/dor/metadata-log"
/// target_store_root = "/srv/dor/metadata.new"
/// target_log_root = "/srv/dor/metadata-log.new"
/// backup_store_root = "/srv/dor/metadata.old"
/// backup_log_root = "/srv/dor/metadata-log.old"
/// layout = "2-2-4"
/// checkpoint = "/srv/dor/metadata.checkpoint.json"
///
/// [transform]
/// legacy_strategy = "convert"
/// repair_links = true
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationConfig {
    pub source_store_root: PathBuf,
    pub source_log_root: PathBuf,
    pub target_store_root: PathBuf,
    pub target_log_root: PathBuf,
    pub backup_store_root: PathBuf,
    pub backup_log_root: PathBuf,
    /// Slot layout of the target store.
    #[serde(default)]
    pub layout: SlotLayout,
    #[serde(default)]
    pub transform: TransformOptions,
    /// Attributes ignored when deciding whether a revision changed anything.
    #[serde(default = "default_audit_fields")]
    pub audit_fields: Vec<String>,
    /// Progress file enabling resume after an interrupted run.
    #[serde(default)]
    pub checkpoint: Option<PathBuf>,
    /// Swap the new roots into place when replay succeeds.
    #[serde(default = "default_cutover")]
    pub cutover: bool,
}

fn default_audit_fields() -> Vec<String> {
    DEFAULT_AUDIT_FIELDS.iter().map(|f| f.to_string()).collect()
}

fn default_cutover() -> bool {
    true
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

impl MigrationConfig {
    /// Config for migrating the store at `store_root` with its log at
    /// `log_root`. New roots get a `.new` suffix and backups `.old`.
    pub fn new(store_root: impl Into<PathBuf>, log_root: impl Into<PathBuf>) -> Self {
        let store_root = store_root.into();
        let log_root = log_root.into();
        Self {
            target_store_root: sibling(&store_root, ".new"),
            target_log_root: sibling(&log_root, ".new"),
            backup_store_root: sibling(&store_root, ".old"),
            backup_log_root: sibling(&log_root, ".old"),
            source_store_root: store_root,
            source_log_root: log_root,
            layout: SlotLayout::default(),
            transform: TransformOptions::default(),
            audit_fields: default_audit_fields(),
            checkpoint: None,
            cutover: true,
        }
    }

    pub fn with_layout(mut self, layout: SlotLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_transform(mut self, transform: TransformOptions) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_checkpoint(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint = Some(path.into());
        self
    }

    pub fn without_cutover(mut self) -> Self {
        self.cutover = false;
        self
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> MigrationResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| MigrationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> MigrationResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// All six roots must be distinct.
    pub fn validate(&self) -> MigrationResult<()> {
        let roots = [
            &self.source_store_root,
            &self.source_log_root,
            &self.target_store_root,
            &self.target_log_root,
            &self.backup_store_root,
            &self.backup_log_root,
        ];
        let mut seen = BTreeSet::new();
        for root in roots {
            if root.as_os_str().is_empty() {
                return Err(MigrationError::Config("roots must not be empty".into()));
            }
            if !seen.insert(root) {
                return Err(MigrationError::Config(format!(
                    "{} is used for more than one root",
                    root.display()
                )));
            }
        }
        Ok(())
    }
}
