use std::fs;
use std::io::{self, Write};
use std::path::Path;

use dor_types::RevisionNumber;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::error::{MigrationError, MigrationResult};
use crate::timestamps::PendingTimestamps;

/// Progress of an interrupted migration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Run that wrote the checkpoint.
    pub run_id: Uuid,
    /// Every source revision up to and including this one is in the target.
    pub last_applied_revision: RevisionNumber,
    pub pending_timestamps: PendingTimestamps,
    /// Replay and timestamp fixing finished; only cutover may remain.
    #[serde(default)]
    pub replay_complete: bool,
}

impl Checkpoint {
    /// Read a checkpoint, or `None` if there is none at `path`.
    pub fn load(path: &Path) -> MigrationResult<Option<Self>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| MigrationError::Checkpoint(format!("{}: {e}", path.display())))
    }

    /// Replace the checkpoint at `path` atomically.
    pub fn save(&self, path: &Path) -> MigrationResult<()> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;
        let mut temp = NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(&mut temp, self)?;
        temp.flush()?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| MigrationError::Io(e.error))?;
        Ok(())
    }

    /// Delete the checkpoint at `path` if present.
    pub fn remove(path: &Path) -> MigrationResult<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
