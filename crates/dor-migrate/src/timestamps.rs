use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use dor_slot::{set_file_modified, SlotError};
use dor_types::SlotId;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::MigrationResult;

/// Historical date owed to one object's slot file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTimestamp {
    pub id: SlotId,
    /// Slot file path relative to the target store root.
    pub path: PathBuf,
    pub date: DateTime<Utc>,
}

/// Last-modified times to stamp onto slot files once replay is over.
///
/// Replay writes carry the wall-clock time; each entry remembers the date
/// of the source revision that last wrote the object. Deleting an object
/// drops its entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<PendingTimestamp>", into = "Vec<PendingTimestamp>")]
pub struct PendingTimestamps {
    entries: BTreeMap<SlotId, PendingTimestamp>,
}

impl PendingTimestamps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, id: SlotId, path: impl Into<PathBuf>, date: DateTime<Utc>) {
        self.entries.insert(
            id,
            PendingTimestamp {
                id,
                path: path.into(),
                date,
            },
        );
    }

    pub fn clear(&mut self, id: SlotId) -> Option<PendingTimestamp> {
        self.entries.remove(&id)
    }

    pub fn get(&self, id: SlotId) -> Option<&PendingTimestamp> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingTimestamp> {
        self.entries.values()
    }

    /// Stamp every entry onto its file under `root`. Returns how many files
    /// were stamped; files that have vanished are skipped with a warning.
    pub fn apply(&self, root: &Path) -> MigrationResult<usize> {
        let mut applied = 0;
        for entry in self.entries.values() {
            let path = root.join(&entry.path);
            match set_file_modified(&path, entry.date) {
                Ok(()) => applied += 1,
                Err(SlotError::NotFound(_)) => {
                    warn!(id = %entry.id, path = %path.display(), "pending timestamp target missing");
                }
                Err(e) => return Err(e.into()),
            }
        }
        debug!(applied, pending = self.entries.len(), "applied historical timestamps");
        Ok(applied)
    }
}

impl From<Vec<PendingTimestamp>> for PendingTimestamps {
    fn from(entries: Vec<PendingTimestamp>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.id, e)).collect(),
        }
    }
}

impl From<PendingTimestamps> for Vec<PendingTimestamp> {
    fn from(pending: PendingTimestamps) -> Self {
        pending.entries.into_values().collect()
    }
}
