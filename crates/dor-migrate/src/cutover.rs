use std::fs::{self, File};
use std::path::Path;

use tracing::{info, warn};

use crate::error::{MigrationError, MigrationResult};

/// Paths involved in replacing one root.
#[derive(Clone, Copy, Debug)]
pub struct RootSwap<'a> {
    /// Root currently in service.
    pub live: &'a Path,
    /// Freshly built replacement.
    pub staged: &'a Path,
    /// Where the old root is kept afterwards.
    pub backup: &'a Path,
}

impl RootSwap<'_> {
    /// Move `live` to `backup`, then `staged` to `live`.
    ///
    /// If the second rename fails the first is undone. An existing backup is
    /// never overwritten.
    pub fn apply(&self) -> MigrationResult<()> {
        if self.backup.exists() {
            return Err(MigrationError::Cutover(format!(
                "backup location {} already exists",
                self.backup.display()
            )));
        }
        if !self.staged.exists() {
            return Err(MigrationError::Cutover(format!(
                "staged root {} does not exist",
                self.staged.display()
            )));
        }

        fs::rename(self.live, self.backup).map_err(|e| {
            MigrationError::Cutover(format!(
                "failed to move {} to {}: {e}",
                self.live.display(),
                self.backup.display()
            ))
        })?;

        if let Err(e) = fs::rename(self.staged, self.live) {
            if let Err(undo) = fs::rename(self.backup, self.live) {
                warn!(live = %self.live.display(), error = %undo, "failed to restore root from backup");
            }
            return Err(MigrationError::Cutover(format!(
                "failed to move {} to {} (rolled back): {e}",
                self.staged.display(),
                self.live.display()
            )));
        }

        sync_parent(self.live);
        info!(live = %self.live.display(), backup = %self.backup.display(), "root replaced");
        Ok(())
    }

    /// Put the original root back after a successful [`apply`](Self::apply).
    pub fn revert(&self) -> MigrationResult<()> {
        fs::rename(self.live, self.staged)?;
        fs::rename(self.backup, self.live)?;
        sync_parent(self.live);
        warn!(live = %self.live.display(), "root swap reverted");
        Ok(())
    }
}

/// Swap every pair in order. If a later swap fails, earlier ones are
/// reverted so that either all roots move or none do.
pub fn cutover(swaps: &[RootSwap<'_>]) -> MigrationResult<()> {
    for (done, swap) in swaps.iter().enumerate() {
        if let Err(e) = swap.apply() {
            for earlier in swaps[..done].iter().rev() {
                if let Err(undo) = earlier.revert() {
                    warn!(live = %earlier.live.display(), error = %undo, "failed to revert root swap");
                }
            }
            return Err(e);
        }
    }
    Ok(())
}

fn sync_parent(path: &Path) {
    let Some(parent) = path.parent() else {
        return;
    };
    // Directory fsync is unsupported on some platforms.
    if let Ok(dir) = File::open(parent) {
        let _ = dir.sync_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir_with(root: &Path, name: &str, marker: &str) -> std::path::PathBuf {
        let path = root.join(name);
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("marker"), marker).unwrap();
        path
    }

    fn marker(path: &Path) -> String {
        fs::read_to_string(path.join("marker")).unwrap()
    }

    #[test]
    fn swaps_roots_and_keeps_backup() {
        let tmp = tempfile::tempdir().unwrap();
        let live = dir_with(tmp.path(), "store", "old");
        let staged = dir_with(tmp.path(), "store.new", "new");
        let backup = tmp.path().join("store.old");

        RootSwap { live: &live, staged: &staged, backup: &backup }.apply().unwrap();
        assert_eq!(marker(&live), "new");
        assert_eq!(marker(&backup), "old");
        assert!(!staged.exists());
    }

    #[test]
    fn existing_backup_refuses() {
        let tmp = tempfile::tempdir().unwrap();
        let live = dir_with(tmp.path(), "store", "old");
        let staged = dir_with(tmp.path(), "store.new", "new");
        let backup = dir_with(tmp.path(), "store.old", "older");

        let err = RootSwap { live: &live, staged: &staged, backup: &backup }.apply().unwrap_err();
        assert!(matches!(err, MigrationError::Cutover(_)));
        assert_eq!(marker(&live), "old");
        assert_eq!(marker(&backup), "older");
    }

    #[test]
    fn failed_second_swap_reverts_the_first() {
        let tmp = tempfile::tempdir().unwrap();
        let store = dir_with(tmp.path(), "store", "old");
        let store_new = dir_with(tmp.path(), "store.new", "new");
        let store_old = tmp.path().join("store.old");
        let log = dir_with(tmp.path(), "log", "old-log");
        let log_new = tmp.path().join("log.new");
        let log_old = tmp.path().join("log.old");

        let err = cutover(&[
            RootSwap { live: &store, staged: &store_new, backup: &store_old },
            RootSwap { live: &log, staged: &log_new, backup: &log_old },
        ])
        .unwrap_err();
        assert!(matches!(err, MigrationError::Cutover(_)));
        assert_eq!(marker(&store), "old");
        assert_eq!(marker(&store_new), "new");
        assert!(!store_old.exists());
        assert_eq!(marker(&log), "old-log");
    }
}
