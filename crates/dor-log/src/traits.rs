use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use dor_types::{CommitInfo, RevisionNumber};

use crate::error::{LogError, LogResult};
use crate::types::{ChangeKind, PathChange, RevisionEntry, RevisionInfo};

/// Append-only, revision-numbered journal of path contents.
///
/// All implementations must satisfy these invariants:
/// - Revision numbers start at 1 and increase by exactly one per commit.
/// - A committed revision's changes and content never change; only its
///   recorded date may be overwritten with [`set_revision_date`].
/// - `fetch(path, r)` returns the content as of revision `r`: the most
///   recent put at or before `r`, unless a later delete at or before `r`
///   removed it.
///
/// [`set_revision_date`]: RevisionLog::set_revision_date
pub trait RevisionLog: Send + Sync {
    /// The most recent revision (`RevisionNumber::ZERO` when empty).
    fn latest_revision(&self) -> LogResult<RevisionNumber>;

    /// Author, date, and changed paths of one revision.
    fn revision(&self, revision: RevisionNumber) -> LogResult<RevisionEntry>;

    /// Raw content of `path` as of `revision`.
    fn fetch(&self, path: &str, revision: RevisionNumber) -> LogResult<Vec<u8>>;

    /// Append a revision applying `changes` atomically.
    ///
    /// The recorded date is the wall-clock time of the call. Deleting a path
    /// that does not exist at head fails with [`LogError::PathNotFound`].
    fn commit(&self, info: &CommitInfo, changes: &[PathChange]) -> LogResult<RevisionNumber>;

    /// Overwrite the recorded date of an existing revision.
    fn set_revision_date(&self, revision: RevisionNumber, date: DateTime<Utc>) -> LogResult<()>;

    /// End the session. Later mutations fail with [`LogError::Closed`].
    fn close(&self) -> LogResult<()> {
        Ok(())
    }

    /// Every revision that touched `path`, ascending.
    ///
    /// Default implementation walks all revisions. Backends may override
    /// for better performance (e.g., a per-path index).
    fn history(&self, path: &str) -> LogResult<Vec<RevisionInfo>> {
        let mut infos = Vec::new();
        for revision in self.latest_revision()?.ascending_from_first() {
            let entry = self.revision(revision)?;
            if let Some(change) = entry.changes.iter().find(|c| c.path == path) {
                infos.push(RevisionInfo {
                    revision,
                    author: entry.author.clone(),
                    date: entry.date,
                    deleted: change.kind == ChangeKind::Delete,
                });
            }
        }
        Ok(infos)
    }

    /// Paths that exist at the latest revision.
    ///
    /// Default implementation walks all revisions.
    fn paths(&self) -> LogResult<BTreeSet<String>> {
        let mut live = BTreeSet::new();
        for revision in self.latest_revision()?.ascending_from_first() {
            for change in self.revision(revision)?.changes {
                match change.kind {
                    ChangeKind::Add | ChangeKind::Modify => {
                        live.insert(change.path);
                    }
                    ChangeKind::Delete => {
                        live.remove(&change.path);
                    }
                }
            }
        }
        Ok(live)
    }

    /// Content of `path` at the latest revision, or `None` if absent.
    fn fetch_head(&self, path: &str) -> LogResult<Option<Vec<u8>>> {
        let latest = self.latest_revision()?;
        match self.fetch(path, latest) {
            Ok(content) => Ok(Some(content)),
            Err(LogError::PathNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Creates and opens revision logs at filesystem locations.
pub trait RevisionLogFactory: Send + Sync {
    type Log: RevisionLog + 'static;

    /// Create a new, empty repository. Fails if one already exists.
    fn create(&self, location: &Path) -> LogResult<Self::Log>;

    /// Open an existing repository.
    fn open(&self, location: &Path) -> LogResult<Self::Log>;
}
