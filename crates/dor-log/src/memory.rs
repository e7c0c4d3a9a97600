use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use dor_types::{CommitInfo, RevisionNumber};

use crate::error::{LogError, LogResult};
use crate::state::{CommitRecord, LogState};
use crate::traits::RevisionLog;
use crate::types::{PathChange, RevisionEntry, RevisionInfo};

/// In-memory revision log.
///
/// Intended for tests and embedding. Everything is lost when the log is
/// dropped.
#[derive(Debug, Default)]
pub struct InMemoryRevisionLog {
    state: RwLock<LogState>,
    closed: AtomicBool,
}

impl InMemoryRevisionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit with an explicit date instead of the wall clock.
    ///
    /// Useful for building fixture histories.
    pub fn commit_at(
        &self,
        info: &CommitInfo,
        changes: &[PathChange],
        date: DateTime<Utc>,
    ) -> LogResult<RevisionNumber> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LogError::Closed);
        }
        let mut state = self.state.write().expect("lock poisoned");
        state.check_commit(changes)?;
        let revision = state.latest().next();
        state.apply(CommitRecord {
            revision,
            author: info.author.clone(),
            message: info.message.clone(),
            date,
            changes: changes.to_vec(),
        })?;
        Ok(revision)
    }

    /// Whether [`close`](RevisionLog::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl RevisionLog for InMemoryRevisionLog {
    fn latest_revision(&self) -> LogResult<RevisionNumber> {
        Ok(self.state.read().expect("lock poisoned").latest())
    }

    fn revision(&self, revision: RevisionNumber) -> LogResult<RevisionEntry> {
        let state = self.state.read().expect("lock poisoned");
        state.entry(revision).cloned()
    }

    fn fetch(&self, path: &str, revision: RevisionNumber) -> LogResult<Vec<u8>> {
        self.state.read().expect("lock poisoned").fetch(path, revision)
    }

    fn commit(&self, info: &CommitInfo, changes: &[PathChange]) -> LogResult<RevisionNumber> {
        self.commit_at(info, changes, Utc::now())
    }

    fn set_revision_date(&self, revision: RevisionNumber, date: DateTime<Utc>) -> LogResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LogError::Closed);
        }
        self.state
            .write()
            .expect("lock poisoned")
            .set_date(revision, date)
    }

    fn close(&self) -> LogResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn history(&self, path: &str) -> LogResult<Vec<RevisionInfo>> {
        Ok(self.state.read().expect("lock poisoned").history(path))
    }

    fn paths(&self) -> LogResult<BTreeSet<String>> {
        Ok(self.state.read().expect("lock poisoned").live_paths())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChangeKind;

    fn info(author: &str) -> CommitInfo {
        CommitInfo::new(author, "test")
    }

    #[test]
    fn commits_are_numbered_from_one() {
        let log = InMemoryRevisionLog::new();
        assert_eq!(log.latest_revision().unwrap(), RevisionNumber::ZERO);

        let r1 = log.commit(&info("a"), &[PathChange::put("p", "1")]).unwrap();
        let r2 = log.commit(&info("b"), &[PathChange::put("p", "2")]).unwrap();
        assert_eq!(r1, RevisionNumber::new(1));
        assert_eq!(r2, RevisionNumber::new(2));
        assert_eq!(log.latest_revision().unwrap(), r2);

        let entry = log.revision(r2).unwrap();
        assert_eq!(entry.author, "b");
        assert_eq!(entry.changes[0].kind, ChangeKind::Modify);
    }

    #[test]
    fn history_and_paths() {
        let log = InMemoryRevisionLog::new();
        log.commit(&info("a"), &[PathChange::put("x", "1"), PathChange::put("y", "1")])
            .unwrap();
        log.commit(&info("a"), &[PathChange::delete("x")]).unwrap();

        let history = log.history("x").unwrap();
        assert_eq!(history.len(), 2);
        assert!(!history[0].deleted);
        assert!(history[1].deleted);

        let paths: Vec<_> = log.paths().unwrap().into_iter().collect();
        assert_eq!(paths, vec!["y".to_string()]);
        assert_eq!(log.fetch_head("x").unwrap(), None);
        assert_eq!(log.fetch_head("y").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn default_history_matches_indexed_history() {
        struct Walker<'a>(&'a InMemoryRevisionLog);
        impl RevisionLog for Walker<'_> {
            fn latest_revision(&self) -> LogResult<RevisionNumber> {
                self.0.latest_revision()
            }
            fn revision(&self, r: RevisionNumber) -> LogResult<RevisionEntry> {
                self.0.revision(r)
            }
            fn fetch(&self, p: &str, r: RevisionNumber) -> LogResult<Vec<u8>> {
                self.0.fetch(p, r)
            }
            fn commit(&self, i: &CommitInfo, c: &[PathChange]) -> LogResult<RevisionNumber> {
                self.0.commit(i, c)
            }
            fn set_revision_date(&self, r: RevisionNumber, d: DateTime<Utc>) -> LogResult<()> {
                self.0.set_revision_date(r, d)
            }
        }

        let log = InMemoryRevisionLog::new();
        log.commit(&info("a"), &[PathChange::put("x", "1")]).unwrap();
        log.commit(&info("b"), &[PathChange::put("z", "1")]).unwrap();
        log.commit(&info("c"), &[PathChange::delete("x")]).unwrap();

        let walker = Walker(&log);
        assert_eq!(walker.history("x").unwrap(), log.history("x").unwrap());
        assert_eq!(walker.paths().unwrap(), log.paths().unwrap());
    }

    #[test]
    fn set_revision_date_overwrites() {
        let log = InMemoryRevisionLog::new();
        let r = log.commit(&info("a"), &[PathChange::put("p", "1")]).unwrap();
        let when = DateTime::<Utc>::from_timestamp(1_234_567_890, 0).unwrap();
        log.set_revision_date(r, when).unwrap();
        assert_eq!(log.revision(r).unwrap().date, when);
        assert!(matches!(
            log.set_revision_date(RevisionNumber::new(7), when),
            Err(LogError::NoSuchRevision { .. })
        ));
    }

    #[test]
    fn closed_log_rejects_commits() {
        let log = InMemoryRevisionLog::new();
        log.close().unwrap();
        assert!(log.is_closed());
        assert!(matches!(
            log.commit(&info("a"), &[PathChange::put("p", "1")]),
            Err(LogError::Closed)
        ));
    }
}
