use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dor_types::RevisionNumber;
use serde::{Deserialize, Serialize};

use crate::error::{LogError, LogResult};
use crate::types::{ChangeKind, ChangedPath, PathChange, RevisionEntry, RevisionInfo};

/// A commit as persisted and replayed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct CommitRecord {
    pub revision: RevisionNumber,
    pub author: String,
    pub message: String,
    pub date: DateTime<Utc>,
    pub changes: Vec<PathChange>,
}

type PathVersions = Vec<(RevisionNumber, Option<Arc<Vec<u8>>>)>;

/// Revision table and per-path content history shared by every backend.
#[derive(Debug, Default)]
pub(crate) struct LogState {
    revisions: Vec<RevisionEntry>,
    paths: HashMap<String, PathVersions>,
}

impl LogState {
    pub fn latest(&self) -> RevisionNumber {
        RevisionNumber::new(self.revisions.len() as u64)
    }

    pub fn entry(&self, revision: RevisionNumber) -> LogResult<&RevisionEntry> {
        let index = revision.value().checked_sub(1);
        index
            .and_then(|i| self.revisions.get(i as usize))
            .ok_or(LogError::NoSuchRevision {
                revision,
                latest: self.latest(),
            })
    }

    fn exists_at_head(&self, path: &str) -> bool {
        self.paths
            .get(path)
            .and_then(|versions| versions.last())
            .is_some_and(|(_, content)| content.is_some())
    }

    pub fn fetch(&self, path: &str, revision: RevisionNumber) -> LogResult<Vec<u8>> {
        if revision > self.latest() {
            return Err(LogError::NoSuchRevision {
                revision,
                latest: self.latest(),
            });
        }
        let not_found = || LogError::PathNotFound {
            path: path.to_string(),
            revision,
        };
        let versions = self.paths.get(path).ok_or_else(not_found)?;
        // Versions are appended in revision order.
        let at = versions.partition_point(|(rev, _)| *rev <= revision);
        match at.checked_sub(1).map(|i| &versions[i]) {
            Some((_, Some(content))) => Ok(content.as_ref().clone()),
            _ => Err(not_found()),
        }
    }

    /// Validate a prospective commit against the current head.
    pub fn check_commit(&self, changes: &[PathChange]) -> LogResult<()> {
        if changes.is_empty() {
            return Err(LogError::EmptyCommit);
        }
        let mut pending: BTreeMap<&str, bool> = BTreeMap::new();
        for change in changes {
            let exists = pending
                .get(change.path())
                .copied()
                .unwrap_or_else(|| self.exists_at_head(change.path()));
            if let PathChange::Delete { path } = change {
                if !exists {
                    return Err(LogError::PathNotFound {
                        path: path.clone(),
                        revision: self.latest(),
                    });
                }
            }
            pending.insert(change.path(), matches!(change, PathChange::Put { .. }));
        }
        Ok(())
    }

    /// Apply a validated commit. The record's revision must be the next one.
    pub fn apply(&mut self, record: CommitRecord) -> LogResult<()> {
        let expected = self.latest().next();
        if record.revision != expected {
            return Err(LogError::Corrupt {
                offset: 0,
                reason: format!(
                    "commit for {} applied out of order; expected {expected}",
                    record.revision
                ),
            });
        }

        // Later changes to the same path within one commit win.
        let mut net: BTreeMap<String, Option<Vec<u8>>> = BTreeMap::new();
        for change in record.changes {
            match change {
                PathChange::Put { path, content } => net.insert(path, Some(content)),
                PathChange::Delete { path } => net.insert(path, None),
            };
        }

        let mut changes = Vec::with_capacity(net.len());
        for (path, content) in net {
            let existed = self.exists_at_head(&path);
            let kind = match (&content, existed) {
                (Some(_), false) => ChangeKind::Add,
                (Some(_), true) => ChangeKind::Modify,
                (None, _) => ChangeKind::Delete,
            };
            changes.push(ChangedPath {
                path: path.clone(),
                kind,
            });
            self.paths
                .entry(path)
                .or_default()
                .push((record.revision, content.map(Arc::new)));
        }

        self.revisions.push(RevisionEntry {
            revision: record.revision,
            author: record.author,
            message: record.message,
            date: record.date,
            changes,
        });
        Ok(())
    }

    pub fn set_date(&mut self, revision: RevisionNumber, date: DateTime<Utc>) -> LogResult<()> {
        let latest = self.latest();
        let entry = revision
            .value()
            .checked_sub(1)
            .and_then(|i| self.revisions.get_mut(i as usize))
            .ok_or(LogError::NoSuchRevision { revision, latest })?;
        entry.date = date;
        Ok(())
    }

    pub fn history(&self, path: &str) -> Vec<RevisionInfo> {
        let Some(versions) = self.paths.get(path) else {
            return Vec::new();
        };
        versions
            .iter()
            .filter_map(|(revision, content)| {
                let entry = self.entry(*revision).ok()?;
                Some(RevisionInfo {
                    revision: *revision,
                    author: entry.author.clone(),
                    date: entry.date,
                    deleted: content.is_none(),
                })
            })
            .collect()
    }

    pub fn live_paths(&self) -> BTreeSet<String> {
        self.paths
            .iter()
            .filter(|(_, versions)| versions.last().is_some_and(|(_, c)| c.is_some()))
            .map(|(path, _)| path.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(revision: u64, changes: Vec<PathChange>) -> CommitRecord {
        CommitRecord {
            revision: RevisionNumber::new(revision),
            author: "tester".into(),
            message: String::new(),
            date: DateTime::<Utc>::from_timestamp(revision as i64 * 60, 0).unwrap(),
            changes,
        }
    }

    #[test]
    fn kinds_follow_head_state() {
        let mut state = LogState::default();
        state.apply(record(1, vec![PathChange::put("a", "1")])).unwrap();
        state.apply(record(2, vec![PathChange::put("a", "2")])).unwrap();
        state.apply(record(3, vec![PathChange::delete("a")])).unwrap();
        state.apply(record(4, vec![PathChange::put("a", "4")])).unwrap();

        let kinds: Vec<ChangeKind> = (1..=4)
            .map(|r| state.entry(RevisionNumber::new(r)).unwrap().changes[0].kind)
            .collect();
        assert_eq!(
            kinds,
            vec![ChangeKind::Add, ChangeKind::Modify, ChangeKind::Delete, ChangeKind::Add]
        );
    }

    #[test]
    fn fetch_resolves_as_of_revision() {
        let mut state = LogState::default();
        state.apply(record(1, vec![PathChange::put("a", "v1")])).unwrap();
        state.apply(record(2, vec![PathChange::put("b", "other")])).unwrap();
        state.apply(record(3, vec![PathChange::delete("a")])).unwrap();

        assert_eq!(state.fetch("a", RevisionNumber::new(1)).unwrap(), b"v1");
        assert_eq!(state.fetch("a", RevisionNumber::new(2)).unwrap(), b"v1");
        assert!(matches!(
            state.fetch("a", RevisionNumber::new(3)),
            Err(LogError::PathNotFound { .. })
        ));
        assert!(matches!(
            state.fetch("b", RevisionNumber::new(1)),
            Err(LogError::PathNotFound { .. })
        ));
        assert!(matches!(
            state.fetch("a", RevisionNumber::new(9)),
            Err(LogError::NoSuchRevision { .. })
        ));
    }

    #[test]
    fn check_commit_rejects_bad_deletes() {
        let mut state = LogState::default();
        assert!(matches!(state.check_commit(&[]), Err(LogError::EmptyCommit)));
        assert!(matches!(
            state.check_commit(&[PathChange::delete("ghost")]),
            Err(LogError::PathNotFound { .. })
        ));
        // Put then delete inside one commit is fine.
        state
            .check_commit(&[PathChange::put("x", "1"), PathChange::delete("x")])
            .unwrap();
        state.apply(record(1, vec![PathChange::put("x", "1")])).unwrap();
        state.check_commit(&[PathChange::delete("x")]).unwrap();
    }

    #[test]
    fn out_of_order_apply_is_corrupt() {
        let mut state = LogState::default();
        let err = state.apply(record(2, vec![PathChange::put("a", "1")])).unwrap_err();
        assert!(matches!(err, LogError::Corrupt { .. }));
    }
}
