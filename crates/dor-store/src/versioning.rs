use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dor_log::{PathChange, RevisionInfo, RevisionLog};
use dor_slot::SlotLayout;
use dor_types::{CommitInfo, RevisionNumber, SlotId};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::traits::ObjectStore;

/// Author recorded when no explicit commit info is given.
pub const DEFAULT_AUTHOR: &str = "system";

/// Outcome of reconciling one object with the log head.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeadSync {
    /// Local content already matched the head.
    Unchanged,
    /// The object existed only in the log and was written locally.
    Created,
    /// Local content differed and was replaced.
    Updated,
    /// The object was deleted at head and removed locally.
    Removed,
}

/// An [`ObjectStore`] that mirrors every mutation as a commit in a shadow
/// revision log.
///
/// Each object is recorded in the log under its slot key (for example
/// `00/00/00000137`). The store is written first; if the commit then
/// fails, the store write is undone so both sides stay in step.
pub struct VersioningObjectStore<S, L: ?Sized> {
    store: S,
    log: Arc<L>,
    layout: SlotLayout,
    default_author: String,
}

impl<S, L> VersioningObjectStore<S, L>
where
    S: ObjectStore,
    L: RevisionLog + ?Sized,
{
    pub fn new(store: S, log: Arc<L>, layout: SlotLayout) -> Self {
        Self {
            store,
            log,
            layout,
            default_author: DEFAULT_AUTHOR.to_string(),
        }
    }

    /// Author used by the plain [`ObjectStore`] methods.
    pub fn with_default_author(mut self, author: impl Into<String>) -> Self {
        self.default_author = author.into();
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn log(&self) -> &Arc<L> {
        &self.log
    }

    pub fn layout(&self) -> &SlotLayout {
        &self.layout
    }

    pub fn default_author(&self) -> &str {
        &self.default_author
    }

    /// Log path under which `id` is versioned.
    pub fn log_path(&self, id: SlotId) -> StoreResult<String> {
        Ok(self.layout.key_for(id)?)
    }

    fn default_info(&self, action: &str, id: SlotId) -> CommitInfo {
        CommitInfo::new(self.default_author.clone(), format!("{action} {id}"))
    }

    /// Commit `change`, running `undo` against the store if the commit fails.
    fn commit_or_undo(
        &self,
        id: SlotId,
        info: &CommitInfo,
        change: PathChange,
        undo: impl FnOnce(&S) -> StoreResult<()>,
    ) -> StoreResult<RevisionNumber> {
        match self.log.commit(info, &[change]) {
            Ok(revision) => Ok(revision),
            Err(e) => {
                if let Err(undo_err) = undo(&self.store) {
                    warn!(id = %id, error = %undo_err, "failed to undo store write after commit failure");
                }
                Err(e.into())
            }
        }
    }

    /// Create under a freshly allocated ID, committing with `info`.
    pub fn create_as(
        &self,
        content: &[u8],
        info: &CommitInfo,
    ) -> StoreResult<(SlotId, RevisionNumber)> {
        let id = self.store.create(content)?;
        let path = self.log_path(id)?;
        let revision =
            self.commit_or_undo(id, info, PathChange::put(path, content), |s| s.delete(id))?;
        debug!(id = %id, revision = %revision, "created versioned object");
        Ok((id, revision))
    }

    /// Create under `id`, which must be unoccupied, committing with `info`.
    pub fn create_with_id_as(
        &self,
        content: &[u8],
        id: SlotId,
        info: &CommitInfo,
    ) -> StoreResult<RevisionNumber> {
        let path = self.log_path(id)?;
        self.store.create_with_id(content, id)?;
        let revision =
            self.commit_or_undo(id, info, PathChange::put(path, content), |s| s.delete(id))?;
        debug!(id = %id, revision = %revision, "created versioned object");
        Ok(revision)
    }

    /// Replace an existing object's content, committing with `info`.
    pub fn update_as(
        &self,
        content: &[u8],
        id: SlotId,
        info: &CommitInfo,
    ) -> StoreResult<RevisionNumber> {
        let path = self.log_path(id)?;
        let previous = self.store.retrieve(id)?.ok_or(StoreError::NotFound(id))?;
        self.store.update(content, id)?;
        let revision = self.commit_or_undo(id, info, PathChange::put(path, content), |s| {
            s.update(&previous, id)
        })?;
        debug!(id = %id, revision = %revision, "updated versioned object");
        Ok(revision)
    }

    /// Delete an existing object, committing a deletion marker with `info`.
    pub fn delete_as(&self, id: SlotId, info: &CommitInfo) -> StoreResult<RevisionNumber> {
        let path = self.log_path(id)?;
        let previous = self.store.retrieve(id)?.ok_or(StoreError::NotFound(id))?;
        self.store.delete(id)?;
        let revision = self.commit_or_undo(id, info, PathChange::delete(path), |s| {
            s.create_with_id(&previous, id)
        })?;
        debug!(id = %id, revision = %revision, "deleted versioned object");
        Ok(revision)
    }

    /// Every revision of `id`, ascending.
    pub fn list_versions(&self, id: SlotId) -> StoreResult<Vec<Version<'_, S, L>>> {
        let path = self.log_path(id)?;
        Ok(self
            .log
            .history(&path)?
            .into_iter()
            .map(|info| Version {
                owner: self,
                id,
                info,
            })
            .collect())
    }

    /// Reconcile the local copy of `id` with the log head.
    ///
    /// Only the local store is written; no commit is made.
    pub fn update_to_head(&self, id: SlotId) -> StoreResult<HeadSync> {
        let path = self.log_path(id)?;
        let head = self.log.fetch_head(&path)?;
        let local = self.store.retrieve(id)?;
        let outcome = match (head, local) {
            (None, None) => HeadSync::Unchanged,
            (Some(head), None) => {
                self.store.create_with_id(&head, id)?;
                HeadSync::Created
            }
            (None, Some(_)) => {
                self.store.delete(id)?;
                HeadSync::Removed
            }
            (Some(head), Some(local)) if head == local => HeadSync::Unchanged,
            (Some(head), Some(_)) => {
                self.store.update(&head, id)?;
                HeadSync::Updated
            }
        };
        if outcome != HeadSync::Unchanged {
            debug!(id = %id, outcome = ?outcome, "reconciled object with log head");
        }
        Ok(outcome)
    }

    /// Reconcile every object known to either the log or the store.
    pub fn update_all_to_head(&self) -> StoreResult<Vec<(SlotId, HeadSync)>> {
        let mut ids: BTreeSet<SlotId> = self.store.ids()?.into_iter().collect();
        ids.extend(
            self.log
                .paths()?
                .iter()
                .filter_map(|path| self.layout.id_for_key(path)),
        );
        ids.into_iter()
            .map(|id| -> StoreResult<_> { Ok((id, self.update_to_head(id)?)) })
            .collect()
    }
}

impl<S, L> ObjectStore for VersioningObjectStore<S, L>
where
    S: ObjectStore,
    L: RevisionLog + ?Sized,
{
    fn create(&self, content: &[u8]) -> StoreResult<SlotId> {
        let id = self.store.create(content)?;
        let path = self.log_path(id)?;
        let info = self.default_info("create", id);
        self.commit_or_undo(id, &info, PathChange::put(path, content), |s| s.delete(id))?;
        Ok(id)
    }

    fn create_with_id(&self, content: &[u8], id: SlotId) -> StoreResult<()> {
        self.create_with_id_as(content, id, &self.default_info("create", id))
            .map(|_| ())
    }

    fn update(&self, content: &[u8], id: SlotId) -> StoreResult<()> {
        self.update_as(content, id, &self.default_info("update", id))
            .map(|_| ())
    }

    fn retrieve(&self, id: SlotId) -> StoreResult<Option<Vec<u8>>> {
        self.store.retrieve(id)
    }

    fn delete(&self, id: SlotId) -> StoreResult<()> {
        self.delete_as(id, &self.default_info("delete", id)).map(|_| ())
    }

    fn last_modified(&self, id: SlotId) -> StoreResult<Option<DateTime<Utc>>> {
        self.store.last_modified(id)
    }

    fn set_last_modified(&self, id: SlotId, time: DateTime<Utc>) -> StoreResult<()> {
        self.store.set_last_modified(id, time)
    }

    fn ids(&self) -> StoreResult<Vec<SlotId>> {
        self.store.ids()
    }

    fn exists(&self, id: SlotId) -> StoreResult<bool> {
        self.store.exists(id)
    }
}

impl<S: std::fmt::Debug, L: ?Sized> std::fmt::Debug for VersioningObjectStore<S, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersioningObjectStore")
            .field("store", &self.store)
            .field("layout", &self.layout.to_string())
            .field("default_author", &self.default_author)
            .finish_non_exhaustive()
    }
}

/// One historical revision of a versioned object.
pub struct Version<'a, S, L: ?Sized> {
    owner: &'a VersioningObjectStore<S, L>,
    id: SlotId,
    info: RevisionInfo,
}

impl<'a, S, L> Version<'a, S, L>
where
    S: ObjectStore,
    L: RevisionLog + ?Sized,
{
    pub fn id(&self) -> SlotId {
        self.id
    }

    /// Revision number, author, date and deletion flag.
    pub fn info(&self) -> &RevisionInfo {
        &self.info
    }

    pub fn revision(&self) -> RevisionNumber {
        self.info.revision
    }

    pub fn is_deletion(&self) -> bool {
        self.info.deleted
    }

    /// Content as of this revision, or `None` for a deletion marker.
    pub fn retrieve_content(&self) -> StoreResult<Option<Vec<u8>>> {
        if self.info.deleted {
            return Ok(None);
        }
        let path = self.owner.log_path(self.id)?;
        Ok(Some(self.owner.log.fetch(&path, self.info.revision)?))
    }

    /// Commit a new head revision whose content equals this version's.
    ///
    /// Promoting a deletion marker deletes the object at head, and fails
    /// with `NotFound` if it is already absent.
    pub fn promote_to_head(&self) -> StoreResult<RevisionNumber> {
        let owner = self.owner;
        let info = CommitInfo::new(
            owner.default_author.clone(),
            format!("promote {} to head from {}", self.id, self.info.revision),
        );
        match self.retrieve_content()? {
            Some(content) if owner.store.exists(self.id)? => {
                owner.update_as(&content, self.id, &info)
            }
            Some(content) => owner.create_with_id_as(&content, self.id, &info),
            None => owner.delete_as(self.id, &info),
        }
    }
}

impl<S, L: ?Sized> std::fmt::Debug for Version<'_, S, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Version")
            .field("id", &self.id)
            .field("info", &self.info)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryObjectStore;
    use dor_log::{ChangeKind, InMemoryRevisionLog, LogError};

    type TestStore = VersioningObjectStore<InMemoryObjectStore, InMemoryRevisionLog>;

    fn versioned() -> TestStore {
        VersioningObjectStore::new(
            InMemoryObjectStore::new(),
            Arc::new(InMemoryRevisionLog::new()),
            SlotLayout::default(),
        )
    }

    // -----------------------------------------------------------------------
    // Mirroring
    // -----------------------------------------------------------------------

    #[test]
    fn every_mutation_appends_one_commit() {
        let store = versioned();
        let id = SlotId::new(137);

        store.create_with_id(b"v1", id).unwrap();
        store.update(b"v2", id).unwrap();
        store.delete(id).unwrap();

        let log = store.log();
        assert_eq!(log.latest_revision().unwrap(), RevisionNumber::new(3));
        let kinds: Vec<ChangeKind> = (1..=3)
            .map(|r| log.revision(RevisionNumber::new(r)).unwrap().changes[0].kind)
            .collect();
        assert_eq!(kinds, vec![ChangeKind::Add, ChangeKind::Modify, ChangeKind::Delete]);

        let entry = log.revision(RevisionNumber::new(1)).unwrap();
        assert_eq!(entry.changes[0].path, "00/00/00000137");
        assert_eq!(entry.author, DEFAULT_AUTHOR);
        assert_eq!(entry.message, "create 137");
    }

    #[test]
    fn explicit_commit_info_is_recorded() {
        let store = versioned().with_default_author("robot");
        let (id, revision) = store
            .create_as(b"doc", &CommitInfo::new("alice", "initial import"))
            .unwrap();
        let entry = store.log().revision(revision).unwrap();
        assert_eq!(entry.author, "alice");
        assert_eq!(entry.message, "initial import");

        store.update(b"doc2", id).unwrap();
        assert_eq!(store.log().revision(revision.next()).unwrap().author, "robot");
    }

    #[test]
    fn failed_operations_commit_nothing() {
        let store = versioned();
        let id = SlotId::new(5);
        assert!(matches!(store.update(b"x", id), Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete(id), Err(StoreError::NotFound(_))));
        store.create_with_id(b"x", id).unwrap();
        assert!(matches!(
            store.create_with_id(b"y", id),
            Err(StoreError::Collision(_))
        ));
        assert_eq!(store.log().latest_revision().unwrap(), RevisionNumber::new(1));
    }

    #[test]
    fn commit_failure_undoes_store_write() {
        let store = versioned();
        let id = SlotId::new(8);
        store.create_with_id(b"keep", id).unwrap();
        store.log().close().unwrap();

        let err = store.update(b"lost", id).unwrap_err();
        assert!(matches!(err, StoreError::Log(LogError::Closed)));
        assert_eq!(store.retrieve(id).unwrap(), Some(b"keep".to_vec()));

        assert!(store.delete(id).is_err());
        assert_eq!(store.retrieve(id).unwrap(), Some(b"keep".to_vec()));

        assert!(store.create_with_id(b"new", SlotId::new(9)).is_err());
        assert_eq!(store.retrieve(SlotId::new(9)).unwrap(), None);
    }

    // -----------------------------------------------------------------------
    // Versions
    // -----------------------------------------------------------------------

    #[test]
    fn versions_materialize_historical_content() {
        let store = versioned();
        let id = SlotId::new(10);
        store.create_with_id(b"v1", id).unwrap();
        store.update(b"v2", id).unwrap();
        store.delete(id).unwrap();

        let versions = store.list_versions(id).unwrap();
        assert_eq!(versions.len(), 3);
        assert_eq!(versions[0].retrieve_content().unwrap(), Some(b"v1".to_vec()));
        assert_eq!(versions[1].retrieve_content().unwrap(), Some(b"v2".to_vec()));
        assert!(versions[2].is_deletion());
        assert_eq!(versions[2].retrieve_content().unwrap(), None);
        assert!(store.list_versions(SlotId::new(11)).unwrap().is_empty());
    }

    #[test]
    fn promote_commits_a_new_revision() {
        let store = versioned();
        let id = SlotId::new(10);
        store.create_with_id(b"v1", id).unwrap();
        store.update(b"v2", id).unwrap();

        let first = &store.list_versions(id).unwrap()[0];
        let revision = first.promote_to_head().unwrap();
        assert_eq!(revision, RevisionNumber::new(3));
        assert_eq!(store.retrieve(id).unwrap(), Some(b"v1".to_vec()));
        assert_eq!(store.list_versions(id).unwrap().len(), 3);
    }

    #[test]
    fn promote_after_delete_recreates() {
        let store = versioned();
        let id = SlotId::new(10);
        store.create_with_id(b"v1", id).unwrap();
        store.delete(id).unwrap();

        let versions = store.list_versions(id).unwrap();
        versions[0].promote_to_head().unwrap();
        assert_eq!(store.retrieve(id).unwrap(), Some(b"v1".to_vec()));

        // The deletion marker removes it again; a second time it is absent.
        versions[1].promote_to_head().unwrap();
        assert_eq!(store.retrieve(id).unwrap(), None);
        assert!(matches!(
            versions[1].promote_to_head(),
            Err(StoreError::NotFound(_))
        ));
    }

    // -----------------------------------------------------------------------
    // Head reconciliation
    // -----------------------------------------------------------------------

    #[test]
    fn update_to_head_applies_out_of_band_commits() {
        let store = versioned();
        let a = SlotId::new(1);
        let b = SlotId::new(2);
        let c = SlotId::new(3);
        store.create_with_id(b"a1", a).unwrap();
        store.create_with_id(b"b1", b).unwrap();

        let author = CommitInfo::new("elsewhere", "out of band");
        let log = store.log();
        log.commit(&author, &[PathChange::put("00/00/00000001", "a2")])
            .unwrap();
        log.commit(&author, &[PathChange::delete("00/00/00000002")])
            .unwrap();
        log.commit(&author, &[PathChange::put("00/00/00000003", "c1")])
            .unwrap();
        log.commit(&author, &[PathChange::put("notes/readme", "ignored")])
            .unwrap();

        let outcomes = store.update_all_to_head().unwrap();
        assert_eq!(
            outcomes,
            vec![
                (a, HeadSync::Updated),
                (b, HeadSync::Removed),
                (c, HeadSync::Created),
            ]
        );
        assert_eq!(store.retrieve(a).unwrap(), Some(b"a2".to_vec()));
        assert_eq!(store.retrieve(b).unwrap(), None);
        assert_eq!(store.retrieve(c).unwrap(), Some(b"c1".to_vec()));
        assert_eq!(store.update_to_head(a).unwrap(), HeadSync::Unchanged);
    }

    #[test]
    fn works_with_trait_object_logs() {
        let log: Arc<dyn RevisionLog> = Arc::new(InMemoryRevisionLog::new());
        let store = VersioningObjectStore::new(InMemoryObjectStore::new(), log, SlotLayout::default());
        store.create_with_id(b"x", SlotId::new(1)).unwrap();
        assert_eq!(store.list_versions(SlotId::new(1)).unwrap().len(), 1);
    }
}
