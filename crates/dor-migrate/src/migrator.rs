use std::sync::Arc;

use dor_log::{ChangeKind, JournalRevisionLog, RevisionEntry, RevisionLog};
use dor_store::{FsObjectStore, ObjectStore, StoreError, VersioningObjectStore};
use dor_types::{CommitInfo, ContentHash, RevisionNumber, SlotId};
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::checkpoint::Checkpoint;
use crate::config::MigrationConfig;
use crate::cutover::{cutover, RootSwap};
use crate::equality::{AuditFieldMask, SemanticEquality};
use crate::error::{MigrationError, MigrationResult};
use crate::report::{ActionKind, MigrationAction, MigrationReport};
use crate::timestamps::PendingTimestamps;
use crate::transform::ContentTransform;
use crate::worker::DateFixWorker;

/// The store a migration builds into.
pub type TargetStore = VersioningObjectStore<FsObjectStore, JournalRevisionLog>;

/// Stages of a migration run, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MigrationPhase {
    Init,
    Replay,
    FixTimestamps,
    Cutover,
    Done,
}

impl std::fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Replay => "replay",
            Self::FixTimestamps => "fix_timestamps",
            Self::Cutover => "cutover",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Rebuilds a versioned store by replaying the history of its revision log
/// through a [`ContentTransform`].
///
/// Revisions are replayed in ascending order into fresh target roots.
/// Only changed paths that decode to a slot ID are considered. Each
/// target commit keeps the source author, message and date. Nothing
/// touches the source roots until cutover, so a run that fails earlier
/// leaves the originals as they were.
pub struct HistoryMigrator {
    config: MigrationConfig,
    source: Arc<dyn RevisionLog>,
    transform: Box<dyn ContentTransform>,
    equality: Box<dyn SemanticEquality>,
    phase: MigrationPhase,
    run_id: Uuid,
}

impl HistoryMigrator {
    /// Migrator comparing content with an [`AuditFieldMask`] over the
    /// configured audit fields.
    pub fn new(
        config: MigrationConfig,
        source: Arc<dyn RevisionLog>,
        transform: impl ContentTransform + 'static,
    ) -> Self {
        let equality = AuditFieldMask::new(config.audit_fields.iter().cloned());
        Self {
            config,
            source,
            transform: Box::new(transform),
            equality: Box::new(equality),
            phase: MigrationPhase::Init,
            run_id: Uuid::now_v7(),
        }
    }

    pub fn with_equality(mut self, equality: impl SemanticEquality + 'static) -> Self {
        self.equality = Box::new(equality);
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn phase(&self) -> MigrationPhase {
        self.phase
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    fn enter(&mut self, next: MigrationPhase) {
        info!(from = %self.phase, to = %next, "migration phase");
        self.phase = next;
    }

    /// Run every phase to completion.
    pub fn run(mut self) -> MigrationResult<MigrationReport> {
        let span = info_span!("migration", run_id = %self.run_id);
        let _guard = span.enter();

        self.config.validate()?;
        if self.config.cutover {
            for root in [&self.config.source_store_root, &self.config.source_log_root] {
                if !root.is_dir() {
                    return Err(MigrationError::Config(format!(
                        "source root {} does not exist",
                        root.display()
                    )));
                }
            }
        }

        let checkpoint = match &self.config.checkpoint {
            Some(path) => Checkpoint::load(path)?,
            None => None,
        };
        if let Some(cp) = checkpoint.as_ref().filter(|cp| cp.replay_complete) {
            info!(
                last_applied = %cp.last_applied_revision,
                previous_run = %cp.run_id,
                "replay already complete; resuming at cutover"
            );
            let report = MigrationReport::new(self.run_id, cp.last_applied_revision);
            self.source.close()?;
            return self.finish(report);
        }
        let target = self.open_target(checkpoint.is_some())?;
        let (start, mut pending) = match checkpoint {
            Some(cp) => {
                info!(
                    last_applied = %cp.last_applied_revision,
                    previous_run = %cp.run_id,
                    "resuming from checkpoint"
                );
                (cp.last_applied_revision, cp.pending_timestamps)
            }
            None => (RevisionNumber::ZERO, PendingTimestamps::new()),
        };
        let mut report = MigrationReport::new(self.run_id, start);

        self.enter(MigrationPhase::Replay);
        let worker = DateFixWorker::spawn(Arc::clone(target.log()))?;
        let replayed = self.replay(&target, &worker, start, &mut pending, &mut report);
        let drained = worker.drain();
        replayed?;
        report.dates_fixed = drained?;

        self.enter(MigrationPhase::FixTimestamps);
        report.timestamps_applied = pending.apply(&self.config.target_store_root)?;
        target.log().close()?;
        self.source.close()?;
        drop(target);

        if let Some(path) = &self.config.checkpoint {
            Checkpoint {
                run_id: self.run_id,
                last_applied_revision: report.last_revision,
                pending_timestamps: PendingTimestamps::new(),
                replay_complete: true,
            }
            .save(path)?;
        }
        self.finish(report)
    }

    /// Whether an earlier run already swapped the target roots into place.
    fn already_cut_over(&self) -> bool {
        let config = &self.config;
        !config.target_store_root.exists()
            && !config.target_log_root.exists()
            && config.backup_store_root.is_dir()
            && config.backup_log_root.is_dir()
    }

    /// Cut over if configured, then drop the checkpoint.
    fn finish(&mut self, mut report: MigrationReport) -> MigrationResult<MigrationReport> {
        if self.config.cutover {
            self.enter(MigrationPhase::Cutover);
            if self.already_cut_over() {
                info!("roots already swapped by an earlier run");
            } else {
                let config = &self.config;
                cutover(&[
                    RootSwap {
                        live: &config.source_store_root,
                        staged: &config.target_store_root,
                        backup: &config.backup_store_root,
                    },
                    RootSwap {
                        live: &config.source_log_root,
                        staged: &config.target_log_root,
                        backup: &config.backup_log_root,
                    },
                ])?;
            }
            report.cut_over = true;
        }
        if let Some(path) = &self.config.checkpoint {
            Checkpoint::remove(path)?;
        }

        self.enter(MigrationPhase::Done);
        info!(
            actions = report.actions.len(),
            created = report.count(ActionKind::Created),
            updated = report.count(ActionKind::Updated),
            deleted = report.count(ActionKind::Deleted),
            skipped = report.count(ActionKind::Skipped),
            last_revision = %report.last_revision,
            "migration complete"
        );
        Ok(report)
    }

    /// Open the target roots: existing ones when resuming, new ones otherwise.
    fn open_target(&self, resuming: bool) -> MigrationResult<TargetStore> {
        let store_root = &self.config.target_store_root;
        let log_root = &self.config.target_log_root;
        let log = if resuming {
            JournalRevisionLog::open(log_root)?
        } else {
            for root in [store_root, log_root] {
                if root.exists() {
                    return Err(MigrationError::TargetExists(root.clone()));
                }
            }
            JournalRevisionLog::create(log_root)?
        };
        let store = FsObjectStore::open(store_root, self.config.layout.clone())?;
        Ok(VersioningObjectStore::new(
            store,
            Arc::new(log),
            self.config.layout.clone(),
        ))
    }

    fn replay(
        &self,
        target: &TargetStore,
        worker: &DateFixWorker,
        start: RevisionNumber,
        pending: &mut PendingTimestamps,
        report: &mut MigrationReport,
    ) -> MigrationResult<()> {
        let latest = self.source.latest_revision()?;
        if start > latest {
            return Err(MigrationError::Checkpoint(format!(
                "checkpoint at {start} is beyond the source head {latest}"
            )));
        }
        info!(from = %start.next(), to = %latest, "replaying source history");

        let mut revision = start.next();
        while revision <= latest {
            let entry = self.source.revision(revision)?;
            self.replay_revision(&entry, target, worker, pending, report)?;
            report.last_revision = revision;

            if let Some(path) = &self.config.checkpoint {
                // Dates queued so far must be durable before progress is.
                worker.sync()?;
                Checkpoint {
                    run_id: self.run_id,
                    last_applied_revision: revision,
                    pending_timestamps: pending.clone(),
                    replay_complete: false,
                }
                .save(path)?;
            }
            revision = revision.next();
        }
        Ok(())
    }

    fn replay_revision(
        &self,
        entry: &RevisionEntry,
        target: &TargetStore,
        worker: &DateFixWorker,
        pending: &mut PendingTimestamps,
        report: &mut MigrationReport,
    ) -> MigrationResult<()> {
        debug!(revision = %entry.revision, changes = entry.changes.len(), "replaying revision");
        let info = CommitInfo::new(entry.author.clone(), entry.message.clone());
        for change in &entry.changes {
            let Some(id) = self.config.layout.id_for_key(&change.path) else {
                debug!(path = %change.path, "not an object path");
                continue;
            };
            let action = match change.kind {
                ChangeKind::Delete => self.replay_delete(id, entry, &info, target, worker, pending)?,
                ChangeKind::Add | ChangeKind::Modify => {
                    self.replay_put(id, &change.path, entry, &info, target, worker, pending)?
                }
            };
            report.actions.push(action);
        }
        Ok(())
    }

    fn replay_delete(
        &self,
        id: SlotId,
        entry: &RevisionEntry,
        info: &CommitInfo,
        target: &TargetStore,
        worker: &DateFixWorker,
        pending: &mut PendingTimestamps,
    ) -> MigrationResult<MigrationAction> {
        pending.clear(id);
        let (kind, target_revision) = match target.delete_as(id, info) {
            Ok(target_revision) => {
                worker.submit(target_revision, entry.date)?;
                debug!(id = %id, revision = %entry.revision, target = %target_revision, "deleted");
                (ActionKind::Deleted, Some(target_revision))
            }
            Err(StoreError::NotFound(_)) => {
                warn!(id = %id, revision = %entry.revision, "object already absent in target");
                (ActionKind::AlreadyAbsent, None)
            }
            Err(e) => return Err(e.into()),
        };
        Ok(MigrationAction {
            source_revision: entry.revision,
            id,
            kind,
            target_revision,
            hash: None,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn replay_put(
        &self,
        id: SlotId,
        path: &str,
        entry: &RevisionEntry,
        info: &CommitInfo,
        target: &TargetStore,
        worker: &DateFixWorker,
        pending: &mut PendingTimestamps,
    ) -> MigrationResult<MigrationAction> {
        let original = self.source.fetch(path, entry.revision)?;
        let migrated = self
            .transform
            .transform(id, &original, &self.config.transform)
            .map_err(|source| MigrationError::Transformation {
                id,
                revision: entry.revision,
                source,
            })?;
        let hash = ContentHash::of(&migrated);

        let (kind, target_revision) = match target.store().retrieve(id)? {
            Some(existing) if self.equality.equivalent(&existing, &migrated) => {
                info!(id = %id, revision = %entry.revision, "content unchanged; skipped");
                return Ok(MigrationAction {
                    source_revision: entry.revision,
                    id,
                    kind: ActionKind::Skipped,
                    target_revision: None,
                    hash: Some(hash),
                });
            }
            Some(_) => (ActionKind::Updated, target.update_as(&migrated, id, info)?),
            None => (ActionKind::Created, target.create_with_id_as(&migrated, id, info)?),
        };
        worker.submit(target_revision, entry.date)?;
        pending.record(id, self.config.layout.path_for(id)?, entry.date);
        debug!(
            id = %id,
            revision = %entry.revision,
            target = %target_revision,
            hash = %hash.short_hex(),
            "migrated"
        );
        Ok(MigrationAction {
            source_revision: entry.revision,
            id,
            kind,
            target_revision: Some(target_revision),
            hash: Some(hash),
        })
    }
}

impl std::fmt::Debug for HistoryMigrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryMigrator")
            .field("run_id", &self.run_id)
            .field("phase", &self.phase)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    use chrono::{DateTime, TimeZone, Utc};
    use dor_log::{InMemoryRevisionLog, LogResult, PathChange};
    use dor_slot::SlotLayout;

    use crate::transform::{IdentityTransform, TransformError, TransformOptions};

    fn date(year: i32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, 6, 1, 12, 0, 0).unwrap()
    }

    fn key(id: u64) -> String {
        SlotLayout::default().key_for(SlotId::new(id)).unwrap()
    }

    /// Source store and log roots with a marker, plus a config around them.
    fn fixture(dir: &Path) -> MigrationConfig {
        let store = dir.join("store");
        let log = dir.join("log");
        fs::create_dir_all(&store).unwrap();
        fs::create_dir_all(&log).unwrap();
        fs::write(store.join("marker"), b"original").unwrap();
        MigrationConfig::new(store, log)
    }

    /// r1 create #10, r2 update #10, r3 delete #10.
    fn lifecycle_log() -> Arc<InMemoryRevisionLog> {
        let log = Arc::new(InMemoryRevisionLog::new());
        let info = |who: &str| CommitInfo::new(who, format!("edit by {who}"));
        log.commit_at(&info("alice"), &[PathChange::put(key(10), "v1")], date(2008)).unwrap();
        log.commit_at(&info("bob"), &[PathChange::put(key(10), "v2")], date(2009)).unwrap();
        log.commit_at(&info("carol"), &[PathChange::delete(key(10))], date(2010)).unwrap();
        log
    }

    fn upper(_: SlotId, content: &[u8], _: &TransformOptions) -> Result<Vec<u8>, TransformError> {
        Ok(content.to_ascii_uppercase())
    }

    // -----------------------------------------------------------------------
    // Replay
    // -----------------------------------------------------------------------

    #[test]
    fn create_update_delete_yields_three_actions() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture(dir.path()).without_cutover();
        let report = HistoryMigrator::new(config.clone(), lifecycle_log(), upper)
            .run()
            .unwrap();

        let kinds: Vec<ActionKind> = report.actions.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![ActionKind::Created, ActionKind::Updated, ActionKind::Deleted]);
        assert_eq!(report.timestamps_applied, 0);
        assert_eq!(report.dates_fixed, 3);

        let store = FsObjectStore::open(&config.target_store_root, SlotLayout::default()).unwrap();
        assert_eq!(store.retrieve(SlotId::new(10)).unwrap(), None);

        let log = JournalRevisionLog::open(&config.target_log_root).unwrap();
        assert_eq!(log.latest_revision().unwrap(), RevisionNumber::new(3));
        let first = log.revision(RevisionNumber::new(1)).unwrap();
        assert_eq!(first.author, "alice");
        assert_eq!(first.date, date(2008));
        assert_eq!(log.fetch(&key(10), RevisionNumber::new(2)).unwrap(), b"V2");
        assert_eq!(log.revision(RevisionNumber::new(3)).unwrap().date, date(2010));
    }

    #[test]
    fn semantically_equal_revisions_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture(dir.path()).without_cutover();
        let source = Arc::new(InMemoryRevisionLog::new());
        let info = CommitInfo::new("editor", "save");
        let doc = |by: &str, title: &str| format!(r#"<obj lastModifiedBy="{by}" title="{title}"/>"#);
        source.commit_at(&info, &[PathChange::put(key(7), doc("a", "x"))], date(2001)).unwrap();
        source.commit_at(&info, &[PathChange::put(key(7), doc("b", "x"))], date(2002)).unwrap();
        source.commit_at(&info, &[PathChange::put(key(7), doc("b", "y"))], date(2003)).unwrap();

        let report = HistoryMigrator::new(config.clone(), source, IdentityTransform)
            .run()
            .unwrap();
        assert_eq!(report.count(ActionKind::Skipped), 1);
        assert_eq!(report.count(ActionKind::Updated), 1);

        let log = JournalRevisionLog::open(&config.target_log_root).unwrap();
        assert_eq!(log.history(&key(7)).unwrap().len(), 2);
    }

    #[test]
    fn non_object_paths_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture(dir.path()).without_cutover();
        let source = Arc::new(InMemoryRevisionLog::new());
        source
            .commit(
                &CommitInfo::new("a", "m"),
                &[PathChange::put("README", "hi"), PathChange::put(key(3), "obj")],
            )
            .unwrap();
        let report = HistoryMigrator::new(config, source, IdentityTransform).run().unwrap();
        assert_eq!(report.actions.len(), 1);
        assert_eq!(report.actions[0].id, SlotId::new(3));
    }

    /// Hides the changes of one revision, so later deletes find nothing.
    struct ForgetsRevision {
        inner: InMemoryRevisionLog,
        forgotten: RevisionNumber,
    }

    impl RevisionLog for ForgetsRevision {
        fn latest_revision(&self) -> LogResult<RevisionNumber> {
            self.inner.latest_revision()
        }
        fn revision(&self, revision: RevisionNumber) -> LogResult<RevisionEntry> {
            let mut entry = self.inner.revision(revision)?;
            if revision == self.forgotten {
                entry.changes.clear();
            }
            Ok(entry)
        }
        fn fetch(&self, path: &str, revision: RevisionNumber) -> LogResult<Vec<u8>> {
            self.inner.fetch(path, revision)
        }
        fn commit(&self, info: &CommitInfo, changes: &[PathChange]) -> LogResult<RevisionNumber> {
            self.inner.commit(info, changes)
        }
        fn set_revision_date(&self, revision: RevisionNumber, date: DateTime<Utc>) -> LogResult<()> {
            self.inner.set_revision_date(revision, date)
        }
    }

    #[test]
    fn deleting_an_absent_object_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture(dir.path()).without_cutover();
        let inner = InMemoryRevisionLog::new();
        let info = CommitInfo::new("a", "m");
        inner.commit(&info, &[PathChange::put(key(10), "x")]).unwrap();
        inner.commit(&info, &[PathChange::delete(key(10))]).unwrap();
        inner.commit(&info, &[PathChange::put(key(11), "y")]).unwrap();
        let source = Arc::new(ForgetsRevision {
            inner,
            forgotten: RevisionNumber::new(1),
        });

        let report = HistoryMigrator::new(config.clone(), source, IdentityTransform)
            .run()
            .unwrap();
        let kinds: Vec<ActionKind> = report.actions.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![ActionKind::AlreadyAbsent, ActionKind::Created]);

        let log = JournalRevisionLog::open(&config.target_log_root).unwrap();
        assert_eq!(log.latest_revision().unwrap(), RevisionNumber::new(1));
    }

    #[test]
    fn two_runs_agree() {
        let run = || {
            let dir = tempfile::tempdir().unwrap();
            let config = fixture(dir.path()).without_cutover();
            let source = lifecycle_log();
            source
                .commit_at(&CommitInfo::new("d", "m"), &[PathChange::put(key(12), "z")], date(2011))
                .unwrap();
            let report = HistoryMigrator::new(config.clone(), source, upper).run().unwrap();
            let store = FsObjectStore::open(&config.target_store_root, SlotLayout::default()).unwrap();
            let contents: Vec<(SlotId, Option<Vec<u8>>)> = store
                .ids()
                .unwrap()
                .into_iter()
                .map(|id| (id, store.retrieve(id).unwrap()))
                .collect();
            (report, contents)
        };
        let (first, first_contents) = run();
        let (second, second_contents) = run();
        assert_ne!(first.run_id, second.run_id);
        assert_eq!(first.actions, second.actions);
        assert_eq!(first.content_sequence(), second.content_sequence());
        assert_eq!(first_contents, second_contents);
        assert_eq!(first_contents, vec![(SlotId::new(12), Some(b"Z".to_vec()))]);
    }

    // -----------------------------------------------------------------------
    // Failure and cutover
    // -----------------------------------------------------------------------

    #[test]
    fn transform_failure_aborts_with_originals_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture(dir.path());
        let source = lifecycle_log();
        let picky = |id: SlotId, content: &[u8], _: &TransformOptions| {
            if content == b"v2" {
                Err(TransformError::Invalid(format!("object {id} fails validation")))
            } else {
                Ok(content.to_vec())
            }
        };

        let err = HistoryMigrator::new(config.clone(), source.clone(), picky)
            .run()
            .unwrap_err();
        assert!(matches!(
            err,
            MigrationError::Transformation { id, revision, .. }
                if id == SlotId::new(10) && revision == RevisionNumber::new(2)
        ));
        assert_eq!(fs::read(config.source_store_root.join("marker")).unwrap(), b"original");
        assert!(!config.backup_store_root.exists());
        assert!(!source.is_closed());
        // Partial target is kept for inspection.
        assert!(config.target_store_root.exists());
    }

    #[test]
    fn cutover_swaps_roots_and_restores_history_dates() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture(dir.path());
        let source = Arc::new(InMemoryRevisionLog::new());
        let info = CommitInfo::new("alice", "m");
        source.commit_at(&info, &[PathChange::put(key(5), "a")], date(2004)).unwrap();
        source.commit_at(&info, &[PathChange::put(key(5), "b")], date(2006)).unwrap();

        let report = HistoryMigrator::new(config.clone(), source.clone(), upper)
            .run()
            .unwrap();
        assert!(report.cut_over);
        assert_eq!(report.timestamps_applied, 1);
        assert!(source.is_closed());

        assert_eq!(fs::read(config.backup_store_root.join("marker")).unwrap(), b"original");
        assert!(!config.target_store_root.exists());
        assert!(!config.target_log_root.exists());

        let store = FsObjectStore::open(&config.source_store_root, SlotLayout::default()).unwrap();
        assert_eq!(store.retrieve(SlotId::new(5)).unwrap(), Some(b"B".to_vec()));
        assert_eq!(store.last_modified(SlotId::new(5)).unwrap(), Some(date(2006)));

        let log = JournalRevisionLog::open(&config.source_log_root).unwrap();
        assert_eq!(log.latest_revision().unwrap(), RevisionNumber::new(2));
    }

    #[test]
    fn fresh_run_refuses_leftover_target() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture(dir.path()).without_cutover();
        HistoryMigrator::new(config.clone(), lifecycle_log(), upper).run().unwrap();
        let err = HistoryMigrator::new(config, lifecycle_log(), upper).run().unwrap_err();
        assert!(matches!(err, MigrationError::TargetExists(_)));
    }

    // -----------------------------------------------------------------------
    // Checkpoint
    // -----------------------------------------------------------------------

    #[test]
    fn interrupted_run_resumes_from_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint_path = dir.path().join("checkpoint.json");
        let config = fixture(dir.path())
            .without_cutover()
            .with_checkpoint(&checkpoint_path);
        let source = Arc::new(InMemoryRevisionLog::new());
        let info = CommitInfo::new("a", "m");
        source.commit_at(&info, &[PathChange::put(key(1), "one")], date(2001)).unwrap();
        source.commit_at(&info, &[PathChange::put(key(2), "two")], date(2002)).unwrap();
        source.commit_at(&info, &[PathChange::put(key(3), "poison")], date(2003)).unwrap();

        let fragile = |_: SlotId, content: &[u8], _: &TransformOptions| {
            if content == b"poison" {
                Err(TransformError::Malformed("unreadable".into()))
            } else {
                Ok(content.to_vec())
            }
        };
        let err = HistoryMigrator::new(config.clone(), source.clone(), fragile)
            .run()
            .unwrap_err();
        assert!(matches!(err, MigrationError::Transformation { .. }));

        let saved = Checkpoint::load(&checkpoint_path).unwrap().unwrap();
        assert_eq!(saved.last_applied_revision, RevisionNumber::new(2));
        assert_eq!(saved.pending_timestamps.len(), 2);

        let report = HistoryMigrator::new(config.clone(), source, IdentityTransform)
            .run()
            .unwrap();
        assert_eq!(report.resumed_from, RevisionNumber::new(2));
        assert_eq!(report.actions.len(), 1);
        assert_eq!(report.actions[0].id, SlotId::new(3));
        assert_eq!(report.timestamps_applied, 3);
        assert!(!checkpoint_path.exists());

        let store = FsObjectStore::open(&config.target_store_root, SlotLayout::default()).unwrap();
        assert_eq!(store.ids().unwrap().len(), 3);
        assert_eq!(store.last_modified(SlotId::new(1)).unwrap(), Some(date(2001)));
        let log = JournalRevisionLog::open(&config.target_log_root).unwrap();
        assert_eq!(log.revision(RevisionNumber::new(2)).unwrap().date, date(2002));
    }

    fn replay_complete_checkpoint(path: &Path, last: u64) {
        Checkpoint {
            run_id: Uuid::now_v7(),
            last_applied_revision: RevisionNumber::new(last),
            pending_timestamps: PendingTimestamps::new(),
            replay_complete: true,
        }
        .save(path)
        .unwrap();
    }

    #[test]
    fn checkpoint_left_after_cutover_is_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint_path = dir.path().join("checkpoint.json");
        let config = fixture(dir.path()).with_checkpoint(&checkpoint_path);
        HistoryMigrator::new(config.clone(), lifecycle_log(), upper).run().unwrap();
        assert!(!checkpoint_path.exists());

        // Crash after the swap, before the checkpoint was removed.
        replay_complete_checkpoint(&checkpoint_path, 3);
        let report = HistoryMigrator::new(config.clone(), lifecycle_log(), upper)
            .run()
            .unwrap();
        assert!(report.cut_over);
        assert!(report.actions.is_empty());
        assert!(!checkpoint_path.exists());
        assert_eq!(fs::read(config.backup_store_root.join("marker")).unwrap(), b"original");
        let log = JournalRevisionLog::open(&config.source_log_root).unwrap();
        assert_eq!(log.latest_revision().unwrap(), RevisionNumber::new(3));
    }

    #[test]
    fn replayed_run_resumes_at_cutover() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint_path = dir.path().join("checkpoint.json");
        let staged = fixture(dir.path()).without_cutover();
        HistoryMigrator::new(staged, lifecycle_log(), upper).run().unwrap();

        // Crash after replay, before the swap.
        replay_complete_checkpoint(&checkpoint_path, 3);
        let config = fixture(dir.path()).with_checkpoint(&checkpoint_path);
        let report = HistoryMigrator::new(config.clone(), lifecycle_log(), upper)
            .run()
            .unwrap();
        assert!(report.cut_over);
        assert!(report.actions.is_empty());
        assert!(!config.target_store_root.exists());
        let log = JournalRevisionLog::open(&config.source_log_root).unwrap();
        assert_eq!(log.latest_revision().unwrap(), RevisionNumber::new(3));
    }
}
