use dor_types::{ContentHash, RevisionNumber, SlotId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What replay did with one changed object path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Created,
    Updated,
    Deleted,
    /// The migrated content matched the target; nothing was committed.
    Skipped,
    /// A deletion found nothing to delete in the target.
    AlreadyAbsent,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationAction {
    pub source_revision: RevisionNumber,
    pub id: SlotId,
    pub kind: ActionKind,
    /// Target revision written, if any.
    pub target_revision: Option<RevisionNumber>,
    /// Hash of the migrated content for creates, updates and skips.
    pub hash: Option<ContentHash>,
}

/// Outcome of a completed migration run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    pub run_id: Uuid,
    /// Last source revision already applied when the run started.
    pub resumed_from: RevisionNumber,
    /// Last source revision applied by the run.
    pub last_revision: RevisionNumber,
    pub actions: Vec<MigrationAction>,
    /// Target revisions whose recorded date was rewritten.
    pub dates_fixed: usize,
    /// Slot files stamped with their historical last-modified time.
    pub timestamps_applied: usize,
    pub cut_over: bool,
}

impl MigrationReport {
    pub(crate) fn new(run_id: Uuid, resumed_from: RevisionNumber) -> Self {
        Self {
            run_id,
            resumed_from,
            last_revision: resumed_from,
            actions: Vec::new(),
            dates_fixed: 0,
            timestamps_applied: 0,
            cut_over: false,
        }
    }

    pub fn count(&self, kind: ActionKind) -> usize {
        self.actions.iter().filter(|a| a.kind == kind).count()
    }

    pub fn actions_for(&self, id: SlotId) -> impl Iterator<Item = &MigrationAction> {
        self.actions.iter().filter(move |a| a.id == id)
    }

    /// `(id, migrated content hash)` in replay order, skips excluded.
    pub fn content_sequence(&self) -> Vec<(SlotId, ContentHash)> {
        self.actions
            .iter()
            .filter(|a| matches!(a.kind, ActionKind::Created | ActionKind::Updated))
            .filter_map(|a| a.hash.map(|h| (a.id, h)))
            .collect()
    }
}
