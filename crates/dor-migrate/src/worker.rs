use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use dor_log::{LogError, RevisionLog};
use dor_types::RevisionNumber;
use tracing::{debug, warn};

use crate::error::{MigrationError, MigrationResult};

enum Message {
    Fix {
        revision: RevisionNumber,
        date: DateTime<Utc>,
    },
    /// Reply once every earlier fix has been applied.
    Barrier(Sender<()>),
}

struct Outcome {
    applied: usize,
    first_error: Option<LogError>,
}

/// Background thread rewriting the recorded dates of target revisions.
///
/// Fixes are applied in submission order. The first failure is kept and
/// reported by [`drain`](Self::drain); later fixes are still attempted.
pub struct DateFixWorker {
    sender: Sender<Message>,
    handle: JoinHandle<Outcome>,
}

impl DateFixWorker {
    pub fn spawn<L>(log: Arc<L>) -> MigrationResult<Self>
    where
        L: RevisionLog + ?Sized + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("dor-date-fix".into())
            .spawn(move || run(log, receiver))?;
        Ok(Self { sender, handle })
    }

    /// Queue a date fix without waiting for it.
    pub fn submit(&self, revision: RevisionNumber, date: DateTime<Utc>) -> MigrationResult<()> {
        self.sender
            .send(Message::Fix { revision, date })
            .map_err(|_| MigrationError::Worker("worker thread has exited".into()))
    }

    /// Block until every fix queued so far has been applied.
    pub fn sync(&self) -> MigrationResult<()> {
        let (reply, done) = mpsc::channel();
        self.sender
            .send(Message::Barrier(reply))
            .map_err(|_| MigrationError::Worker("worker thread has exited".into()))?;
        done.recv()
            .map_err(|_| MigrationError::Worker("worker thread has exited".into()))
    }

    /// Stop accepting fixes, wait for the queue to empty, and return how
    /// many fixes were applied.
    pub fn drain(self) -> MigrationResult<usize> {
        drop(self.sender);
        let outcome = self
            .handle
            .join()
            .map_err(|_| MigrationError::Worker("worker thread panicked".into()))?;
        match outcome.first_error {
            Some(e) => Err(MigrationError::Backend(e)),
            None => Ok(outcome.applied),
        }
    }
}

impl std::fmt::Debug for DateFixWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DateFixWorker")
            .field("finished", &self.handle.is_finished())
            .finish()
    }
}

fn run<L>(log: Arc<L>, receiver: Receiver<Message>) -> Outcome
where
    L: RevisionLog + ?Sized,
{
    let mut outcome = Outcome {
        applied: 0,
        first_error: None,
    };
    for message in receiver {
        match message {
            Message::Fix { revision, date } => match log.set_revision_date(revision, date) {
                Ok(()) => {
                    outcome.applied += 1;
                    debug!(revision = %revision, date = %date, "fixed revision date");
                }
                Err(e) => {
                    warn!(revision = %revision, error = %e, "failed to fix revision date");
                    outcome.first_error.get_or_insert(e);
                }
            },
            Message::Barrier(reply) => {
                let _ = reply.send(());
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use dor_log::{InMemoryRevisionLog, PathChange};
    use dor_types::CommitInfo;

    fn log_with(revisions: usize) -> Arc<InMemoryRevisionLog> {
        let log = Arc::new(InMemoryRevisionLog::new());
        let info = CommitInfo::new("t", "m");
        for i in 0..revisions {
            log.commit(&info, &[PathChange::put("p", format!("v{i}"))]).unwrap();
        }
        log
    }

    #[test]
    fn drain_applies_every_fix() {
        let log = log_with(3);
        let worker = DateFixWorker::spawn(Arc::clone(&log)).unwrap();
        let when = Utc.with_ymd_and_hms(2005, 5, 5, 5, 5, 5).unwrap();
        for r in 1..=3 {
            worker.submit(RevisionNumber::new(r), when).unwrap();
        }
        assert_eq!(worker.drain().unwrap(), 3);
        for r in 1..=3 {
            assert_eq!(log.revision(RevisionNumber::new(r)).unwrap().date, when);
        }
    }

    #[test]
    fn sync_waits_for_queued_fixes() {
        let log = log_with(1);
        let worker = DateFixWorker::spawn(Arc::clone(&log)).unwrap();
        let when = Utc.with_ymd_and_hms(2001, 2, 3, 4, 5, 6).unwrap();
        worker.submit(RevisionNumber::new(1), when).unwrap();
        worker.sync().unwrap();
        assert_eq!(log.revision(RevisionNumber::new(1)).unwrap().date, when);
        worker.drain().unwrap();
    }

    #[test]
    fn failures_surface_on_drain() {
        let log = log_with(1);
        let worker = DateFixWorker::spawn(Arc::clone(&log)).unwrap();
        worker.submit(RevisionNumber::new(9), Utc::now()).unwrap();
        worker.submit(RevisionNumber::new(1), Utc::now()).unwrap();
        assert!(matches!(
            worker.drain(),
            Err(MigrationError::Backend(LogError::NoSuchRevision { .. }))
        ));
    }
}
