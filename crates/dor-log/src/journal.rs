use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use dor_types::{CommitInfo, RevisionNumber};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{LogError, LogResult};
use crate::state::{CommitRecord, LogState};
use crate::traits::{RevisionLog, RevisionLogFactory};
use crate::types::{PathChange, RevisionEntry, RevisionInfo};

/// Marker file identifying a journal repository.
const FORMAT_FILE: &str = "FORMAT";
const FORMAT_TAG: &str = "dor-journal-v1";
const JOURNAL_FILE: &str = "revisions.journal";

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// A single journal record.
///
/// On-disk format:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized JournalRecord)]
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
enum JournalRecord {
    Commit(CommitRecord),
    SetDate {
        revision: RevisionNumber,
        date: DateTime<Utc>,
    },
}

struct JournalInner {
    state: LogState,
    /// `None` once the session is closed.
    writer: Option<BufWriter<File>>,
    offset: u64,
}

/// Revision log persisted as an append-only, CRC-framed journal file.
///
/// Every record is flushed and synced before the in-memory index is
/// updated, so an acknowledged commit survives a crash. On open, the
/// journal is read front to back; a torn or corrupt tail (an interrupted
/// append) is logged and truncated away.
pub struct JournalRevisionLog {
    location: PathBuf,
    inner: RwLock<JournalInner>,
}

impl JournalRevisionLog {
    /// Create a new, empty journal repository at `location`.
    pub fn create(location: &Path) -> LogResult<Self> {
        if location.join(FORMAT_FILE).exists() {
            return Err(LogError::AlreadyExists(location.to_path_buf()));
        }
        fs::create_dir_all(location)?;
        fs::write(location.join(FORMAT_FILE), format!("{FORMAT_TAG}\n"))?;
        File::create(location.join(JOURNAL_FILE))?.sync_all()?;
        info!(location = %location.display(), "created revision journal");
        Self::open(location)
    }

    /// Open an existing journal repository, recovering its state.
    pub fn open(location: &Path) -> LogResult<Self> {
        let tag = fs::read_to_string(location.join(FORMAT_FILE))
            .map_err(|_| LogError::NotARepository(location.to_path_buf()))?;
        if tag.trim() != FORMAT_TAG {
            return Err(LogError::NotARepository(location.to_path_buf()));
        }

        let journal_path = location.join(JOURNAL_FILE);
        let (state, good_len) = recover(&journal_path)?;

        let file = OpenOptions::new().read(true).write(true).open(&journal_path)?;
        let file_len = file.metadata()?.len();
        if good_len < file_len {
            warn!(
                location = %location.display(),
                good_len,
                file_len,
                "truncating torn journal tail"
            );
            file.set_len(good_len)?;
            file.sync_all()?;
        }
        drop(file);

        let writer = OpenOptions::new().append(true).open(&journal_path)?;
        debug!(
            location = %location.display(),
            latest = %state.latest(),
            "opened revision journal"
        );
        Ok(Self {
            location: location.to_path_buf(),
            inner: RwLock::new(JournalInner {
                state,
                writer: Some(BufWriter::new(writer)),
                offset: good_len,
            }),
        })
    }

    /// Repository directory.
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Current journal length in bytes.
    pub fn offset(&self) -> u64 {
        self.inner.read().expect("lock poisoned").offset
    }

    fn append(inner: &mut JournalInner, record: &JournalRecord) -> LogResult<()> {
        let payload =
            bincode::serialize(record).map_err(|e| LogError::Serialization(e.to_string()))?;
        let length = u32::try_from(payload.len())
            .map_err(|_| LogError::Serialization("journal record exceeds 4 GiB".into()))?;
        let crc = crc32fast::hash(&payload);

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
        frame.extend_from_slice(&length.to_le_bytes());
        frame.extend_from_slice(&crc.to_le_bytes());
        frame.extend_from_slice(&payload);

        let writer = inner.writer.as_mut().ok_or(LogError::Closed)?;
        let written = (|| {
            writer.write_all(&frame)?;
            writer.flush()?;
            writer.get_ref().sync_data()
        })();
        if let Err(e) = written {
            Self::discard_tail(inner);
            return Err(e.into());
        }

        inner.offset += frame.len() as u64;
        Ok(())
    }

    /// Drop whatever a failed append left behind so later records follow
    /// the last intact one. If the file cannot be cut back, the session is
    /// closed instead.
    fn discard_tail(inner: &mut JournalInner) {
        let Some(writer) = inner.writer.take() else {
            return;
        };
        // Unflushed bytes are discarded rather than written.
        let (file, _) = writer.into_parts();
        match file.set_len(inner.offset).and_then(|()| file.sync_data()) {
            Ok(()) => {
                warn!(offset = inner.offset, "discarded partial journal record");
                inner.writer = Some(BufWriter::new(file));
            }
            Err(e) => {
                warn!(offset = inner.offset, error = %e, "cannot discard partial journal record; closing journal");
            }
        }
    }
}

/// Read every intact record, returning the rebuilt state and the byte
/// length of the intact prefix.
fn recover(path: &Path) -> LogResult<(LogState, u64)> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;

    let mut state = LogState::default();
    let mut offset = 0usize;
    while offset + HEADER_SIZE <= bytes.len() {
        let header = &bytes[offset..offset + HEADER_SIZE];
        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        let start = offset + HEADER_SIZE;
        if length == 0 || start + length > bytes.len() {
            warn!(offset, length, "truncated journal record; stopping recovery");
            break;
        }
        let payload = &bytes[start..start + length];
        let actual_crc = crc32fast::hash(payload);
        if actual_crc != expected_crc {
            warn!(
                offset,
                expected = expected_crc,
                actual = actual_crc,
                "CRC mismatch; stopping recovery"
            );
            break;
        }

        let record: JournalRecord = bincode::deserialize(payload).map_err(|e| LogError::Corrupt {
            offset: offset as u64,
            reason: e.to_string(),
        })?;
        match record {
            JournalRecord::Commit(commit) => state.apply(commit).map_err(|e| match e {
                LogError::Corrupt { reason, .. } => LogError::Corrupt {
                    offset: offset as u64,
                    reason,
                },
                other => other,
            })?,
            JournalRecord::SetDate { revision, date } => state.set_date(revision, date)?,
        }
        offset = start + length;
    }

    debug!(revisions = state.latest().value(), "journal recovery complete");
    Ok((state, offset as u64))
}

impl RevisionLog for JournalRevisionLog {
    fn latest_revision(&self) -> LogResult<RevisionNumber> {
        Ok(self.inner.read().expect("lock poisoned").state.latest())
    }

    fn revision(&self, revision: RevisionNumber) -> LogResult<RevisionEntry> {
        let inner = self.inner.read().expect("lock poisoned");
        inner.state.entry(revision).cloned()
    }

    fn fetch(&self, path: &str, revision: RevisionNumber) -> LogResult<Vec<u8>> {
        self.inner
            .read()
            .expect("lock poisoned")
            .state
            .fetch(path, revision)
    }

    fn commit(&self, info: &CommitInfo, changes: &[PathChange]) -> LogResult<RevisionNumber> {
        let mut inner = self.inner.write().expect("lock poisoned");
        if inner.writer.is_none() {
            return Err(LogError::Closed);
        }
        inner.state.check_commit(changes)?;

        let record = CommitRecord {
            revision: inner.state.latest().next(),
            author: info.author.clone(),
            message: info.message.clone(),
            date: Utc::now(),
            changes: changes.to_vec(),
        };
        let revision = record.revision;
        Self::append(&mut inner, &JournalRecord::Commit(record.clone()))?;
        inner.state.apply(record)?;

        debug!(revision = %revision, changes = changes.len(), "journal commit");
        Ok(revision)
    }

    fn set_revision_date(&self, revision: RevisionNumber, date: DateTime<Utc>) -> LogResult<()> {
        let mut inner = self.inner.write().expect("lock poisoned");
        // Validate before persisting so a bad request leaves no record.
        inner.state.entry(revision)?;
        Self::append(&mut inner, &JournalRecord::SetDate { revision, date })?;
        inner.state.set_date(revision, date)
    }

    fn close(&self) -> LogResult<()> {
        let mut inner = self.inner.write().expect("lock poisoned");
        if let Some(mut writer) = inner.writer.take() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
            debug!(location = %self.location.display(), "closed revision journal");
        }
        Ok(())
    }

    fn history(&self, path: &str) -> LogResult<Vec<RevisionInfo>> {
        Ok(self.inner.read().expect("lock poisoned").state.history(path))
    }

    fn paths(&self) -> LogResult<BTreeSet<String>> {
        Ok(self.inner.read().expect("lock poisoned").state.live_paths())
    }
}

impl std::fmt::Debug for JournalRevisionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalRevisionLog")
            .field("location", &self.location)
            .finish()
    }
}

/// Factory for [`JournalRevisionLog`] repositories.
#[derive(Clone, Copy, Debug, Default)]
pub struct JournalFactory;

impl RevisionLogFactory for JournalFactory {
    type Log = JournalRevisionLog;

    fn create(&self, location: &Path) -> LogResult<Self::Log> {
        JournalRevisionLog::create(location)
    }

    fn open(&self, location: &Path) -> LogResult<Self::Log> {
        JournalRevisionLog::open(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> CommitInfo {
        CommitInfo::new("journal-test", "msg")
    }

    #[test]
    fn commits_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let location = dir.path().join("log");
        {
            let log = JournalRevisionLog::create(&location).unwrap();
            log.commit(&info(), &[PathChange::put("00/00/00000001", "one")])
                .unwrap();
            log.commit(&info(), &[PathChange::put("00/00/00000001", "two")])
                .unwrap();
            log.close().unwrap();
        }

        let log = JournalRevisionLog::open(&location).unwrap();
        assert_eq!(log.latest_revision().unwrap(), RevisionNumber::new(2));
        assert_eq!(
            log.fetch("00/00/00000001", RevisionNumber::new(1)).unwrap(),
            b"one"
        );
        assert_eq!(log.fetch_head("00/00/00000001").unwrap(), Some(b"two".to_vec()));
    }

    #[test]
    fn revision_dates_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let when = DateTime::<Utc>::from_timestamp(1_000_000_000, 0).unwrap();
        {
            let log = JournalRevisionLog::create(dir.path()).unwrap();
            let r = log.commit(&info(), &[PathChange::put("p", "x")]).unwrap();
            log.set_revision_date(r, when).unwrap();
        }
        let log = JournalRevisionLog::open(dir.path()).unwrap();
        assert_eq!(log.revision(RevisionNumber::new(1)).unwrap().date, when);
    }

    #[test]
    fn create_refuses_existing_repository() {
        let dir = tempfile::tempdir().unwrap();
        JournalRevisionLog::create(dir.path()).unwrap();
        assert!(matches!(
            JournalRevisionLog::create(dir.path()),
            Err(LogError::AlreadyExists(_))
        ));
    }

    #[test]
    fn open_requires_format_marker() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            JournalRevisionLog::open(dir.path()),
            Err(LogError::NotARepository(_))
        ));
    }

    #[test]
    fn torn_tail_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let good_len;
        {
            let log = JournalRevisionLog::create(dir.path()).unwrap();
            log.commit(&info(), &[PathChange::put("p", "1")]).unwrap();
            good_len = log.offset();
        }
        // Simulate a crash halfway through the next append.
        let journal = dir.path().join(JOURNAL_FILE);
        let mut file = OpenOptions::new().append(true).open(&journal).unwrap();
        file.write_all(&[200, 0, 0, 0, 1, 2, 3, 4, 9, 9]).unwrap();
        drop(file);

        let log = JournalRevisionLog::open(dir.path()).unwrap();
        assert_eq!(log.latest_revision().unwrap(), RevisionNumber::new(1));
        assert_eq!(fs::metadata(&journal).unwrap().len(), good_len);

        // Appends continue cleanly after the truncated tail.
        log.commit(&info(), &[PathChange::put("p", "2")]).unwrap();
        drop(log);
        let log = JournalRevisionLog::open(dir.path()).unwrap();
        assert_eq!(log.latest_revision().unwrap(), RevisionNumber::new(2));
    }

    #[test]
    fn failed_append_does_not_hide_later_commits() {
        let dir = tempfile::tempdir().unwrap();
        let journal = dir.path().join(JOURNAL_FILE);
        let log = JournalRevisionLog::create(dir.path()).unwrap();
        log.commit(&info(), &[PathChange::put("p", "1")]).unwrap();
        let good_len = log.offset();

        // Partial frame from an append that failed mid-write.
        let mut file = OpenOptions::new().append(true).open(&journal).unwrap();
        file.write_all(&[200, 0, 0, 0, 1, 2, 3]).unwrap();
        drop(file);
        {
            let mut inner = log.inner.write().unwrap();
            inner.writer.as_mut().unwrap().write_all(&[7, 7]).unwrap();
            JournalRevisionLog::discard_tail(&mut inner);
        }
        assert_eq!(fs::metadata(&journal).unwrap().len(), good_len);

        log.commit(&info(), &[PathChange::put("p", "2")]).unwrap();
        log.close().unwrap();
        drop(log);

        let log = JournalRevisionLog::open(dir.path()).unwrap();
        assert_eq!(log.latest_revision().unwrap(), RevisionNumber::new(2));
        assert_eq!(log.fetch_head("p").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn corrupt_record_stops_recovery() {
        let dir = tempfile::tempdir().unwrap();
        {
            let log = JournalRevisionLog::create(dir.path()).unwrap();
            log.commit(&info(), &[PathChange::put("p", "1")]).unwrap();
            log.commit(&info(), &[PathChange::put("p", "2")]).unwrap();
        }
        let journal = dir.path().join(JOURNAL_FILE);
        let mut bytes = fs::read(&journal).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&journal, &bytes).unwrap();

        let log = JournalRevisionLog::open(dir.path()).unwrap();
        assert_eq!(log.latest_revision().unwrap(), RevisionNumber::new(1));
    }

    #[test]
    fn rejected_commit_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let log = JournalRevisionLog::create(dir.path()).unwrap();
        let before = log.offset();
        assert!(log.commit(&info(), &[PathChange::delete("ghost")]).is_err());
        assert_eq!(log.offset(), before);
    }

    #[test]
    fn closed_journal_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let log = JournalFactory.create(dir.path()).unwrap();
        log.close().unwrap();
        assert!(matches!(
            log.commit(&info(), &[PathChange::put("p", "1")]),
            Err(LogError::Closed)
        ));
        // Reads still work on a closed session.
        assert_eq!(log.latest_revision().unwrap(), RevisionNumber::ZERO);
    }
}
