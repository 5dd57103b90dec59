use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use certledger_store::{Journal, SyncMode};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{HistoryError, HistoryResult};
use crate::memory::InMemoryHistoryLog;
use crate::traits::{HistoryEntry, HistoryLog, NewEntry};

#[derive(Serialize, Deserialize)]
struct LoggedEntry {
    key: String,
    entry: NewEntry,
}

/// History log persisted to a journal file and replayed on open.
pub struct JournalHistoryLog {
    journal: Journal,
    entries: InMemoryHistoryLog,
    /// Keeps journal order and in-memory order identical.
    write_gate: Mutex<()>,
}

impl JournalHistoryLog {
    pub fn open(path: &Path, sync_mode: SyncMode) -> HistoryResult<Self> {
        let journal = Journal::open(path, sync_mode)?;
        let entries = InMemoryHistoryLog::new();

        let logged: Vec<LoggedEntry> = journal.replay()?;
        let replayed = logged.len();
        for LoggedEntry { key, entry } in logged {
            entries.append(&key, &entry)?;
        }

        info!(path = %path.display(), replayed, "history log opened");
        Ok(Self {
            journal,
            entries,
            write_gate: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        self.journal.path()
    }

    fn gate(&self) -> HistoryResult<MutexGuard<'_, ()>> {
        self.write_gate.lock().map_err(|_| HistoryError::LockPoisoned)
    }
}

impl HistoryLog for JournalHistoryLog {
    fn append(&self, key: &str, entry: &NewEntry) -> HistoryResult<()> {
        let _gate = self.gate()?;
        self.journal.append(&LoggedEntry {
            key: key.to_string(),
            entry: entry.clone(),
        })?;
        self.entries.append(key, entry)
    }

    fn history(&self, key: &str) -> HistoryResult<Vec<HistoryEntry>> {
        self.entries.history(key)
    }

    fn entry_count(&self, key: &str) -> HistoryResult<usize> {
        self.entries.entry_count(key)
    }

    fn keys(&self) -> HistoryResult<Vec<String>> {
        self.entries.keys()
    }
}

impl std::fmt::Debug for JournalHistoryLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalHistoryLog")
            .field("path", &self.journal.path())
            .field("entries", &self.entries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certledger_types::{Timestamp, TxId, Version};

    fn entry(version: u64) -> NewEntry {
        NewEntry::write(
            TxId::new(),
            Version::new(version),
            Timestamp::from_millis(version as i64),
            format!("payload-{version}").into_bytes(),
        )
    }

    #[test]
    fn reopen_reproduces_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.journal");
        let tombstone = NewEntry::tombstone(TxId::new(), Version::new(3), Timestamp::from_millis(3));
        let before = {
            let log = JournalHistoryLog::open(&path, SyncMode::default()).unwrap();
            log.append("0001", &entry(1)).unwrap();
            log.append("0002", &entry(1)).unwrap();
            log.append("0001", &entry(2)).unwrap();
            log.append("0001", &tombstone).unwrap();
            log.history("0001").unwrap()
        };

        let log = JournalHistoryLog::open(&path, SyncMode::default()).unwrap();
        assert_eq!(log.history("0001").unwrap(), before);
        assert_eq!(log.entry_count("0002").unwrap(), 1);
        assert_eq!(log.keys().unwrap(), vec!["0001", "0002"]);
        assert!(log.history("0001").unwrap()[2].is_delete);
    }

    #[test]
    fn appends_continue_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.journal");
        {
            let log = JournalHistoryLog::open(&path, SyncMode::EveryWrite).unwrap();
            log.append("k", &entry(1)).unwrap();
        }
        {
            let log = JournalHistoryLog::open(&path, SyncMode::EveryWrite).unwrap();
            log.append("k", &entry(2)).unwrap();
        }
        let log = JournalHistoryLog::open(&path, SyncMode::EveryWrite).unwrap();
        let versions: Vec<u64> = log
            .history("k")
            .unwrap()
            .iter()
            .map(|e| e.version.get())
            .collect();
        assert_eq!(versions, vec![1, 2]);
    }
}
