use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::error::{HistoryError, HistoryResult};
use crate::traits::{HistoryEntry, HistoryLog, NewEntry};

/// In-memory history log.
///
/// Entries are kept in their stored (encoded) form and decoded on read, the
/// same way the journal backend does it.
pub struct InMemoryHistoryLog {
    entries: RwLock<BTreeMap<String, Vec<NewEntry>>>,
}

impl InMemoryHistoryLog {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Total number of entries across all keys.
    pub fn total_entries(&self) -> HistoryResult<usize> {
        Ok(self.read()?.values().map(Vec::len).sum())
    }

    fn read(&self) -> HistoryResult<RwLockReadGuard<'_, BTreeMap<String, Vec<NewEntry>>>> {
        self.entries.read().map_err(|_| HistoryError::LockPoisoned)
    }

    fn write(&self) -> HistoryResult<RwLockWriteGuard<'_, BTreeMap<String, Vec<NewEntry>>>> {
        self.entries.write().map_err(|_| HistoryError::LockPoisoned)
    }
}

impl Default for InMemoryHistoryLog {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryLog for InMemoryHistoryLog {
    fn append(&self, key: &str, entry: &NewEntry) -> HistoryResult<()> {
        self.write()?
            .entry(key.to_string())
            .or_default()
            .push(entry.clone());
        debug!(key, version = %entry.version, tombstone = entry.is_delete(), "history append");
        Ok(())
    }

    fn history(&self, key: &str) -> HistoryResult<Vec<HistoryEntry>> {
        // Clone under the lock, decode outside it.
        let stored = self.read()?.get(key).cloned().unwrap_or_default();
        Ok(stored.iter().map(|e| e.to_entry(key)).collect())
    }

    fn entry_count(&self, key: &str) -> HistoryResult<usize> {
        Ok(self.read()?.get(key).map_or(0, Vec::len))
    }

    fn keys(&self) -> HistoryResult<Vec<String>> {
        Ok(self.read()?.keys().cloned().collect())
    }
}

impl std::fmt::Debug for InMemoryHistoryLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys = self.read().map(|m| m.len()).unwrap_or(0);
        f.debug_struct("InMemoryHistoryLog")
            .field("keys", &keys)
            .finish()
    }
}
