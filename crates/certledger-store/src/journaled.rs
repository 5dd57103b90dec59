use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use certledger_types::Version;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::journal::{Journal, SyncMode};
use crate::memory::InMemoryRecordStore;
use crate::traits::{RecordStore, ScanIter, StoredValue};

/// One state change as recorded in the store journal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
enum StoreOp {
    Put {
        key: String,
        version: Version,
        bytes: Vec<u8>,
    },
    Delete {
        key: String,
        version: Version,
    },
}

/// Record store whose state survives restarts.
///
/// Every mutation is appended to a [`Journal`] before it is applied to the
/// in-memory view, and [`open`](Self::open) rebuilds that view by replaying
/// the journal. Reads and scans are served from memory.
pub struct JournalRecordStore {
    journal: Journal,
    state: InMemoryRecordStore,
    /// Serializes check, append, and apply for mutations.
    write_gate: Mutex<()>,
}

impl JournalRecordStore {
    /// Open the store at `path`, replaying any existing journal.
    pub fn open(path: &Path, sync_mode: SyncMode) -> StoreResult<Self> {
        let journal = Journal::open(path, sync_mode)?;
        let state = InMemoryRecordStore::new();

        let ops: Vec<StoreOp> = journal.replay()?;
        let replayed = ops.len();
        for op in ops {
            match op {
                StoreOp::Put {
                    key,
                    version,
                    bytes,
                } => state.restore_put(&key, bytes, version)?,
                StoreOp::Delete { key, version } => state.restore_delete(&key, version)?,
            }
        }

        info!(
            path = %path.display(),
            replayed,
            live = state.len()?,
            "record store opened"
        );
        Ok(Self {
            journal,
            state,
            write_gate: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        self.journal.path()
    }

    fn gate(&self) -> StoreResult<MutexGuard<'_, ()>> {
        self.write_gate.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn commit_put(&self, key: &str, bytes: Vec<u8>) -> StoreResult<Version> {
        let version = self.state.next_version(key)?;
        self.journal.append(&StoreOp::Put {
            key: key.to_string(),
            version,
            bytes: bytes.clone(),
        })?;
        self.state.restore_put(key, bytes, version)?;
        debug!(key, %version, "journaled put");
        Ok(version)
    }
}

impl RecordStore for JournalRecordStore {
    fn exists(&self, key: &str) -> StoreResult<bool> {
        self.state.exists(key)
    }

    fn get(&self, key: &str) -> StoreResult<StoredValue> {
        self.state.get(key)
    }

    fn put(&self, key: &str, bytes: Vec<u8>) -> StoreResult<Version> {
        let _gate = self.gate()?;
        self.commit_put(key, bytes)
    }

    fn put_if(
        &self,
        key: &str,
        bytes: Vec<u8>,
        expected: Option<Version>,
    ) -> StoreResult<Version> {
        let _gate = self.gate()?;
        let actual = self.state.live_version(key)?;
        if actual != expected {
            return Err(StoreError::VersionConflict {
                key: key.to_string(),
                expected,
                actual,
            });
        }
        self.commit_put(key, bytes)
    }

    fn delete(&self, key: &str) -> StoreResult<Version> {
        let _gate = self.gate()?;
        if !self.state.exists(key)? {
            return Err(StoreError::NotFound(key.to_string()));
        }
        let version = self.state.next_version(key)?;
        self.journal.append(&StoreOp::Delete {
            key: key.to_string(),
            version,
        })?;
        self.state.restore_delete(key, version)?;
        debug!(key, %version, "journaled delete");
        Ok(version)
    }

    fn scan_all(&self) -> StoreResult<ScanIter> {
        self.state.scan_all()
    }

    fn version(&self, key: &str) -> StoreResult<Option<Version>> {
        self.state.version(key)
    }

    fn len(&self) -> StoreResult<usize> {
        self.state.len()
    }
}

impl std::fmt::Debug for JournalRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalRecordStore")
            .field("path", &self.journal.path())
            .field("state", &self.state)
            .finish()
    }
}
