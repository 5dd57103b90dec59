use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use certledger_types::Version;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::{RecordStore, ScanIter, StoredValue};

/// In-memory, `BTreeMap`-based record store.
///
/// Live entries sit in an `Arc<BTreeMap>` that writers update with
/// copy-on-write: an open [`ScanIter`] keeps the old map alive, and the next
/// writer clones it instead of mutating under the reader. With no open
/// scans, writes update the map in place.
pub struct InMemoryRecordStore {
    state: RwLock<StoreState>,
}

#[derive(Default)]
struct StoreState {
    live: Arc<BTreeMap<String, StoredValue>>,
    /// High-water version per key; survives deletes.
    versions: HashMap<String, Version>,
}

impl StoreState {
    fn next_version(&self, key: &str) -> Version {
        self.versions
            .get(key)
            .copied()
            .unwrap_or(Version::ZERO)
            .next()
    }

    fn apply_put(&mut self, key: &str, bytes: Vec<u8>, version: Version) {
        Arc::make_mut(&mut self.live).insert(key.to_string(), StoredValue { bytes, version });
        self.versions.insert(key.to_string(), version);
    }

    fn apply_delete(&mut self, key: &str, version: Version) -> bool {
        let removed = Arc::make_mut(&mut self.live).remove(key).is_some();
        self.versions.insert(key.to_string(), version);
        removed
    }
}

impl InMemoryRecordStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Remove every entry and forget all versions.
    pub fn clear(&self) -> StoreResult<()> {
        *self.write()? = StoreState::default();
        Ok(())
    }

    /// All live keys in order.
    pub fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.read()?.live.keys().cloned().collect())
    }

    /// Re-apply a put at an explicit version. Used by journal replay and by
    /// the journal-backed store after the op is durable.
    pub(crate) fn restore_put(&self, key: &str, bytes: Vec<u8>, version: Version) -> StoreResult<()> {
        self.write()?.apply_put(key, bytes, version);
        Ok(())
    }

    pub(crate) fn restore_delete(&self, key: &str, version: Version) -> StoreResult<()> {
        self.write()?.apply_delete(key, version);
        Ok(())
    }

    /// Live version under `key`, `None` if nothing is live.
    pub(crate) fn live_version(&self, key: &str) -> StoreResult<Option<Version>> {
        Ok(self.read()?.live.get(key).map(|v| v.version))
    }

    pub(crate) fn next_version(&self, key: &str) -> StoreResult<Version> {
        Ok(self.read()?.next_version(key))
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, StoreState>> {
        self.state.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, StoreState>> {
        self.state.write().map_err(|_| StoreError::LockPoisoned)
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.read()?.live.contains_key(key))
    }

    fn get(&self, key: &str) -> StoreResult<StoredValue> {
        self.read()?
            .live
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn put(&self, key: &str, bytes: Vec<u8>) -> StoreResult<Version> {
        let mut state = self.write()?;
        let version = state.next_version(key);
        state.apply_put(key, bytes, version);
        debug!(key, %version, "store put");
        Ok(version)
    }

    fn put_if(
        &self,
        key: &str,
        bytes: Vec<u8>,
        expected: Option<Version>,
    ) -> StoreResult<Version> {
        let mut state = self.write()?;
        let actual = state.live.get(key).map(|v| v.version);
        if actual != expected {
            return Err(StoreError::VersionConflict {
                key: key.to_string(),
                expected,
                actual,
            });
        }
        let version = state.next_version(key);
        state.apply_put(key, bytes, version);
        debug!(key, %version, "store conditional put");
        Ok(version)
    }

    fn delete(&self, key: &str) -> StoreResult<Version> {
        let mut state = self.write()?;
        if !state.live.contains_key(key) {
            return Err(StoreError::NotFound(key.to_string()));
        }
        let version = state.next_version(key);
        state.apply_delete(key, version);
        debug!(key, %version, "store delete");
        Ok(version)
    }

    fn scan_all(&self) -> StoreResult<ScanIter> {
        Ok(ScanIter::new(Arc::clone(&self.read()?.live)))
    }

    fn version(&self, key: &str) -> StoreResult<Option<Version>> {
        Ok(self.read()?.versions.get(key).copied())
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.read()?.live.len())
    }
}

impl std::fmt::Debug for InMemoryRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len().unwrap_or(0);
        f.debug_struct("InMemoryRecordStore")
            .field("live_count", &count)
            .finish()
    }
}
