use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use certledger_types::Version;

use crate::error::{StoreError, StoreResult};

/// A live value together with the version that wrote it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredValue {
    pub bytes: Vec<u8>,
    pub version: Version,
}

/// Versioned key/value store.
///
/// All implementations must satisfy these invariants:
/// - `put` and `delete` each advance the key's version by exactly one.
/// - A key's version is never reset, even after `delete`.
/// - `scan_all` yields live entries in lexicographic key order from a
///   single consistent snapshot.
/// - The store never interprets value bytes.
pub trait RecordStore: Send + Sync {
    /// Returns `true` if a live value is stored under `key`.
    fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Read the live value under `key`.
    ///
    /// Returns `Err(StoreError::NotFound)` when the key is absent or deleted.
    fn get(&self, key: &str) -> StoreResult<StoredValue>;

    /// Write `bytes` under `key` unconditionally and return the new version.
    fn put(&self, key: &str, bytes: Vec<u8>) -> StoreResult<Version>;

    /// Write `bytes` only if the live version matches `expected`.
    ///
    /// `expected = None` requires that no live value exists (create);
    /// `Some(v)` requires the live value to be at version `v` (update).
    /// Fails with `StoreError::VersionConflict` otherwise.
    fn put_if(&self, key: &str, bytes: Vec<u8>, expected: Option<Version>)
        -> StoreResult<Version>;

    /// Remove the live value under `key` and return the version of the
    /// removal. Fails with `StoreError::NotFound` if nothing is live.
    fn delete(&self, key: &str) -> StoreResult<Version>;

    /// Iterate every live entry in key order.
    ///
    /// Each call returns a fresh iterator over its own snapshot.
    fn scan_all(&self) -> StoreResult<ScanIter>;

    /// Highest version ever written for `key`, live or deleted.
    fn version(&self, key: &str) -> StoreResult<Option<Version>>;

    /// Number of live entries.
    fn len(&self) -> StoreResult<usize>;

    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Like [`get`](Self::get) but maps `NotFound` to `Ok(None)`.
    fn try_get(&self, key: &str) -> StoreResult<Option<StoredValue>> {
        match self.get(key) {
            Ok(value) => Ok(Some(value)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl<T: RecordStore + ?Sized> RecordStore for Box<T> {
    fn exists(&self, key: &str) -> StoreResult<bool> {
        (**self).exists(key)
    }

    fn get(&self, key: &str) -> StoreResult<StoredValue> {
        (**self).get(key)
    }

    fn put(&self, key: &str, bytes: Vec<u8>) -> StoreResult<Version> {
        (**self).put(key, bytes)
    }

    fn put_if(
        &self,
        key: &str,
        bytes: Vec<u8>,
        expected: Option<Version>,
    ) -> StoreResult<Version> {
        (**self).put_if(key, bytes, expected)
    }

    fn delete(&self, key: &str) -> StoreResult<Version> {
        (**self).delete(key)
    }

    fn scan_all(&self) -> StoreResult<ScanIter> {
        (**self).scan_all()
    }

    fn version(&self, key: &str) -> StoreResult<Option<Version>> {
        (**self).version(key)
    }

    fn len(&self) -> StoreResult<usize> {
        (**self).len()
    }
}

/// Lazy, ordered iterator over one snapshot of the live entries.
///
/// Holds its own reference to the snapshot and a cursor key, so it shares
/// no state with the store or with other iterators.
pub struct ScanIter {
    snapshot: Arc<BTreeMap<String, StoredValue>>,
    cursor: Option<String>,
}

impl ScanIter {
    pub(crate) fn new(snapshot: Arc<BTreeMap<String, StoredValue>>) -> Self {
        Self {
            snapshot,
            cursor: None,
        }
    }
}

impl Iterator for ScanIter {
    type Item = (String, StoredValue);

    fn next(&mut self) -> Option<Self::Item> {
        let next = match &self.cursor {
            None => self.snapshot.iter().next(),
            Some(after) => self
                .snapshot
                .range::<str, _>((Bound::Excluded(after.as_str()), Bound::Unbounded))
                .next(),
        };
        let (key, value) = next?;
        self.cursor = Some(key.clone());
        Some((key.clone(), value.clone()))
    }
}

impl std::fmt::Debug for ScanIter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanIter")
            .field("snapshot_len", &self.snapshot.len())
            .field("cursor", &self.cursor)
            .finish()
    }
}
