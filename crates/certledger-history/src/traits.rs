use certledger_codec::{ContentDigest, DigestHasher};
use certledger_types::{DocumentView, Record, Timestamp, TxId, Version};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::HistoryResult;

/// One commit as handed to [`HistoryLog::append`].
///
/// `value` holds the encoded record written by the commit, or `None` for a
/// delete (tombstone).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEntry {
    pub tx_id: TxId,
    pub version: Version,
    pub timestamp: Timestamp,
    pub value: Option<Vec<u8>>,
}

impl NewEntry {
    /// Entry for a commit that wrote `bytes`.
    pub fn write(tx_id: TxId, version: Version, timestamp: Timestamp, bytes: Vec<u8>) -> Self {
        Self {
            tx_id,
            version,
            timestamp,
            value: Some(bytes),
        }
    }

    /// Entry for a delete.
    pub fn tombstone(tx_id: TxId, version: Version, timestamp: Timestamp) -> Self {
        Self {
            tx_id,
            version,
            timestamp,
            value: None,
        }
    }

    pub fn is_delete(&self) -> bool {
        self.value.is_none()
    }

    /// Decode the stored bytes into the entry a reader sees.
    ///
    /// Bytes that are not a valid record become [`DocumentView::Raw`] and
    /// are logged; this never fails.
    pub fn to_entry(&self, key: &str) -> HistoryEntry {
        let (value, digest) = match &self.value {
            None => (None, None),
            Some(bytes) => {
                let view = match certledger_codec::decode::<Record>(bytes) {
                    Ok(record) => DocumentView::Document(record),
                    Err(e) => {
                        warn!(
                            key,
                            version = %self.version,
                            error = %e,
                            "undecodable history entry; returning raw value"
                        );
                        DocumentView::Raw(String::from_utf8_lossy(bytes).into_owned())
                    }
                };
                (Some(view), Some(DigestHasher::RECORD.hash(bytes)))
            }
        };
        HistoryEntry {
            tx_id: self.tx_id,
            version: self.version,
            timestamp: self.timestamp,
            is_delete: self.value.is_none(),
            value,
            digest,
        }
    }
}

/// One committed state transition of a key, as returned by
/// [`HistoryLog::history`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub tx_id: TxId,
    pub version: Version,
    pub timestamp: Timestamp,
    pub is_delete: bool,
    /// The record written by the commit; `None` for a tombstone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<DocumentView>,
    /// BLAKE3 digest of the stored bytes, for tamper checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<ContentDigest>,
}

/// Append-only, per-key history of commits.
///
/// All implementations must satisfy these invariants:
/// - `history` returns entries oldest to newest, in append order.
/// - Appended entries are never modified or removed.
/// - `history` of a key that was never appended to is empty, not an error.
/// - Only storage faults make `append` or `history` fail.
pub trait HistoryLog: Send + Sync {
    /// Add `entry` to the tail of `key`'s history.
    fn append(&self, key: &str, entry: &NewEntry) -> HistoryResult<()>;

    /// Every entry for `key`, oldest first.
    fn history(&self, key: &str) -> HistoryResult<Vec<HistoryEntry>>;

    /// Number of entries recorded for `key`.
    fn entry_count(&self, key: &str) -> HistoryResult<usize>;

    /// Every key with at least one entry, sorted.
    fn keys(&self) -> HistoryResult<Vec<String>>;
}

impl<T: HistoryLog + ?Sized> HistoryLog for Box<T> {
    fn append(&self, key: &str, entry: &NewEntry) -> HistoryResult<()> {
        (**self).append(key, entry)
    }

    fn history(&self, key: &str) -> HistoryResult<Vec<HistoryEntry>> {
        (**self).history(key)
    }

    fn entry_count(&self, key: &str) -> HistoryResult<usize> {
        (**self).entry_count(key)
    }

    fn keys(&self) -> HistoryResult<Vec<String>> {
        (**self).keys()
    }
}
