//! Append-only, per-key audit history for CertLedger.
//!
//! Every committed mutation of a document appends one entry: the new
//! record bytes, or a tombstone for a delete. Entries are never rewritten,
//! compacted, or truncated.
//!
//! Reading history never fails on a bad entry. Bytes that do not decode
//! into a [`Record`](certledger_types::Record) are surfaced as
//! [`DocumentView::Raw`](certledger_types::DocumentView::Raw) so one
//! corrupt entry cannot hide the rest of the trail.

pub mod error;
pub mod journaled;
pub mod memory;
pub mod traits;

pub use error::{HistoryError, HistoryResult};
pub use journaled::JournalHistoryLog;
pub use memory::InMemoryHistoryLog;
pub use traits::{HistoryEntry, HistoryLog, NewEntry};
