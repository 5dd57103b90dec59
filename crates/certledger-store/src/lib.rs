//! Versioned key/value record store for CertLedger.
//!
//! The store maps a string key to the latest value bytes plus a per-key
//! [`Version`](certledger_types::Version). It never interprets the bytes;
//! encoding belongs to the caller.
//!
//! # Backends
//!
//! All backends implement the [`RecordStore`] trait:
//!
//! - [`InMemoryRecordStore`] -- copy-on-write `BTreeMap` for tests and embedding
//! - [`JournalRecordStore`] -- in-memory state rebuilt from an append-only journal file
//!
//! # Design Rules
//!
//! 1. Versions only move forward, including across delete and re-create.
//! 2. Scans read one snapshot and yield keys in lexicographic order.
//! 3. A scan never blocks writers and never observes writes made after it began.
//! 4. Journal-backed writes reach the journal before they become visible.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod journal;
pub mod journaled;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use journal::{Journal, JournalError, SyncMode};
pub use journaled::JournalRecordStore;
pub use memory::InMemoryRecordStore;
pub use traits::{RecordStore, ScanIter, StoredValue};
