//! Foundation types for CertLedger.
//!
//! This crate provides the record, identity, and temporal types shared by
//! every other CertLedger crate.
//!
//! # Key Types
//!
//! - [`Record`] -- One certification document as it is stored
//! - [`DocumentView`] -- A decoded record, or the raw text of one that failed to decode
//! - [`Version`] -- Per-key monotonic commit counter
//! - [`TxId`] -- UUID v7 identifier of a committed mutation
//! - [`Timestamp`] -- Millisecond-precision UTC instant, RFC 3339 on the wire
//! - [`Clock`] -- Injectable time source

pub mod error;
pub mod ids;
pub mod record;
pub mod temporal;

pub use error::TypeError;
pub use ids::{TxId, Version};
pub use record::{DocumentView, Record};
pub use temporal::{Clock, ManualClock, SystemClock, Timestamp};
