//! Document registry for CertLedger.
//!
//! [`Registry`] composes a [`RecordStore`](certledger_store::RecordStore)
//! and a [`HistoryLog`](certledger_history::HistoryLog) into the document
//! lifecycle: issue, read, update, delete, list, and per-document history.
//!
//! # Rules
//!
//! 1. Issue fails on a live id; update and delete fail on an absent one.
//! 2. Only the stored `owner` may update a document; `id` and `owner` never change.
//! 3. Every successful mutation appends exactly one history entry.
//! 4. Mutations on one id are serialized; reads never take a registry lock.
//! 5. `updatedAt` strictly increases across the commits of one record.
//!
//! [`Dispatcher`] exposes the registry as named transactions with
//! positional string arguments, and [`config`] builds a registry from a
//! TOML file.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod locks;
pub mod registry;

pub use config::{open_registry, ConfigError, DynRegistry, RegistryConfig, StorageBackend};
pub use dispatch::{Dispatcher, Transaction};
pub use error::{RegistryError, RegistryResult};
pub use locks::KeyLocks;
pub use registry::{fixtures, DocumentPatch, NewDocument, Registry, SeedReport};
