//! Hash-keyed record store for hkv.
//!
//! A [`KeyStore`] ties together the append-only record archive, the hash
//! index and the deletion bitmap. Records are located by a 32-bit
//! [`HashKey`](hkv_types::HashKey); the typed façades ([`StringStore`],
//! [`IdentifierStore`]) hash logical keys, pack key and value into one record,
//! and resolve hash collisions by comparing the packed key bytes.
//!
//! # Key Types
//!
//! - [`KeyStore`] -- set/get/delete by hash key, crash recovery, snapshots
//! - [`StringStore`] -- text keys, optionally case-insensitive
//! - [`IdentifierStore`] -- UUID keys
//! - [`StoreConfig`] -- key size, case sensitivity, snapshot interval, sync mode
//!
//! # Recovery
//!
//! The index is only known to be complete up to the record count saved at
//! the last clean shutdown. Opening a store replays every later archive
//! record into the index, so a crash loses no acknowledged writes.

pub mod codec;
pub mod config;
pub mod error;
pub mod facade;
pub mod keystore;
mod snapshot;

pub use config::{KeyKind, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use facade::{IdentifierStore, StringStore};
pub use keystore::{KeyStore, StorageRecords, StorePaths, StoreStats};
