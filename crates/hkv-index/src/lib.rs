//! Lookup structures for hkv.
//!
//! # Key Types
//!
//! - [`HashIndex`] -- maps a [`HashKey`](hkv_types::HashKey) to its current
//!   head record and remembers every record ever filed under it (the
//!   duplicate chain)
//! - [`DeletionBitmap`] -- one bit per record number, set for tombstones
//!
//! Both live in memory and are persisted as whole snapshots, written to a
//! temporary file and renamed into place so a crash never leaves a half
//! written snapshot behind.

pub mod bitmap;
pub mod error;
pub mod index;
mod persist;

pub use bitmap::DeletionBitmap;
pub use error::{IndexError, IndexResult};
pub use index::{Bucket, HashIndex};
