//! Foundation types for hkv.
//!
//! Every other hkv crate depends on `hkv-types` for the two identifiers that
//! flow between the archive, the index and the key store.
//!
//! # Key Types
//!
//! - [`HashKey`] -- 32-bit digest of a logical key, used only for index placement
//! - [`RecordNumber`] -- 0-based, monotonically increasing archive position

pub mod error;
pub mod hash_key;
pub mod record;

pub use error::TypeError;
pub use hash_key::HashKey;
pub use record::RecordNumber;
