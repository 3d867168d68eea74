//! Deterministic key hashing for hkv.
//!
//! Logical keys are projected onto a 32-bit [`HashKey`](hkv_types::HashKey)
//! with MurmurHash3 (x86, 32-bit variant). Blocks are always read
//! little-endian, so the same bytes hash to the same value on every platform
//! and existing archives keep their index placement.
//!
//! The [`KeyHasher`] trait is the seam the key store hashes through; tests
//! substitute their own hasher to force collisions.

pub mod hasher;
pub mod murmur;

pub use hasher::{KeyHasher, Murmur3};
pub use murmur::{murmur3_32, verification_test, verification_value, VERIFICATION_VALUE};
