use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Fixed-width projection of a logical key.
///
/// A `HashKey` is the 32-bit hash of a normalized key's bytes. It decides
/// where a record is placed in the index and nothing else: distinct logical
/// keys may share a `HashKey`, so callers always confirm a match against the
/// original key bytes packed into the record.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HashKey(u32);

impl HashKey {
    /// Smallest hash key; enumeration from here visits the whole index.
    pub const MIN: Self = Self(0);

    /// Largest hash key.
    pub const MAX: Self = Self(u32::MAX);

    /// Wrap a raw 32-bit hash value.
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// The raw 32-bit value.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Big-endian bytes, so hex output sorts the same way as the key.
    pub fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Hex-encoded string representation (8 characters).
    pub fn to_hex(self) -> String {
        hex::encode(self.to_be_bytes())
    }

    /// Parse from an 8-character hex string, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let arr: [u8; 4] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| TypeError::InvalidLength {
                expected: 4,
                actual: bytes.len(),
            })?;
        Ok(Self(u32::from_be_bytes(arr)))
    }
}

impl fmt::Debug for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashKey({})", self.to_hex())
    }
}

impl fmt::Display for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl From<u32> for HashKey {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<HashKey> for u32 {
    fn from(key: HashKey) -> Self {
        key.0
    }
}
