use hkv_types::HashKey;

use crate::murmur::murmur3_32;

/// Projects normalized key bytes onto a [`HashKey`].
///
/// Implementations must be pure: identical bytes always produce the same
/// hash key for the lifetime of a store's files.
pub trait KeyHasher: Send + Sync {
    fn hash_key(&self, key: &[u8]) -> HashKey;
}

/// The default hasher: MurmurHash3 with seed 0.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Murmur3;

impl Murmur3 {
    /// Hash with an explicit seed. Stores always use seed 0; other seeds
    /// exist for the verification routine.
    pub fn hash_with_seed(data: &[u8], seed: u32) -> u32 {
        murmur3_32(data, seed)
    }
}

impl KeyHasher for Murmur3 {
    fn hash_key(&self, key: &[u8]) -> HashKey {
        HashKey::new(murmur3_32(key, 0))
    }
}

impl<H: KeyHasher + ?Sized> KeyHasher for &H {
    fn hash_key(&self, key: &[u8]) -> HashKey {
        (**self).hash_key(key)
    }
}
