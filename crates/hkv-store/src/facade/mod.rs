//! Typed key façades over a [`KeyStore`].
//!
//! A façade turns a logical key into key bytes, hashes them, and packs key
//! and value into one record (see [`crate::codec`]). Lookups compare the key
//! bytes stored in each record with the requested key, so logical keys that
//! share a hash key never see each other's values.

pub mod identifiers;
pub mod strings;

use std::sync::Arc;

use tracing::debug;

use hkv_hash::KeyHasher;
use hkv_types::RecordNumber;

use crate::codec;
use crate::error::{StoreError, StoreResult};
use crate::keystore::KeyStore;

pub use identifiers::IdentifierStore;
pub use strings::StringStore;

/// Key-byte operations shared by the typed façades.
#[derive(Debug)]
pub(crate) struct KeyedStore<H> {
    store: Arc<KeyStore>,
    hasher: H,
    max_key_size: Option<usize>,
}

impl<H: KeyHasher> KeyedStore<H> {
    pub(crate) fn new(store: Arc<KeyStore>, hasher: H, max_key_size: Option<usize>) -> Self {
        Self {
            store,
            hasher,
            max_key_size,
        }
    }

    pub(crate) fn store(&self) -> &Arc<KeyStore> {
        &self.store
    }

    pub(crate) fn set(&self, key: &[u8], value: &[u8]) -> StoreResult<RecordNumber> {
        self.check_key(key)?;
        self.store
            .set(self.hasher.hash_key(key), &codec::pack(key, value))
    }

    /// Value stored for `key`.
    ///
    /// The head record answers directly when its key matches. Otherwise the
    /// hash key is shared with another logical key, and the duplicate chain
    /// is walked newest-first: the first record for `key` decides, and a
    /// tombstone there means the key was removed.
    ///
    /// Records that are not packed key/value pairs belong to no logical key
    /// and are skipped, as head repair on delete skips them.
    pub(crate) fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.check_key(key)?;
        let hash = self.hasher.hash_key(key);

        let Some(head) = self.store.get(hash)? else {
            return Ok(None);
        };
        if let Ok((head_key, value)) = codec::unpack(&head) {
            if head_key == key {
                return Ok(Some(value.to_vec()));
            }
        }

        for number in self.store.get_duplicates(hash)?.into_iter().rev() {
            let (record, deleted) = self.store.fetch_record(number)?;
            let Ok((candidate, value)) = codec::unpack(&record) else {
                debug!(record = %number, "record is not a packed key/value; skipped");
                continue;
            };
            if candidate == key {
                return Ok((!deleted).then(|| value.to_vec()));
            }
        }
        Ok(None)
    }

    pub(crate) fn remove(&self, key: &[u8]) -> StoreResult<bool> {
        self.check_key(key)?;
        self.store.remove_key(key, &self.hasher)
    }

    fn check_key(&self, key: &[u8]) -> StoreResult<()> {
        match self.max_key_size {
            Some(max) if key.len() > max => Err(StoreError::KeyTooLong {
                actual: key.len(),
                max,
            }),
            _ => Ok(()),
        }
    }
}
