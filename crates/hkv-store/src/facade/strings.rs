use std::path::Path;
use std::sync::Arc;

use hkv_hash::{KeyHasher, Murmur3};
use hkv_types::RecordNumber;

use crate::codec;
use crate::config::{KeyKind, StoreConfig};
use crate::error::StoreResult;
use crate::keystore::KeyStore;

use super::KeyedStore;

/// Key store addressed by text keys.
///
/// Keys are lowercased unless the store is case sensitive, then encoded as
/// UTF-16LE before hashing. Values are raw bytes; [`set_str`](Self::set_str)
/// and [`get_str`](Self::get_str) store text as UTF-16LE.
#[derive(Debug)]
pub struct StringStore<H = Murmur3> {
    keyed: KeyedStore<H>,
    case_sensitive: bool,
}

impl StringStore<Murmur3> {
    /// Open (or create) a string-keyed store at `path`.
    pub fn open(path: &Path, config: &StoreConfig) -> StoreResult<Self> {
        Self::open_with_hasher(path, config, Murmur3)
    }
}

impl<H: KeyHasher> StringStore<H> {
    /// Open a store that hashes keys with `hasher`.
    pub fn open_with_hasher(path: &Path, config: &StoreConfig, hasher: H) -> StoreResult<Self> {
        config.validate(KeyKind::String)?;
        let store = KeyStore::open(path, config)?;
        Self::new(Arc::new(store), config, hasher)
    }

    /// Wrap an already open key store.
    pub fn new(store: Arc<KeyStore>, config: &StoreConfig, hasher: H) -> StoreResult<Self> {
        config.validate(KeyKind::String)?;
        Ok(Self {
            keyed: KeyedStore::new(store, hasher, config.key_size_limit()),
            case_sensitive: config.case_sensitive,
        })
    }

    fn key_bytes(&self, key: &str) -> Vec<u8> {
        if self.case_sensitive {
            codec::encode_utf16le(key)
        } else {
            codec::encode_utf16le(&key.to_lowercase())
        }
    }

    /// Store `value` under `key`. Returns the record number written.
    pub fn set(&self, key: &str, value: &[u8]) -> StoreResult<RecordNumber> {
        self.keyed.set(&self.key_bytes(key), value)
    }

    /// Store text under `key`.
    pub fn set_str(&self, key: &str, value: &str) -> StoreResult<RecordNumber> {
        self.set(key, &codec::encode_utf16le(value))
    }

    pub fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.keyed.get(&self.key_bytes(key))
    }

    /// Text stored under `key`.
    pub fn get_str(&self, key: &str) -> StoreResult<Option<String>> {
        self.get(key)?
            .map(|bytes| codec::decode_utf16le(&bytes))
            .transpose()
    }

    /// Remove `key`. Returns whether its hash key had a live record.
    pub fn remove(&self, key: &str) -> StoreResult<bool> {
        self.keyed.remove(&self.key_bytes(key))
    }

    /// The value of the record at `number`, decoded as text.
    pub fn read_value(&self, number: RecordNumber) -> StoreResult<String> {
        let record = self.keyed.store().fetch_record_bytes(number)?;
        let (_, value) = codec::unpack(&record)?;
        codec::decode_utf16le(value)
    }

    /// Approximate number of live keys; see [`KeyStore::count`].
    pub fn count(&self) -> StoreResult<i64> {
        self.keyed.store().count()
    }

    pub fn record_count(&self) -> StoreResult<u32> {
        self.keyed.store().record_count()
    }

    pub fn save_index(&self) -> StoreResult<()> {
        self.keyed.store().save_index()
    }

    pub fn shutdown(&self) -> StoreResult<()> {
        self.keyed.store().shutdown()
    }

    /// The underlying key store.
    pub fn store(&self) -> &Arc<KeyStore> {
        self.keyed.store()
    }
}
