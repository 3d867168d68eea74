use std::path::Path;
use std::sync::Arc;

use uuid::Uuid;

use hkv_archive::Archive;
use hkv_hash::{KeyHasher, Murmur3};
use hkv_types::RecordNumber;

use crate::codec;
use crate::config::{KeyKind, StoreConfig, IDENTIFIER_KEY_SIZE};
use crate::error::{StoreError, StoreResult};
use crate::keystore::KeyStore;

use super::KeyedStore;

/// Key store addressed by 128-bit identifiers.
///
/// Identifiers are stored in the mixed-endian byte order of
/// [`Uuid::to_bytes_le`], the layout existing archives use.
#[derive(Debug)]
pub struct IdentifierStore<H = Murmur3> {
    keyed: KeyedStore<H>,
}

impl IdentifierStore<Murmur3> {
    /// Open (or create) an identifier-keyed store at `path`.
    pub fn open(path: &Path, config: &StoreConfig) -> StoreResult<Self> {
        Self::open_with_hasher(path, config, Murmur3)
    }
}

impl<H: KeyHasher> IdentifierStore<H> {
    pub fn open_with_hasher(path: &Path, config: &StoreConfig, hasher: H) -> StoreResult<Self> {
        config.validate(KeyKind::Identifier)?;
        let store = KeyStore::open(path, config)?;
        Self::new(Arc::new(store), config, hasher)
    }

    /// Wrap an already open key store.
    pub fn new(store: Arc<KeyStore>, config: &StoreConfig, hasher: H) -> StoreResult<Self> {
        config.validate(KeyKind::Identifier)?;
        Ok(Self {
            keyed: KeyedStore::new(store, hasher, config.key_size_limit()),
        })
    }

    pub fn set(&self, id: Uuid, value: &[u8]) -> StoreResult<RecordNumber> {
        self.keyed.set(&id.to_bytes_le(), value)
    }

    /// Store text as UTF-16LE.
    pub fn set_str(&self, id: Uuid, value: &str) -> StoreResult<RecordNumber> {
        self.set(id, &codec::encode_utf16le(value))
    }

    pub fn get(&self, id: Uuid) -> StoreResult<Option<Vec<u8>>> {
        self.keyed.get(&id.to_bytes_le())
    }

    pub fn get_str(&self, id: Uuid) -> StoreResult<Option<String>> {
        self.get(id)?
            .map(|bytes| codec::decode_utf16le(&bytes))
            .transpose()
    }

    /// Remove `id`. Returns whether its hash key had a live record.
    pub fn remove(&self, id: Uuid) -> StoreResult<bool> {
        self.keyed.remove(&id.to_bytes_le())
    }

    /// Value, identifier and deletion flag of the record at `number`.
    ///
    /// Returns `None` for a record with an empty payload.
    pub fn get_by_record_number(
        &self,
        number: RecordNumber,
    ) -> StoreResult<Option<(Vec<u8>, Uuid, bool)>> {
        let (record, deleted) = self.keyed.store().fetch_record(number)?;
        if record.is_empty() {
            return Ok(None);
        }
        let (key, value) = codec::unpack(&record)?;
        let bytes: [u8; IDENTIFIER_KEY_SIZE] = key
            .try_into()
            .map_err(|_| StoreError::InvalidIdentifier(key.len()))?;
        Ok(Some((value.to_vec(), Uuid::from_bytes_le(bytes), deleted)))
    }

    /// Raw packed record at `number`.
    pub fn fetch_record_bytes(&self, number: RecordNumber) -> StoreResult<Vec<u8>> {
        self.keyed.store().fetch_record_bytes(number)
    }

    /// Append copies of records `[start, count)` to `target`.
    pub fn copy_to(&self, target: &Archive, start: RecordNumber) -> StoreResult<u32> {
        self.keyed.store().copy_to(target, start)
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

    pub fn store(&self) -> &Arc<KeyStore> {
        self.keyed.store()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hkv_archive::ArchiveConfig;
    use hkv_types::HashKey;

    struct FixedHash;

    impl KeyHasher for FixedHash {
        fn hash_key(&self, _key: &[u8]) -> HashKey {
            HashKey::new(7)
        }
    }

    fn open(dir: &Path) -> IdentifierStore {
        IdentifierStore::open(&dir.join("ids"), &StoreConfig::default()).unwrap()
    }

    #[test]
    fn set_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        let id = Uuid::now_v7();

        store.set(id, b"payload").unwrap();
        assert_eq!(store.get(id).unwrap(), Some(b"payload".to_vec()));
        assert_eq!(store.get(Uuid::now_v7()).unwrap(), None);

        assert!(store.remove(id).unwrap());
        assert_eq!(store.get(id).unwrap(), None);
    }

    #[test]
    fn key_bytes_use_mixed_endian_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        let id = Uuid::parse_str("00112233-4455-6677-8899-aabbccddeeff").unwrap();

        let number = store.set(id, b"v").unwrap();
        let record = store.fetch_record_bytes(number).unwrap();
        assert_eq!(&record[..4], &16u32.to_le_bytes());
        assert_eq!(
            &record[4..20],
            &[
                0x33, 0x22, 0x11, 0x00, 0x55, 0x44, 0x77, 0x66, 0x88, 0x99, 0xaa, 0xbb, 0xcc,
                0xdd, 0xee, 0xff
            ]
        );
        assert_eq!(&record[20..], b"v");
    }

    #[test]
    fn get_by_record_number_returns_identifier() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        let id = Uuid::now_v7();

        let number = store.set_str(id, "text").unwrap();
        store.remove(id).unwrap();

        let (value, found, deleted) = store.get_by_record_number(number).unwrap().unwrap();
        assert_eq!(found, id);
        assert!(!deleted);
        assert_eq!(codec::decode_utf16le(&value).unwrap(), "text");

        let (value, found, deleted) = store
            .get_by_record_number(RecordNumber::new(1))
            .unwrap()
            .unwrap();
        assert_eq!(found, id);
        assert!(deleted);
        assert!(value.is_empty());
    }

    #[test]
    fn empty_payload_has_no_identifier() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        store.store().set(HashKey::new(1), &[]).unwrap();
        assert_eq!(store.get_by_record_number(RecordNumber::ZERO).unwrap(), None);
    }

    #[test]
    fn text_values() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        let id = Uuid::now_v7();
        store.set_str(id, "名前").unwrap();
        assert_eq!(store.get_str(id).unwrap().as_deref(), Some("名前"));
    }

    #[test]
    fn colliding_identifiers() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            IdentifierStore::open_with_hasher(&dir.path().join("ids"), &StoreConfig::default(), FixedHash)
                .unwrap();
        let ids: Vec<Uuid> = (0..5).map(|_| Uuid::now_v7()).collect();

        for (i, id) in ids.iter().enumerate() {
            store.set(*id, &[i as u8]).unwrap();
        }
        store.remove(ids[4]).unwrap();
        store.remove(ids[1]).unwrap();

        assert_eq!(store.get(ids[0]).unwrap(), Some(vec![0]));
        assert_eq!(store.get(ids[1]).unwrap(), None);
        assert_eq!(store.get(ids[2]).unwrap(), Some(vec![2]));
        assert_eq!(store.get(ids[3]).unwrap(), Some(vec![3]));
        assert_eq!(store.get(ids[4]).unwrap(), None);
    }

    #[test]
    fn small_key_size_is_rejected_at_open() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            max_key_size: Some(15),
            ..Default::default()
        };
        let err = IdentifierStore::open(&dir.path().join("ids"), &config).unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfig(_)));
    }

    #[test]
    fn backup_copies_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        for _ in 0..3 {
            store.set(Uuid::now_v7(), b"x").unwrap();
        }
        let target =
            Archive::open(&dir.path().join("backup.hkvdat"), ArchiveConfig::default()).unwrap();
        assert_eq!(store.copy_to(&target, RecordNumber::ZERO).unwrap(), 3);
        assert_eq!(target.read(RecordNumber::ZERO).unwrap(), store.fetch_record_bytes(RecordNumber::ZERO).unwrap());
    }
}
