//! The hash index: hash key → head record plus duplicate chain.
//!
//! The index never sees logical keys. Several logical keys may share one
//! [`HashKey`]; the index only remembers which records were filed under it,
//! and the key store decides between them by comparing the key bytes packed
//! into each record.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use hkv_types::{HashKey, RecordNumber};

use crate::error::{IndexError, IndexResult};
use crate::persist;

const MAGIC: &[u8; 4] = b"HKVI";
const FORMAT_VERSION: u32 = 1;

/// Everything the index knows about one hash key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    /// Current authoritative record, if any logical key in the bucket is live.
    pub head: Option<RecordNumber>,
    /// Every record ever filed under the hash key, ascending, no repeats.
    pub chain: Vec<RecordNumber>,
}

impl Bucket {
    /// Insert into the chain, keeping it sorted. Returns `false` if present.
    fn record(&mut self, number: RecordNumber) -> bool {
        match self.chain.last() {
            Some(last) if *last < number => {
                self.chain.push(number);
                true
            }
            None => {
                self.chain.push(number);
                true
            }
            Some(_) => match self.chain.binary_search(&number) {
                Ok(_) => false,
                Err(pos) => {
                    self.chain.insert(pos, number);
                    true
                }
            },
        }
    }
}

#[derive(Serialize, Deserialize)]
struct IndexSnapshot {
    version: u32,
    last_indexed: u32,
    buckets: Vec<(HashKey, Bucket)>,
}

/// In-memory hash index persisted as a whole-file snapshot.
pub struct HashIndex {
    path: PathBuf,
    buckets: BTreeMap<HashKey, Bucket>,
    /// Archive record count covered by the last clean shutdown.
    last_indexed: u32,
}

impl std::fmt::Debug for HashIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashIndex")
            .field("path", &self.path)
            .field("buckets", &self.buckets.len())
            .field("last_indexed", &self.last_indexed)
            .finish()
    }
}

impl HashIndex {
    /// Load the index snapshot at `path`, or start empty if there is none.
    ///
    /// A snapshot that fails validation is discarded: the index starts empty
    /// with a last indexed record number of 0, so the caller's recovery pass
    /// rebuilds it from the archive.
    pub fn open(path: &Path) -> IndexResult<Self> {
        let mut index = Self {
            path: path.to_path_buf(),
            buckets: BTreeMap::new(),
            last_indexed: 0,
        };

        let body = match persist::read_snapshot(path, MAGIC) {
            Ok(Some(body)) => body,
            Ok(None) => return Ok(index),
            Err(IndexError::Corrupt { reason, .. }) => {
                warn!(path = %path.display(), %reason, "discarding index snapshot");
                return Ok(index);
            }
            Err(e) => return Err(e),
        };

        match bincode::deserialize::<IndexSnapshot>(&body) {
            Ok(snapshot) if snapshot.version == FORMAT_VERSION => {
                index.last_indexed = snapshot.last_indexed;
                index.buckets = snapshot.buckets.into_iter().collect();
            }
            Ok(snapshot) => {
                warn!(
                    path = %path.display(),
                    version = snapshot.version,
                    "unknown index snapshot version; discarding"
                );
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "undecodable index snapshot; discarding");
            }
        }

        debug!(
            path = %path.display(),
            buckets = index.buckets.len(),
            last_indexed = index.last_indexed,
            "index loaded"
        );
        Ok(index)
    }

    /// Head record for `key`.
    pub fn get(&self, key: HashKey) -> Option<RecordNumber> {
        self.buckets.get(&key).and_then(|b| b.head)
    }

    /// Make `number` the head of `key` and add it to the duplicate chain.
    pub fn set(&mut self, key: HashKey, number: RecordNumber) {
        let bucket = self.buckets.entry(key).or_default();
        bucket.head = Some(number);
        bucket.record(number);
    }

    /// Add `number` to the duplicate chain without touching the head.
    pub fn add_duplicate(&mut self, key: HashKey, number: RecordNumber) {
        self.buckets.entry(key).or_default().record(number);
    }

    /// Clear the head of `key`. Returns `true` if there was one.
    ///
    /// The duplicate chain is kept: other logical keys sharing the hash key
    /// still need it to be found.
    pub fn remove(&mut self, key: HashKey) -> bool {
        self.buckets
            .get_mut(&key)
            .and_then(|b| b.head.take())
            .is_some()
    }

    /// Every record ever filed under `key`, oldest first.
    pub fn get_duplicates(&self, key: HashKey) -> Vec<RecordNumber> {
        self.buckets
            .get(&key)
            .map(|b| b.chain.clone())
            .unwrap_or_default()
    }

    /// The full bucket for `key`.
    pub fn bucket(&self, key: HashKey) -> Option<&Bucket> {
        self.buckets.get(&key)
    }

    /// All buckets in hash key order.
    pub fn buckets(&self) -> &BTreeMap<HashKey, Bucket> {
        &self.buckets
    }

    /// Heads in ascending hash key order, starting at `from`.
    ///
    /// Hash keys compare as unsigned 32-bit values, so `0x8000_0000` and
    /// above come after `0x7FFF_FFFF`, not before zero.
    pub fn enumerate_from(
        &self,
        from: HashKey,
    ) -> impl Iterator<Item = (HashKey, RecordNumber)> + '_ {
        self.buckets
            .range(from..)
            .filter_map(|(key, bucket)| bucket.head.map(|head| (*key, head)))
    }

    /// Number of hash keys that currently have a head.
    pub fn len(&self) -> usize {
        self.buckets.values().filter(|b| b.head.is_some()).count()
    }

    /// Returns `true` if no hash key has a head.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every bucket and reset the last indexed record number.
    pub fn clear(&mut self) {
        self.buckets.clear();
        self.last_indexed = 0;
    }

    /// Archive record count the index was last known to cover.
    pub fn last_indexed_record_number(&self) -> u32 {
        self.last_indexed
    }

    /// Record and persist the archive count covered by this index.
    pub fn save_last_indexed_record_number(&mut self, count: u32) -> IndexResult<()> {
        self.last_indexed = count;
        self.save()
    }

    /// Persist the current state.
    pub fn save(&self) -> IndexResult<()> {
        let snapshot = IndexSnapshot {
            version: FORMAT_VERSION,
            last_indexed: self.last_indexed,
            buckets: self
                .buckets
                .iter()
                .map(|(key, bucket)| (*key, bucket.clone()))
                .collect(),
        };
        let body =
            bincode::serialize(&snapshot).map_err(|e| IndexError::Serialization(e.to_string()))?;
        persist::write_snapshot(&self.path, MAGIC, &body)?;
        debug!(path = %self.path.display(), buckets = self.buckets.len(), "index saved");
        Ok(())
    }

    /// Record the archive count this index covers, persist and release.
    pub fn shutdown(mut self, last_indexed: u32) -> IndexResult<()> {
        self.save_last_indexed_record_number(last_indexed)
    }

    /// Path of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rn(n: u32) -> RecordNumber {
        RecordNumber::new(n)
    }

    fn empty() -> (tempfile::TempDir, HashIndex) {
        let dir = tempfile::tempdir().unwrap();
        let index = HashIndex::open(&dir.path().join("t.hkvidx")).unwrap();
        (dir, index)
    }

    #[test]
    fn set_overwrites_head_and_grows_chain() {
        let (_dir, mut index) = empty();
        let key = HashKey::new(9);

        index.set(key, rn(0));
        index.set(key, rn(3));

        assert_eq!(index.get(key), Some(rn(3)));
        assert_eq!(index.get_duplicates(key), vec![rn(0), rn(3)]);
    }

    #[test]
    fn set_is_idempotent_on_chain() {
        let (_dir, mut index) = empty();
        let key = HashKey::new(9);

        index.set(key, rn(1));
        index.set(key, rn(4));
        index.set(key, rn(1));
        index.set(key, rn(4));

        assert_eq!(index.get_duplicates(key), vec![rn(1), rn(4)]);
        assert_eq!(index.get(key), Some(rn(4)));
    }

    #[test]
    fn out_of_order_insert_keeps_chain_sorted() {
        let (_dir, mut index) = empty();
        let key = HashKey::new(1);
        index.add_duplicate(key, rn(5));
        index.add_duplicate(key, rn(2));
        index.add_duplicate(key, rn(8));
        assert_eq!(index.get_duplicates(key), vec![rn(2), rn(5), rn(8)]);
        assert_eq!(index.get(key), None);
    }

    #[test]
    fn remove_clears_head_keeps_chain() {
        let (_dir, mut index) = empty();
        let key = HashKey::new(2);
        index.set(key, rn(0));

        assert!(index.remove(key));
        assert!(!index.remove(key));
        assert_eq!(index.get(key), None);
        assert_eq!(index.get_duplicates(key), vec![rn(0)]);
    }

    #[test]
    fn remove_unknown_key_is_false() {
        let (_dir, mut index) = empty();
        assert!(!index.remove(HashKey::new(77)));
        assert!(index.get_duplicates(HashKey::new(77)).is_empty());
    }

    #[test]
    fn enumerate_from_skips_headless_buckets() {
        let (_dir, mut index) = empty();
        index.set(HashKey::new(10), rn(0));
        index.set(HashKey::new(20), rn(1));
        index.set(HashKey::new(30), rn(2));
        index.remove(HashKey::new(20));

        let all: Vec<_> = index.enumerate_from(HashKey::MIN).collect();
        assert_eq!(
            all,
            vec![(HashKey::new(10), rn(0)), (HashKey::new(30), rn(2))]
        );

        let tail: Vec<_> = index.enumerate_from(HashKey::new(11)).collect();
        assert_eq!(tail, vec![(HashKey::new(30), rn(2))]);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn enumerate_from_uses_unsigned_order() {
        let (_dir, mut index) = empty();
        index.set(HashKey::new(0x8000_0000), rn(0));
        index.set(HashKey::new(0x7FFF_FFFF), rn(1));
        index.set(HashKey::new(u32::MAX), rn(2));
        index.set(HashKey::new(1), rn(3));

        let keys: Vec<u32> = index
            .enumerate_from(HashKey::MIN)
            .map(|(key, _)| key.get())
            .collect();
        assert_eq!(keys, vec![1, 0x7FFF_FFFF, 0x8000_0000, u32::MAX]);

        let upper: Vec<u32> = index
            .enumerate_from(HashKey::new(0x8000_0000))
            .map(|(key, _)| key.get())
            .collect();
        assert_eq!(upper, vec![0x8000_0000, u32::MAX]);
    }

    #[test]
    fn save_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.hkvidx");
        {
            let mut index = HashIndex::open(&path).unwrap();
            index.set(HashKey::new(1), rn(0));
            index.set(HashKey::new(1), rn(2));
            index.set(HashKey::new(5), rn(1));
            index.remove(HashKey::new(5));
            index.shutdown(3).unwrap();
        }

        let index = HashIndex::open(&path).unwrap();
        assert_eq!(index.last_indexed_record_number(), 3);
        assert_eq!(index.get(HashKey::new(1)), Some(rn(2)));
        assert_eq!(index.get(HashKey::new(5)), None);
        assert_eq!(index.get_duplicates(HashKey::new(5)), vec![rn(1)]);
    }

    #[test]
    fn plain_save_keeps_last_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.hkvidx");
        {
            let mut index = HashIndex::open(&path).unwrap();
            index.save_last_indexed_record_number(4).unwrap();
            index.set(HashKey::new(1), rn(4));
            index.save().unwrap();
        }
        let index = HashIndex::open(&path).unwrap();
        assert_eq!(index.last_indexed_record_number(), 4);
        assert_eq!(index.get(HashKey::new(1)), Some(rn(4)));
    }

    #[test]
    fn clear_resets_everything() {
        let (_dir, mut index) = empty();
        index.set(HashKey::new(1), rn(0));
        index.save_last_indexed_record_number(1).unwrap();
        index.clear();
        assert!(index.buckets().is_empty());
        assert_eq!(index.last_indexed_record_number(), 0);
    }

    #[test]
    fn corrupt_snapshot_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.hkvidx");
        {
            let mut index = HashIndex::open(&path).unwrap();
            index.set(HashKey::new(1), rn(0));
            index.save_last_indexed_record_number(1).unwrap();
        }
        std::fs::write(&path, b"HKVI garbage").unwrap();

        let index = HashIndex::open(&path).unwrap();
        assert_eq!(index.last_indexed_record_number(), 0);
        assert!(index.is_empty());
    }
}
