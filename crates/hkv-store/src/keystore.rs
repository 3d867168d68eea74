//! The key store: archive, hash index and deletion bitmap behind one handle.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard};

use serde::Serialize;
use tracing::{debug, info, warn};

use hkv_archive::{Archive, StoredRecord};
use hkv_hash::KeyHasher;
use hkv_index::{DeletionBitmap, HashIndex};
use hkv_types::{HashKey, RecordNumber};

use crate::codec;
use crate::config::{KeyKind, StoreConfig};
use crate::error::{StoreError, StoreResult};
use crate::snapshot::SnapshotWorker;

/// Records between recovery progress messages.
const PROGRESS_INTERVAL: u32 = 100_000;

/// On-disk files that make up one store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorePaths {
    /// Base name shared by the three files.
    pub name: String,
    /// `<name>.hkvdat`: the record archive.
    pub data: PathBuf,
    /// `<name>.hkvidx`: the hash index snapshot.
    pub index: PathBuf,
    /// `<name>_deleted.hkvbmp`: the deletion bitmap.
    pub deleted: PathBuf,
}

impl StorePaths {
    /// Derive the store files from `path`.
    ///
    /// Any extension on `path` is ignored, so `db/users`, `db/users.hkvdat`
    /// and `db/users.idx` all name the same store.
    pub fn new(path: &Path) -> Self {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "hkv".to_string());

        Self {
            data: dir.join(format!("{name}.hkvdat")),
            index: dir.join(format!("{name}.hkvidx")),
            deleted: dir.join(format!("{name}_deleted.hkvbmp")),
            name,
        }
    }
}

/// Counters describing a store, as reported by [`KeyStore::stats`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Archive records, tombstones included.
    pub records: u32,
    /// Records marked in the deletion bitmap.
    pub tombstones: u64,
    /// Approximate live key count, see [`KeyStore::count`].
    pub approximate_count: i64,
    /// Hash keys with a live head.
    pub live_hash_keys: usize,
    /// Hash keys ever written.
    pub hash_keys: usize,
    /// Hash keys whose chain holds more than one record.
    pub chained_hash_keys: usize,
    /// Archive count covered by the last clean shutdown.
    pub last_indexed: u32,
}

struct Handles {
    archive: Archive,
    index: HashIndex,
    deleted: DeletionBitmap,
}

impl Handles {
    /// Bring the index up to date with records appended after the last
    /// clean shutdown. Returns the number of records replayed.
    fn check_index_state(&mut self) -> StoreResult<u32> {
        let count = self.archive.count();
        let mut last = self.index.last_indexed_record_number();

        if last > count {
            warn!(
                last_indexed = last,
                records = count,
                "index covers more records than the archive holds; rebuilding"
            );
            self.index.clear();
            self.deleted.clear();
            last = 0;
        }
        if last > 0 && !self.deleted.restored() {
            warn!(
                records = last,
                "deletion bitmap missing or discarded; rebuilding from archive"
            );
            self.rebuild_deleted(RecordNumber::new(last))?;
        }
        if last == count {
            return Ok(0);
        }

        info!(from = last, to = count, "replaying unindexed records");
        for number in RecordNumber::new(last).range_to(RecordNumber::new(count)) {
            let (hash, tombstone) = self.archive.get_key_at(number)?;
            if tombstone {
                self.deleted.set(true, number);
                self.apply_tombstone(hash, number)?;
            } else {
                self.index.set(hash, number);
            }
            if number.get() > 0 && number.get() % PROGRESS_INTERVAL == 0 {
                info!(record = number.get(), total = count, "recovery progress");
            }
        }
        info!(replayed = count - last, "recovery complete");
        Ok(count - last)
    }

    /// Set the bit of every tombstone in `[0, end)` from the archive flags.
    fn rebuild_deleted(&mut self, end: RecordNumber) -> StoreResult<()> {
        for number in RecordNumber::ZERO.range_to(end) {
            let (_, tombstone) = self.archive.get_key_at(number)?;
            if tombstone {
                self.deleted.set(true, number);
            }
        }
        Ok(())
    }

    /// File the tombstone `number` under `hash`, clear the head and pick a
    /// new one. Returns whether a head existed.
    fn apply_tombstone(&mut self, hash: HashKey, number: RecordNumber) -> StoreResult<bool> {
        self.index.add_duplicate(hash, number);
        let had_head = self.index.remove(hash);
        self.repair_head(hash)?;
        Ok(had_head)
    }

    /// Make the newest live record of any logical key under `hash` the head.
    ///
    /// Walks the chain newest-first. The first record seen for a logical
    /// key is that key's current state, so a key whose newest record is a
    /// tombstone is skipped along with all its older records.
    fn repair_head(&mut self, hash: HashKey) -> StoreResult<()> {
        let chain = self.index.get_duplicates(hash);
        let mut seen: HashSet<Vec<u8>> = HashSet::new();

        for number in chain.into_iter().rev() {
            let (data, tombstone) = self.archive.read_with_deleted(number)?;
            let Ok((key, _)) = codec::unpack(&data) else {
                debug!(record = %number, "record is not a packed key/value; skipped");
                continue;
            };
            if !seen.insert(key.to_vec()) {
                continue;
            }
            if !tombstone && !self.deleted.get(number) {
                self.index.set(hash, number);
                debug!(hash = %hash, head = %number, "head repaired");
                return Ok(());
            }
        }
        Ok(())
    }

    fn is_deleted(&self, number: RecordNumber, tombstone: bool) -> bool {
        tombstone || self.deleted.get(number)
    }

    fn save(&self) -> StoreResult<()> {
        self.index.save()?;
        self.deleted.save()?;
        Ok(())
    }
}

/// State shared between the store handle and its snapshot worker.
struct Shared {
    handles: RwLock<Option<Handles>>,
    /// Serializes index snapshots.
    save_lock: Mutex<()>,
}

impl Shared {
    fn save_index(&self) -> StoreResult<()> {
        let _save = self
            .save_lock
            .lock()
            .map_err(|_| StoreError::LockPoisoned("save"))?;
        let guard = self
            .handles
            .read()
            .map_err(|_| StoreError::LockPoisoned("handles"))?;
        match guard.as_ref() {
            Some(handles) => {
                handles.save()?;
                debug!("index snapshot saved");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

/// Hash-keyed record store.
///
/// Records are appended to the archive and located through the hash index.
/// The store knows nothing about logical keys: callers supply the
/// [`HashKey`] and the packed record bytes. Several logical keys may share
/// one hash key; the façades in [`crate::facade`] tell them apart.
///
/// A store is shared by reference (usually through an `Arc`). Lookups run
/// concurrently; writes take the handle lock exclusively.
pub struct KeyStore {
    paths: StorePaths,
    shared: Arc<Shared>,
    worker: Mutex<Option<SnapshotWorker>>,
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}

impl KeyStore {
    /// Open (or create) the store named by `path`.
    ///
    /// Records appended since the last clean shutdown are replayed into
    /// the index before this returns, and a background thread starts
    /// saving the index every `config.snapshot_interval()`.
    pub fn open(path: &Path, config: &StoreConfig) -> StoreResult<Self> {
        config.validate(KeyKind::Raw)?;
        let paths = StorePaths::new(path);

        let archive = Archive::open(&paths.data, config.archive_config())?;
        let index = HashIndex::open(&paths.index)?;
        let deleted = DeletionBitmap::open(&paths.deleted)?;

        let mut handles = Handles {
            archive,
            index,
            deleted,
        };
        let replayed = handles.check_index_state()?;

        info!(
            store = %paths.name,
            records = handles.archive.count(),
            replayed,
            "key store opened"
        );

        let shared = Arc::new(Shared {
            handles: RwLock::new(Some(handles)),
            save_lock: Mutex::new(()),
        });
        let worker_shared = Arc::clone(&shared);
        let worker = SnapshotWorker::spawn(&paths.name, config.snapshot_interval(), move || {
            worker_shared.save_index()
        })?;

        Ok(Self {
            paths,
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Files backing this store.
    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    /// Append `record` under `hash` and make it the head.
    pub fn set(&self, hash: HashKey, record: &[u8]) -> StoreResult<RecordNumber> {
        self.with_handles_mut(|h| {
            let number = h.archive.write(hash, record, false)?;
            h.index.set(hash, number);
            Ok(number)
        })
    }

    /// The head record filed under `hash`, verbatim.
    pub fn get(&self, hash: HashKey) -> StoreResult<Option<Vec<u8>>> {
        self.with_handles(|h| match h.index.get(hash) {
            Some(number) => Ok(Some(h.archive.read(number)?)),
            None => Ok(None),
        })
    }

    /// Every record ever filed under `hash`, oldest first.
    pub fn get_duplicates(&self, hash: HashKey) -> StoreResult<Vec<RecordNumber>> {
        self.with_handles(|h| Ok(h.index.get_duplicates(hash)))
    }

    /// Append `record` as a tombstone under `hash` and clear the head.
    ///
    /// Returns whether `hash` had a head. If another logical key filed
    /// under `hash` is still live, its newest record becomes the head.
    pub fn delete(&self, hash: HashKey, record: &[u8]) -> StoreResult<bool> {
        self.with_handles_mut(|h| {
            let number = h.archive.write(hash, record, true)?;
            h.deleted.set(true, number);
            h.apply_tombstone(hash, number)
        })
    }

    /// Pack a tombstone for `key` and delete it under its hash.
    pub fn remove_key<H: KeyHasher>(&self, key: &[u8], hasher: &H) -> StoreResult<bool> {
        self.delete(hasher.hash_key(key), &codec::pack_tombstone(key))
    }

    /// Payload of the record at `number`.
    pub fn fetch_record_bytes(&self, number: RecordNumber) -> StoreResult<Vec<u8>> {
        self.with_handles(|h| Ok(h.archive.read(number)?))
    }

    /// Payload of the record at `number` and whether it is a tombstone.
    pub fn fetch_record(&self, number: RecordNumber) -> StoreResult<(Vec<u8>, bool)> {
        self.with_handles(|h| {
            let (data, tombstone) = h.archive.read_with_deleted(number)?;
            Ok((data, h.is_deleted(number, tombstone)))
        })
    }

    /// The whole payload at `number` decoded as UTF-16LE text.
    pub fn fetch_record_string(&self, number: RecordNumber) -> StoreResult<String> {
        codec::decode_utf16le(&self.fetch_record_bytes(number)?)
    }

    /// Approximate number of live keys.
    ///
    /// Computed as `records - 2 * tombstones`: every delete is assumed to
    /// cancel one earlier write. Updates and deletes of absent keys skew
    /// it, and it can go negative.
    pub fn count(&self) -> StoreResult<i64> {
        self.with_handles(|h| {
            let tombstones = h.deleted.count_set_bits() as i64;
            Ok(i64::from(h.archive.count()) - 2 * tombstones)
        })
    }

    /// Number of archive records, tombstones included.
    pub fn record_count(&self) -> StoreResult<u32> {
        self.with_handles(|h| Ok(h.archive.count()))
    }

    /// Live heads in ascending hash key order, starting at `from`.
    ///
    /// The order is unsigned: hash keys with the top bit set sort last.
    pub fn enumerate_from(&self, from: HashKey) -> StoreResult<Vec<(HashKey, RecordNumber)>> {
        self.with_handles(|h| Ok(h.index.enumerate_from(from).collect()))
    }

    /// Iterate over every archive record, tombstones included.
    ///
    /// The iterator holds a shared lock on the store: writers block until it
    /// is dropped.
    pub fn enumerate_storage(&self) -> StoreResult<StorageRecords<'_>> {
        let guard = self
            .shared
            .handles
            .read()
            .map_err(|_| StoreError::LockPoisoned("handles"))?;
        let end = match guard.as_ref() {
            Some(h) => RecordNumber::new(h.archive.count()),
            None => return Err(StoreError::Closed),
        };
        Ok(StorageRecords {
            guard,
            next: RecordNumber::ZERO,
            end,
        })
    }

    /// Append copies of records `[start, count)` to `target`.
    pub fn copy_to(&self, target: &Archive, start: RecordNumber) -> StoreResult<u32> {
        self.with_handles(|h| Ok(h.archive.copy_to(target, start)?))
    }

    /// Counters for diagnostics.
    pub fn stats(&self) -> StoreResult<StoreStats> {
        self.with_handles(|h| {
            let records = h.archive.count();
            let tombstones = h.deleted.count_set_bits();
            let buckets = h.index.buckets();
            Ok(StoreStats {
                records,
                tombstones,
                approximate_count: i64::from(records) - 2 * tombstones as i64,
                live_hash_keys: h.index.len(),
                hash_keys: buckets.len(),
                chained_hash_keys: buckets.values().filter(|b| b.chain.len() > 1).count(),
                last_indexed: h.index.last_indexed_record_number(),
            })
        })
    }

    /// Persist the index and deletion bitmap.
    ///
    /// Safe to call while other threads write. A no-op after shutdown.
    pub fn save_index(&self) -> StoreResult<()> {
        self.shared.save_index()
    }

    /// Stop the snapshot worker, persist everything and release the files.
    ///
    /// Only the first call does any work. Data operations afterwards fail
    /// with [`StoreError::Closed`].
    pub fn shutdown(&self) -> StoreResult<()> {
        let mut worker = self
            .worker
            .lock()
            .map_err(|_| StoreError::LockPoisoned("worker"))?;
        if let Some(worker) = worker.take() {
            worker.stop();
        }

        let _save = self
            .shared
            .save_lock
            .lock()
            .map_err(|_| StoreError::LockPoisoned("save"))?;
        let mut guard = self
            .shared
            .handles
            .write()
            .map_err(|_| StoreError::LockPoisoned("handles"))?;
        let Some(Handles {
            archive,
            index,
            deleted,
        }) = guard.take()
        else {
            return Ok(());
        };

        archive.flush()?;
        let records = archive.count();
        deleted.shutdown()?;
        index.shutdown(records)?;
        archive.shutdown()?;

        info!(store = %self.paths.name, records, "key store shut down");
        Ok(())
    }

    fn with_handles<R>(&self, f: impl FnOnce(&Handles) -> StoreResult<R>) -> StoreResult<R> {
        let guard = self
            .shared
            .handles
            .read()
            .map_err(|_| StoreError::LockPoisoned("handles"))?;
        f(guard.as_ref().ok_or(StoreError::Closed)?)
    }

    fn with_handles_mut<R>(
        &self,
        f: impl FnOnce(&mut Handles) -> StoreResult<R>,
    ) -> StoreResult<R> {
        let mut guard = self
            .shared
            .handles
            .write()
            .map_err(|_| StoreError::LockPoisoned("handles"))?;
        f(guard.as_mut().ok_or(StoreError::Closed)?)
    }

    /// Index buckets and tombstone bits, for comparing recovered state.
    #[cfg(test)]
    pub(crate) fn index_state(
        &self,
    ) -> (
        std::collections::BTreeMap<HashKey, hkv_index::Bucket>,
        Vec<RecordNumber>,
    ) {
        self.with_handles(|h| Ok((h.index.buckets().clone(), h.deleted.set_bits().collect())))
            .unwrap()
    }

    /// Drop every handle without saving, as a crash would.
    #[cfg(test)]
    pub(crate) fn simulate_crash(&self) {
        if let Some(worker) = self.worker.lock().unwrap().take() {
            worker.stop();
        }
        self.shared.handles.write().unwrap().take();
    }
}

impl Drop for KeyStore {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(store = %self.paths.name, error = %e, "shutdown on drop failed");
        }
    }
}

/// Iterator returned by [`KeyStore::enumerate_storage`].
pub struct StorageRecords<'a> {
    guard: RwLockReadGuard<'a, Option<Handles>>,
    next: RecordNumber,
    end: RecordNumber,
}

impl Iterator for StorageRecords<'_> {
    type Item = StoreResult<StoredRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let handles = self.guard.as_ref()?;
        let number = self.next;
        self.next = RecordNumber::new(number.get() + 1);
        Some(handles.archive.read_record(number).map_err(StoreError::from))
    }
}
