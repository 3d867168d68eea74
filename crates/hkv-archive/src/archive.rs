use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use hkv_types::{HashKey, RecordNumber};

use crate::error::{ArchiveError, ArchiveResult};
use crate::frame::{self, FrameHeader, FILE_HEADER_SIZE, FRAME_HEADER_SIZE};

/// Flush/sync strategy for appends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` after every append (safest, highest latency).
    EveryWrite,
    /// Flush to the OS after every append and rely on its page cache.
    #[default]
    OsDefault,
}

/// Configuration for an [`Archive`].
#[derive(Clone, Debug, Default)]
pub struct ArchiveConfig {
    pub sync_mode: SyncMode,
}

/// One record as read back from the archive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredRecord {
    pub number: RecordNumber,
    /// Hash key the record was filed under.
    pub key: HashKey,
    /// `true` for tombstone records.
    pub deleted: bool,
    pub data: Vec<u8>,
}

/// Internal mutable state for appends.
struct ArchiveWriter {
    writer: BufWriter<File>,
    /// Byte offset where the next frame starts.
    offset: u64,
    /// Set when a failed append could not be rolled back.
    failed: bool,
}

impl ArchiveWriter {
    fn append(&mut self, frame: &[u8], sync_mode: SyncMode) -> io::Result<()> {
        self.writer.write_all(frame)?;
        self.writer.flush()?;
        if sync_mode == SyncMode::EveryWrite {
            self.writer.get_ref().sync_data()?;
        }
        Ok(())
    }

    /// Drop anything still buffered and cut the file back to `offset`, the
    /// end of the last complete frame.
    fn rollback(&mut self) -> io::Result<()> {
        let file = self.writer.get_ref().try_clone()?;
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
        let (file, _unflushed) = stale.into_parts();
        file.set_len(self.offset)?;
        Ok(())
    }
}

/// Append-only record file.
///
/// Record numbers are positions in an in-memory offset table built by
/// scanning the file on open. The table only grows, and it is extended while
/// the writer lock is held, so record numbers are handed out in append order.
pub struct Archive {
    path: PathBuf,
    writer: Mutex<ArchiveWriter>,
    /// Start offset of every record, indexed by record number.
    offsets: RwLock<Vec<u64>>,
    /// Separate handle for random-access reads.
    reader: Mutex<File>,
    config: ArchiveConfig,
}

impl Archive {
    /// Open (or create) the archive file at `path`.
    ///
    /// An incomplete final record left by a crash is truncated away.
    pub fn open(path: &Path, config: ArchiveConfig) -> ArchiveResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        let file_len = file.metadata()?.len();
        if file_len < FILE_HEADER_SIZE as u64 {
            if file_len > 0 {
                warn!(path = %path.display(), file_len, "truncated archive header; reinitializing");
            }
            file.set_len(0)?;
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&frame::file_header())?;
            file.sync_all()?;
        }

        let (offsets, end) = scan(&file)?;
        let file_len = file.metadata()?.len();
        if end < file_len {
            warn!(
                path = %path.display(),
                valid_len = end,
                file_len,
                "torn record at archive tail; truncating"
            );
            file.set_len(end)?;
            file.sync_all()?;
        }
        drop(file);

        // Independent handles: appends never move the read cursor.
        let append = OpenOptions::new().append(true).open(path)?;
        let reader = OpenOptions::new().read(true).open(path)?;

        info!(path = %path.display(), records = offsets.len(), "archive opened");

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(ArchiveWriter {
                writer: BufWriter::new(append),
                offset: end,
                failed: false,
            }),
            offsets: RwLock::new(offsets),
            reader: Mutex::new(reader),
            config,
        })
    }

    /// Append a record and return its record number.
    ///
    /// A failed append is rolled back so the file ends at the last complete
    /// frame. If that is not possible the archive refuses further appends.
    pub fn write(&self, key: HashKey, data: &[u8], tombstone: bool) -> ArchiveResult<RecordNumber> {
        let encoded = frame::encode(key, tombstone, data)?;

        let mut w = self.lock_writer()?;
        if w.failed {
            return Err(ArchiveError::Failed);
        }
        let mut offsets = self
            .offsets
            .write()
            .map_err(|_| ArchiveError::LockPoisoned("offsets"))?;
        let number = RecordNumber::try_from(offsets.len()).map_err(|_| ArchiveError::Full)?;
        if number.get() == u32::MAX {
            return Err(ArchiveError::Full);
        }

        let entry_offset = w.offset;
        if let Err(e) = w.append(&encoded, self.config.sync_mode) {
            if let Err(rollback) = w.rollback() {
                w.failed = true;
                error!(
                    path = %self.path.display(),
                    error = %rollback,
                    "archive append could not be rolled back"
                );
            } else {
                warn!(
                    path = %self.path.display(),
                    offset = entry_offset,
                    error = %e,
                    "archive append failed; rolled back"
                );
            }
            return Err(e.into());
        }
        w.offset += encoded.len() as u64;
        offsets.push(entry_offset);

        debug!(record = number.get(), key = %key, tombstone, len = data.len(), "archive append");
        Ok(number)
    }

    /// Read a record's payload.
    pub fn read(&self, number: RecordNumber) -> ArchiveResult<Vec<u8>> {
        Ok(self.read_record(number)?.data)
    }

    /// Read a record's payload together with its tombstone flag.
    pub fn read_with_deleted(&self, number: RecordNumber) -> ArchiveResult<(Vec<u8>, bool)> {
        let record = self.read_record(number)?;
        Ok((record.data, record.deleted))
    }

    /// The hash key a record was filed under and its tombstone flag.
    pub fn get_key_at(&self, number: RecordNumber) -> ArchiveResult<(HashKey, bool)> {
        let record = self.read_record(number)?;
        Ok((record.key, record.deleted))
    }

    /// Read and verify a complete record.
    pub fn read_record(&self, number: RecordNumber) -> ArchiveResult<StoredRecord> {
        let offset = self.offset_of(number)?;

        let mut file = self
            .reader
            .lock()
            .map_err(|_| ArchiveError::LockPoisoned("reader"))?;
        file.seek(SeekFrom::Start(offset))?;

        let mut header_buf = [0u8; FRAME_HEADER_SIZE];
        file.read_exact(&mut header_buf)?;
        let header = FrameHeader::decode(&header_buf);
        if !header.verify_header() {
            return Err(ArchiveError::Corrupt {
                record: number.get(),
                offset,
                reason: "header checksum mismatch".into(),
            });
        }

        let mut data = vec![0u8; header.payload_len as usize];
        file.read_exact(&mut data)?;
        if !header.verify(&data) {
            return Err(ArchiveError::Corrupt {
                record: number.get(),
                offset,
                reason: "payload checksum mismatch".into(),
            });
        }

        Ok(StoredRecord {
            number,
            key: header.key,
            deleted: header.tombstone,
            data,
        })
    }

    /// Number of records written, tombstones included.
    pub fn count(&self) -> u32 {
        match self.offsets.read() {
            Ok(offsets) => offsets.len() as u32,
            Err(poisoned) => poisoned.into_inner().len() as u32,
        }
    }

    /// Lazily iterate over every record present when the iterator was made.
    ///
    /// Each call starts again from record 0.
    pub fn enumerate(&self) -> Records<'_> {
        Records {
            archive: self,
            next: RecordNumber::ZERO,
            end: RecordNumber::new(self.count()),
        }
    }

    /// Append copies of records `[start, count)` to `target`, keeping each
    /// record's hash key and tombstone flag. Returns the number copied.
    pub fn copy_to(&self, target: &Archive, start: RecordNumber) -> ArchiveResult<u32> {
        let end = RecordNumber::new(self.count());
        let mut copied = 0u32;
        for number in start.range_to(end) {
            let record = self.read_record(number)?;
            target.write(record.key, &record.data, record.deleted)?;
            copied += 1;
        }
        info!(
            from = %self.path.display(),
            to = %target.path.display(),
            start = start.get(),
            copied,
            "archive copy complete"
        );
        Ok(copied)
    }

    /// Flush buffered appends and sync them to disk.
    pub fn flush(&self) -> ArchiveResult<()> {
        let mut w = self.lock_writer()?;
        w.writer.flush()?;
        w.writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Make every appended record durable before the archive is dropped.
    pub fn shutdown(&self) -> ArchiveResult<()> {
        self.flush()?;
        debug!(path = %self.path.display(), records = self.count(), "archive shut down");
        Ok(())
    }

    /// Path to the archive file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn offset_of(&self, number: RecordNumber) -> ArchiveResult<u64> {
        let offsets = self
            .offsets
            .read()
            .map_err(|_| ArchiveError::LockPoisoned("offsets"))?;
        offsets
            .get(number.as_usize())
            .copied()
            .ok_or(ArchiveError::RecordOutOfRange {
                record: number,
                count: offsets.len() as u32,
            })
    }

    fn lock_writer(&self) -> ArchiveResult<MutexGuard<'_, ArchiveWriter>> {
        self.writer
            .lock()
            .map_err(|_| ArchiveError::LockPoisoned("writer"))
    }
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("path", &self.path)
            .field("records", &self.count())
            .finish()
    }
}

/// Iterator returned by [`Archive::enumerate`].
pub struct Records<'a> {
    archive: &'a Archive,
    next: RecordNumber,
    end: RecordNumber,
}

impl Iterator for Records<'_> {
    type Item = ArchiveResult<StoredRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let number = self.next;
        self.next = RecordNumber::new(number.get() + 1);
        Some(self.archive.read_record(number))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.end.get() - self.next.get()) as usize;
        (remaining, Some(remaining))
    }
}

/// Walk every frame after the file header.
///
/// Returns the record offsets and the end of the last intact frame. Stops
/// early at a torn tail: a partial frame header, a verified header whose
/// payload runs past the end of the file, or a payload checksum failure in
/// the last frame. A header checksum failure, or a payload checksum failure
/// before the tail, is an error.
fn scan(file: &File) -> ArchiveResult<(Vec<u64>, u64)> {
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    reader.seek(SeekFrom::Start(0))?;

    let mut header = [0u8; FILE_HEADER_SIZE];
    reader.read_exact(&mut header)?;
    frame::check_file_header(&header)?;

    let mut offsets = Vec::new();
    let mut offset = FILE_HEADER_SIZE as u64;

    while offset < file_len {
        let mut header_buf = [0u8; FRAME_HEADER_SIZE];
        match reader.read_exact(&mut header_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let header = FrameHeader::decode(&header_buf);
        if !header.verify_header() {
            return Err(ArchiveError::Corrupt {
                record: offsets.len() as u32,
                offset,
                reason: "header checksum mismatch".into(),
            });
        }
        let frame_end = offset + header.frame_len();
        if frame_end > file_len {
            break;
        }

        let mut payload = vec![0u8; header.payload_len as usize];
        reader.read_exact(&mut payload)?;

        if !header.verify(&payload) {
            if frame_end == file_len {
                // Last frame: a write that never completed.
                break;
            }
            return Err(ArchiveError::Corrupt {
                record: offsets.len() as u32,
                offset,
                reason: "payload checksum mismatch".into(),
            });
        }

        offsets.push(offset);
        offset = frame_end;
    }

    Ok((offsets, offset))
}
