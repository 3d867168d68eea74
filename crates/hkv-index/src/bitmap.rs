//! Deletion bitmap: one bit per archive record number.
//!
//! A set bit marks the record at that number as a tombstone. Bits are only
//! ever set; the bitmap grows as higher record numbers are marked.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use hkv_types::RecordNumber;

use crate::error::{IndexError, IndexResult};
use crate::persist;

const MAGIC: &[u8; 4] = b"HKVB";

/// Number of bits per word in the backing store.
const BITS_PER_WORD: usize = 64;

/// Persisted tombstone bitmap.
#[derive(Debug)]
pub struct DeletionBitmap {
    path: PathBuf,
    /// Backing store: each u64 tracks 64 record numbers.
    words: Vec<u64>,
    /// `true` when the bits came from an intact file.
    restored: bool,
}

impl DeletionBitmap {
    /// Load the bitmap at `path`, or start empty.
    ///
    /// A damaged file is discarded with a warning. Either way
    /// [`restored`](Self::restored) tells the caller whether it has to
    /// rebuild the bits from the archive.
    pub fn open(path: &Path) -> IndexResult<Self> {
        let mut bitmap = Self {
            path: path.to_path_buf(),
            words: Vec::new(),
            restored: false,
        };

        match persist::read_snapshot(path, MAGIC) {
            Ok(Some(body)) => match decode_words(&body) {
                Some(words) => {
                    bitmap.words = words;
                    bitmap.restored = true;
                }
                None => warn!(path = %path.display(), "malformed deletion bitmap; discarding"),
            },
            Ok(None) => {}
            Err(IndexError::Corrupt { reason, .. }) => {
                warn!(path = %path.display(), %reason, "discarding deletion bitmap");
            }
            Err(e) => return Err(e),
        }

        debug!(path = %path.display(), set_bits = bitmap.count_set_bits(), "deletion bitmap loaded");
        Ok(bitmap)
    }

    /// Were the bits loaded from an intact file? `false` for a new, missing
    /// or discarded bitmap.
    pub fn restored(&self) -> bool {
        self.restored
    }

    /// Set or clear the bit for `number`.
    pub fn set(&mut self, value: bool, number: RecordNumber) {
        let word_idx = number.as_usize() / BITS_PER_WORD;
        let bit_idx = number.as_usize() % BITS_PER_WORD;

        if word_idx >= self.words.len() {
            if !value {
                return;
            }
            self.words.resize(word_idx + 1, 0);
        }

        if value {
            self.words[word_idx] |= 1u64 << bit_idx;
        } else {
            self.words[word_idx] &= !(1u64 << bit_idx);
        }
    }

    /// Is the bit for `number` set?
    pub fn get(&self, number: RecordNumber) -> bool {
        let word_idx = number.as_usize() / BITS_PER_WORD;
        let bit_idx = number.as_usize() % BITS_PER_WORD;

        self.words
            .get(word_idx)
            .is_some_and(|word| word & (1u64 << bit_idx) != 0)
    }

    /// Clear every bit.
    pub fn clear(&mut self) {
        self.words.clear();
    }

    /// Number of set bits.
    pub fn count_set_bits(&self) -> u64 {
        self.words.iter().map(|w| u64::from(w.count_ones())).sum()
    }

    /// All set record numbers in ascending order.
    pub fn set_bits(&self) -> impl Iterator<Item = RecordNumber> + '_ {
        self.words
            .iter()
            .enumerate()
            .filter(|(_, word)| **word != 0)
            .flat_map(|(word_idx, word)| {
                (0..BITS_PER_WORD)
                    .filter(move |bit| word & (1u64 << bit) != 0)
                    .map(move |bit| RecordNumber::new((word_idx * BITS_PER_WORD + bit) as u32))
            })
    }

    /// Persist the current state.
    ///
    /// Body format: `[word_count: u64][word_0: u64][word_1: u64]...`, all
    /// little-endian.
    pub fn save(&self) -> IndexResult<()> {
        let mut body = Vec::with_capacity(8 + self.words.len() * 8);
        body.extend_from_slice(&(self.words.len() as u64).to_le_bytes());
        for &word in &self.words {
            body.extend_from_slice(&word.to_le_bytes());
        }
        persist::write_snapshot(&self.path, MAGIC, &body)?;
        debug!(path = %self.path.display(), set_bits = self.count_set_bits(), "deletion bitmap saved");
        Ok(())
    }

    /// Persist and release.
    pub fn shutdown(self) -> IndexResult<()> {
        self.save()
    }
}

fn decode_words(data: &[u8]) -> Option<Vec<u64>> {
    let count_bytes: [u8; 8] = data.get(..8)?.try_into().ok()?;
    let word_count = usize::try_from(u64::from_le_bytes(count_bytes)).ok()?;
    let body = &data[8..];
    if body.len() != word_count.checked_mul(8)? {
        return None;
    }
    Some(
        body.chunks_exact(8)
            .map(|chunk| {
                u64::from_le_bytes([
                    chunk[0], chunk[1], chunk[2], chunk[3], chunk[4], chunk[5], chunk[6], chunk[7],
                ])
            })
            .collect(),
    )
}
