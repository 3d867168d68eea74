use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Position of a record in the append-only archive.
///
/// Record numbers start at 0, grow by one per appended record and are never
/// reused or rewritten. Updates and deletes are new records.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct RecordNumber(u32);

impl RecordNumber {
    /// The first record in any archive.
    pub const ZERO: Self = Self(0);

    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// The raw value.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// The value as a `usize`, for indexing offset tables.
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// The record number that follows this one.
    pub fn next(self) -> Result<Self, TypeError> {
        self.0
            .checked_add(1)
            .map(Self)
            .ok_or(TypeError::RecordNumberOverflow(u64::from(self.0) + 1))
    }

    /// Iterate over `[self, end)`.
    pub fn range_to(self, end: RecordNumber) -> impl DoubleEndedIterator<Item = RecordNumber> {
        (self.0..end.0).map(RecordNumber)
    }
}

impl fmt::Display for RecordNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u32> for RecordNumber {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl TryFrom<usize> for RecordNumber {
    type Error = TypeError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        u32::try_from(value)
            .map(Self)
            .map_err(|_| TypeError::RecordNumberOverflow(value as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_increments() {
        assert_eq!(RecordNumber::ZERO.next().unwrap(), RecordNumber::new(1));
    }

    #[test]
    fn next_overflows_at_max() {
        let err = RecordNumber::new(u32::MAX).next().unwrap_err();
        assert_eq!(err, TypeError::RecordNumberOverflow(1 << 32));
    }

    #[test]
    fn range_is_half_open() {
        let numbers: Vec<u32> = RecordNumber::new(2)
            .range_to(RecordNumber::new(5))
            .map(RecordNumber::get)
            .collect();
        assert_eq!(numbers, vec![2, 3, 4]);
    }

    #[test]
    fn try_from_usize_rejects_large_values() {
        assert!(RecordNumber::try_from(7usize).is_ok());
        #[cfg(target_pointer_width = "64")]
        assert!(RecordNumber::try_from(u32::MAX as usize + 1).is_err());
    }

    #[test]
    fn display_uses_hash_prefix() {
        assert_eq!(RecordNumber::new(12).to_string(), "#12");
    }
}
