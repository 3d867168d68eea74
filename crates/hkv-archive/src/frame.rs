//! On-disk framing of archive records.
//!
//! ```text
//! file header:  [4 bytes: "HKVA"][4 bytes: version (little-endian u32)]
//! each record:  [4 bytes: payload length (LE u32)]
//!               [1 byte:  flags, bit 0 = tombstone]
//!               [4 bytes: hash key (LE u32)]
//!               [4 bytes: CRC32 of length + flags + hash key (LE u32)]
//!               [4 bytes: CRC32 of payload (LE u32)]
//!               [N bytes: payload]
//! ```
//!
//! The header checksum covers the length field, so a damaged length is
//! detected before it is used to find the next frame.

use hkv_types::HashKey;

use crate::error::{ArchiveError, ArchiveResult};

pub const MAGIC: &[u8; 4] = b"HKVA";
pub const VERSION: u32 = 2;
pub const FILE_HEADER_SIZE: usize = 8;
pub const FRAME_HEADER_SIZE: usize = 17;

const FLAG_TOMBSTONE: u8 = 0b0000_0001;
/// Length, flags and hash key: the bytes the header checksum covers.
const HEADER_FIELDS: usize = 9;

/// Decoded fixed-size part of a record frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub payload_len: u32,
    pub tombstone: bool,
    pub key: HashKey,
    pub header_crc: u32,
    pub payload_crc: u32,
    flags: u8,
}

impl FrameHeader {
    /// Total frame size, header included.
    pub fn frame_len(&self) -> u64 {
        FRAME_HEADER_SIZE as u64 + u64::from(self.payload_len)
    }

    pub fn decode(buf: &[u8; FRAME_HEADER_SIZE]) -> Self {
        let flags = buf[4];
        Self {
            payload_len: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            tombstone: flags & FLAG_TOMBSTONE != 0,
            key: HashKey::new(u32::from_le_bytes([buf[5], buf[6], buf[7], buf[8]])),
            header_crc: u32::from_le_bytes([buf[9], buf[10], buf[11], buf[12]]),
            payload_crc: u32::from_le_bytes([buf[13], buf[14], buf[15], buf[16]]),
            flags,
        }
    }

    /// Do the length, flags and hash key match the header checksum?
    pub fn verify_header(&self) -> bool {
        header_checksum(self.payload_len, self.flags, self.key) == self.header_crc
    }

    /// Does `payload` match the stored checksum?
    pub fn verify(&self, payload: &[u8]) -> bool {
        crc32fast::hash(payload) == self.payload_crc
    }
}

/// Encode a complete frame for `payload`.
pub fn encode(key: HashKey, tombstone: bool, payload: &[u8]) -> ArchiveResult<Vec<u8>> {
    let payload_len =
        u32::try_from(payload.len()).map_err(|_| ArchiveError::PayloadTooLarge(payload.len()))?;
    let flags = if tombstone { FLAG_TOMBSTONE } else { 0 };

    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.extend_from_slice(&payload_len.to_le_bytes());
    buf.push(flags);
    buf.extend_from_slice(&key.get().to_le_bytes());
    buf.extend_from_slice(&header_checksum(payload_len, flags, key).to_le_bytes());
    buf.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

pub fn file_header() -> [u8; FILE_HEADER_SIZE] {
    let mut buf = [0u8; FILE_HEADER_SIZE];
    buf[..4].copy_from_slice(MAGIC);
    buf[4..].copy_from_slice(&VERSION.to_le_bytes());
    buf
}

pub fn check_file_header(buf: &[u8; FILE_HEADER_SIZE]) -> ArchiveResult<()> {
    if &buf[..4] != MAGIC {
        return Err(ArchiveError::InvalidHeader(format!(
            "expected magic {:?}, found {:?}",
            String::from_utf8_lossy(MAGIC),
            String::from_utf8_lossy(&buf[..4])
        )));
    }
    let version = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    if version != VERSION {
        return Err(ArchiveError::UnsupportedVersion(version));
    }
    Ok(())
}

fn header_checksum(payload_len: u32, flags: u8, key: HashKey) -> u32 {
    let mut fields = [0u8; HEADER_FIELDS];
    fields[..4].copy_from_slice(&payload_len.to_le_bytes());
    fields[4] = flags;
    fields[5..].copy_from_slice(&key.get().to_le_bytes());
    crc32fast::hash(&fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_of(frame: &[u8]) -> FrameHeader {
        FrameHeader::decode(&frame[..FRAME_HEADER_SIZE].try_into().unwrap())
    }

    #[test]
    fn encode_then_decode_header() {
        let frame = encode(HashKey::new(0xabcd), true, b"payload").unwrap();
        assert_eq!(frame.len(), FRAME_HEADER_SIZE + 7);

        let header = header_of(&frame);
        assert_eq!(header.payload_len, 7);
        assert!(header.tombstone);
        assert_eq!(header.key, HashKey::new(0xabcd));
        assert!(header.verify_header());
        assert!(header.verify(&frame[FRAME_HEADER_SIZE..]));
    }

    #[test]
    fn header_checksum_covers_length_flags_and_key() {
        let frame = encode(HashKey::new(1), false, b"x").unwrap();

        for byte in 0..HEADER_FIELDS {
            let mut damaged = frame.clone();
            damaged[byte] ^= 0x40;
            assert!(!header_of(&damaged).verify_header(), "byte {byte}");
        }
    }

    #[test]
    fn payload_checksum_covers_payload() {
        let frame = encode(HashKey::new(1), false, b"xyz").unwrap();
        let header = header_of(&frame);
        assert!(header.verify(b"xyz"));
        assert!(!header.verify(b"xyZ"));
    }

    #[test]
    fn file_header_roundtrip() {
        assert!(check_file_header(&file_header()).is_ok());
    }

    #[test]
    fn bad_magic_rejected() {
        let mut header = file_header();
        header[0] = b'X';
        assert!(matches!(
            check_file_header(&header),
            Err(ArchiveError::InvalidHeader(_))
        ));
    }

    #[test]
    fn unknown_version_rejected() {
        let mut header = file_header();
        header[4..].copy_from_slice(&9u32.to_le_bytes());
        assert!(matches!(
            check_file_header(&header),
            Err(ArchiveError::UnsupportedVersion(9))
        ));
    }
}
