//! Packed record format and text helpers.
//!
//! A packed record is the one byte layout hkv shares with archives written
//! by other implementations:
//!
//! ```text
//! [4 bytes: key length (little-endian u32)][key bytes][value bytes]
//! ```
//!
//! There is no padding and no value length: the value is everything after
//! the key. A tombstone is a packed record with an empty value.

use crate::error::{StoreError, StoreResult};

const LEN_PREFIX: usize = 4;

/// Pack an original key and a value into one record payload.
pub fn pack(key: &[u8], value: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(LEN_PREFIX + key.len() + value.len());
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);
    buf
}

/// Pack the payload of a tombstone record for `key`.
pub fn pack_tombstone(key: &[u8]) -> Vec<u8> {
    pack(key, &[])
}

/// Split a packed record into `(key, value)`.
pub fn unpack(record: &[u8]) -> StoreResult<(&[u8], &[u8])> {
    if record.len() < LEN_PREFIX {
        return Err(StoreError::MalformedRecord {
            declared: LEN_PREFIX,
            available: record.len(),
        });
    }
    let declared = u32::from_le_bytes([record[0], record[1], record[2], record[3]]) as usize;
    let rest = &record[LEN_PREFIX..];
    if declared > rest.len() {
        return Err(StoreError::MalformedRecord {
            declared,
            available: rest.len(),
        });
    }
    Ok(rest.split_at(declared))
}

/// Encode text as UTF-16 little-endian code units.
pub fn encode_utf16le(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

/// Decode UTF-16 little-endian bytes.
pub fn decode_utf16le(bytes: &[u8]) -> StoreResult<String> {
    if bytes.len() % 2 != 0 {
        return Err(StoreError::InvalidText);
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| StoreError::InvalidText)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn layout_is_length_key_value() {
        let packed = pack(b"ab", b"xyz");
        assert_eq!(packed, vec![2, 0, 0, 0, b'a', b'b', b'x', b'y', b'z']);
    }

    #[test]
    fn tombstone_has_empty_value() {
        let packed = pack_tombstone(b"gone");
        let (key, value) = unpack(&packed).unwrap();
        assert_eq!(key, b"gone");
        assert!(value.is_empty());
    }

    #[test]
    fn empty_key_and_value() {
        let packed = pack(b"", b"");
        assert_eq!(packed, vec![0, 0, 0, 0]);
        assert_eq!(unpack(&packed).unwrap(), (&b""[..], &b""[..]));
    }

    #[test]
    fn declared_length_past_end_is_malformed() {
        let mut packed = pack(b"key", b"");
        packed[0] = 10;
        let err = unpack(&packed).unwrap_err();
        assert!(matches!(
            err,
            StoreError::MalformedRecord {
                declared: 10,
                available: 3
            }
        ));
    }

    #[test]
    fn short_buffer_is_malformed() {
        assert!(matches!(
            unpack(&[1, 0]),
            Err(StoreError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn utf16_matches_platform_layout() {
        assert_eq!(encode_utf16le("Ab"), vec![0x41, 0x00, 0x62, 0x00]);
        assert_eq!(decode_utf16le(&[0x41, 0x00, 0x62, 0x00]).unwrap(), "Ab");
    }

    #[test]
    fn utf16_surrogate_pairs() {
        let text = "key \u{1F511}";
        assert_eq!(decode_utf16le(&encode_utf16le(text)).unwrap(), text);
    }

    #[test]
    fn utf16_rejects_odd_length_and_lone_surrogates() {
        assert!(matches!(decode_utf16le(&[0x41]), Err(StoreError::InvalidText)));
        assert!(matches!(
            decode_utf16le(&[0x00, 0xD8]),
            Err(StoreError::InvalidText)
        ));
    }

    proptest! {
        #[test]
        fn unpack_inverts_pack(
            key in proptest::collection::vec(any::<u8>(), 0..64),
            value in proptest::collection::vec(any::<u8>(), 0..256),
        ) {
            let packed = pack(&key, &value);
            let (k, v) = unpack(&packed).unwrap();
            prop_assert_eq!(k, key.as_slice());
            prop_assert_eq!(v, value.as_slice());
        }
    }
}
