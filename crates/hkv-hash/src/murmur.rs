const C1: u32 = 0xcc9e_2d51;
const C2: u32 = 0x1b87_3593;

/// Expected result of [`verification_test`] for a correct implementation.
pub const VERIFICATION_VALUE: u32 = 0xB0F5_7EE3;

/// MurmurHash3 x86 32-bit.
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    let mut h1 = seed;

    let mut blocks = data.chunks_exact(4);
    for block in &mut blocks {
        let k1 = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        h1 ^= mix_k1(k1);
        h1 = h1.rotate_left(13);
        h1 = h1.wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = blocks.remainder();
    let mut k1 = 0u32;
    if tail.len() >= 3 {
        k1 ^= u32::from(tail[2]) << 16;
    }
    if tail.len() >= 2 {
        k1 ^= u32::from(tail[1]) << 8;
    }
    if !tail.is_empty() {
        k1 ^= u32::from(tail[0]);
        h1 ^= mix_k1(k1);
    }

    // The reference algorithm folds in the length modulo 2^32.
    h1 ^= data.len() as u32;
    fmix32(h1)
}

/// Reference self-check digest; [`VERIFICATION_VALUE`] when correct.
///
/// Hashes the prefixes `key[..i]` of the byte sequence `0, 1, .., 255` with
/// seed `256 - i`, concatenates the little-endian results and hashes the
/// 1024-byte concatenation with seed 0.
pub fn verification_value() -> u32 {
    let mut key = [0u8; 256];
    let mut hashes = [0u8; 1024];

    for i in 0..256usize {
        key[i] = i as u8;
        let result = murmur3_32(&key[..i], 256 - i as u32);
        hashes[i * 4..i * 4 + 4].copy_from_slice(&result.to_le_bytes());
    }

    murmur3_32(&hashes, 0)
}

/// Does this build reproduce the reference verification value?
pub fn verification_test() -> bool {
    verification_value() == VERIFICATION_VALUE
}

fn mix_k1(mut k1: u32) -> u32 {
    k1 = k1.wrapping_mul(C1);
    k1 = k1.rotate_left(15);
    k1.wrapping_mul(C2)
}

fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_reference_verification() {
        assert_eq!(verification_value(), 0xB0F5_7EE3);
        assert!(verification_test());
    }

    #[test]
    fn empty_input_with_zero_seed_is_zero() {
        assert_eq!(murmur3_32(b"", 0), 0);
    }

    #[test]
    fn known_vectors() {
        assert_eq!(murmur3_32(b"", 1), 0x514e_28b7);
        assert_eq!(murmur3_32(b"", 0xffff_ffff), 0x81f1_6f39);
        assert_eq!(murmur3_32(&[0xff, 0xff, 0xff, 0xff], 0), 0x7629_3b50);
        assert_eq!(murmur3_32(&[0x21, 0x43, 0x65, 0x87], 0), 0xf55b_516b);
        assert_eq!(murmur3_32(&[0x21, 0x43, 0x65], 0), 0x7e4a_8634);
        assert_eq!(murmur3_32(&[0x21, 0x43], 0), 0xa0f7_b07a);
        assert_eq!(murmur3_32(&[0x21], 0), 0x7266_1cf4);
    }

    #[test]
    fn seed_changes_output() {
        assert_ne!(murmur3_32(b"alpha", 0), murmur3_32(b"alpha", 1));
    }
}
