// src/utils/crypto.rs
//! Hashing and randomness helpers shared by every component.
//!
//! SHA-256 comes from `ring`; randomness from the operating system RNG.

use rand::rngs::OsRng;
use rand::RngCore;
use ring::digest::{digest, SHA256};

/// Number of random bytes behind token identifiers and challenge nonces (128 bits).
pub const RANDOM_ID_BYTES: usize = 16;

/// Computes a SHA-256 hash of the input data.
///
/// # Arguments
/// * `data` - Binary data to hash (as bytes slice)
///
/// # Returns
/// Fixed-size 32-byte array (`[u8; 32]`) containing the hash.
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    let d = digest(&SHA256, data);
    let mut out = [0u8; 32];
    out.copy_from_slice(d.as_ref());
    out
}

/// Lowercase hex SHA-256, used for content addresses and national-ID hashing.
pub fn hash_hex(data: &[u8]) -> String {
    hex::encode(hash_data(data))
}

/// Fills a fresh buffer of `len` bytes from the OS RNG.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    OsRng.fill_bytes(&mut buf);
    buf
}

/// An unguessable identifier: 128 random bits rendered as 32 hex characters.
pub fn random_id() -> String {
    hex::encode(random_bytes(RANDOM_ID_BYTES))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_known_vector() {
        assert_eq!(
            hash_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_random_id_shape() {
        let a = random_id();
        let b = random_id();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
