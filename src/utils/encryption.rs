// src/utils/encryption.rs
//! AES-256-GCM file encryption.
//!
//! Each encrypted upload gets its own random 256-bit key. The stored payload is
//! `nonce (12) || ciphertext || tag (16)`, so a payload is self-contained given
//! the key.

use crate::error::{ConsentError, ConsentResult};
use crate::utils::crypto::random_bytes;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use zeroize::Zeroizing;

/// Length of a file encryption key in bytes.
pub const FILE_KEY_LEN: usize = 32;

/// A symmetric file key, wiped from memory on drop.
pub type FileKey = Zeroizing<[u8; FILE_KEY_LEN]>;

/// Draws a fresh random file key.
pub fn generate_file_key() -> FileKey {
    let mut key = Zeroizing::new([0u8; FILE_KEY_LEN]);
    key.copy_from_slice(&random_bytes(FILE_KEY_LEN));
    key
}

/// Rebuilds a file key from raw bytes (e.g. the output of share recovery).
pub fn file_key_from_slice(bytes: &[u8]) -> ConsentResult<FileKey> {
    if bytes.len() != FILE_KEY_LEN {
        return Err(ConsentError::Crypto(format!(
            "file key must be {} bytes, got {}",
            FILE_KEY_LEN,
            bytes.len()
        )));
    }
    let mut key = Zeroizing::new([0u8; FILE_KEY_LEN]);
    key.copy_from_slice(bytes);
    Ok(key)
}

fn aead_key(key: &FileKey) -> ConsentResult<LessSafeKey> {
    let unbound = UnboundKey::new(&AES_256_GCM, &key[..])
        .map_err(|_| ConsentError::Crypto("cipher init failed".into()))?;
    Ok(LessSafeKey::new(unbound))
}

/// Encrypts `plaintext` under `key`, returning `nonce || ciphertext || tag`.
pub fn encrypt_buffer(key: &FileKey, plaintext: &[u8]) -> ConsentResult<Vec<u8>> {
    let sealing = aead_key(key)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    nonce_bytes.copy_from_slice(&random_bytes(NONCE_LEN));
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let mut in_out = plaintext.to_vec();
    sealing
        .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| ConsentError::Crypto("encryption failed".into()))?;

    let mut payload = Vec::with_capacity(NONCE_LEN + in_out.len());
    payload.extend_from_slice(&nonce_bytes);
    payload.extend_from_slice(&in_out);
    Ok(payload)
}

/// Decrypts a payload produced by [`encrypt_buffer`]. Fails on a wrong key or
/// any tampering.
pub fn decrypt_buffer(key: &FileKey, payload: &[u8]) -> ConsentResult<Vec<u8>> {
    if payload.len() < NONCE_LEN + AES_256_GCM.tag_len() {
        return Err(ConsentError::Crypto("ciphertext too short".into()));
    }
    let opening = aead_key(key)?;

    let (nonce_bytes, sealed) = payload.split_at(NONCE_LEN);
    let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
        .map_err(|_| ConsentError::Crypto("bad nonce".into()))?;

    let mut in_out = sealed.to_vec();
    let plaintext = opening
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| ConsentError::Crypto("decryption failed".into()))?;
    Ok(plaintext.to_vec())
}
