// src/storage/blob_store.rs
//! Content-addressed blob storage for disclosed files.
//!
//! The address of a blob is the SHA-256 hex of its bytes, so identical uploads
//! land on the same address and writing them again is a no-op.
//!
//! # Backends
//! - [`FsBlobStore`]: one file per blob under a directory, written via
//!   temp file + rename so concurrent writers never expose a partial blob
//! - [`InMemoryBlobStore`]: a map, for tests and ephemeral runs

use crate::error::{ConsentError, ConsentResult};
use crate::utils::crypto::{hash_hex, random_id};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::RwLock;

/// Store bytes, get back a content address.
pub trait BlobStore: Send + Sync {
    /// Stores `data` and returns its content address. Idempotent.
    fn put(&self, data: &[u8]) -> ConsentResult<String>;

    /// Fetches the bytes stored under `address`.
    fn get(&self, address: &str) -> ConsentResult<Vec<u8>>;

    /// Where a relying party can fetch the blob from.
    fn locator(&self, address: &str) -> String {
        format!("/blobs/{}", address)
    }
}

/// A well-formed address is exactly 64 lowercase hex characters.
pub fn is_valid_address(address: &str) -> bool {
    address.len() == 64
        && address
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn checked(address: &str) -> ConsentResult<&str> {
    if is_valid_address(address) {
        Ok(address)
    } else {
        Err(ConsentError::InvalidInput(format!(
            "malformed content address: {}",
            address
        )))
    }
}

/// Filesystem-backed content-addressed store.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Opens (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> ConsentResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, data: &[u8]) -> ConsentResult<String> {
        let address = hash_hex(data);
        let target = self.root.join(&address);
        if target.exists() {
            log::debug!("blob {} already stored", address);
            return Ok(address);
        }

        let tmp = self.root.join(format!(".{}.{}.tmp", address, random_id()));
        fs::write(&tmp, data)?;
        if let Err(e) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            // Another writer may have won the race with identical bytes.
            if !target.exists() {
                return Err(e.into());
            }
        }
        log::debug!("stored blob {} ({} bytes)", address, data.len());
        Ok(address)
    }

    fn get(&self, address: &str) -> ConsentResult<Vec<u8>> {
        let address = checked(address)?;
        match fs::read(self.root.join(address)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(ConsentError::NotFound(format!("blob {}", address)))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Map-backed store.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for InMemoryBlobStore {
    fn put(&self, data: &[u8]) -> ConsentResult<String> {
        let address = hash_hex(data);
        self.blobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(address.clone())
            .or_insert_with(|| data.to_vec());
        Ok(address)
    }

    fn get(&self, address: &str) -> ConsentResult<Vec<u8>> {
        let address = checked(address)?;
        self.blobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(address)
            .cloned()
            .ok_or_else(|| ConsentError::NotFound(format!("blob {}", address)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn test_fs_put_get() {
        let dir = tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();
        let addr = store.put(b"document bytes").unwrap();
        assert_eq!(addr, hash_hex(b"document bytes"));
        assert_eq!(store.get(&addr).unwrap(), b"document bytes");
        assert_eq!(store.locator(&addr), format!("/blobs/{}", addr));
    }

    #[test]
    fn test_fs_same_bytes_same_address() {
        let dir = tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();
        let a = store.put(b"dup").unwrap();
        let b = store.put(b"dup").unwrap();
        assert_eq!(a, b);
        let files = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(files, 1);
    }

    #[test]
    fn test_fs_concurrent_identical_writes() {
        let dir = tempdir().unwrap();
        let store = Arc::new(FsBlobStore::open(dir.path()).unwrap());
        let payload = vec![7u8; 64 * 1024];

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let payload = payload.clone();
                thread::spawn(move || store.put(&payload).unwrap())
            })
            .collect();
        let addrs: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(addrs.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(store.get(&addrs[0]).unwrap(), payload);
    }

    #[test]
    fn test_missing_and_malformed_addresses() {
        let dir = tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();
        let absent = hash_hex(b"never stored");
        assert!(matches!(store.get(&absent), Err(ConsentError::NotFound(_))));
        assert!(matches!(
            store.get("../etc/passwd"),
            Err(ConsentError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_in_memory_dedupes() {
        let store = InMemoryBlobStore::new();
        let a = store.put(b"x").unwrap();
        store.put(b"x").unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&a).unwrap(), b"x");
    }
}
