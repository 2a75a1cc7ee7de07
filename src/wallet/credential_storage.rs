// src/wallet/credential_storage.rs
//! Credential storage for attested attribute records.
//!
//! One [`Credential`] per DID. Records are only ever replaced wholesale by a
//! fresh submission. The in-memory store can be backed by a single JSON
//! document, rewritten wholesale after every submission, so a restart keeps
//! the records.

use crate::error::ConsentResult;
use crate::models::credential::Credential;
use crate::utils::serialization::{deserialize, serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Repository interface for attribute records, keyed by DID.
pub trait CredentialStore: Send + Sync {
    /// Stores (or fully replaces) the record for `did`.
    fn store_credential(&self, did: &str, credential: Credential) -> ConsentResult<()>;

    /// Returns a snapshot of the record for `did`.
    fn get_credential(&self, did: &str) -> Option<Credential>;

    fn contains_credential(&self, did: &str) -> bool {
        self.get_credential(did).is_some()
    }

    fn count_credentials(&self) -> usize;
}

/// In-memory credential storage guarded by a single `RwLock`, optionally
/// mirrored to a JSON file.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    credentials: RwLock<HashMap<String, Credential>>,
    backing_file: Option<PathBuf>,
}

impl InMemoryCredentialStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a store previously written by [`save_to_file`](Self::save_to_file).
    /// A missing file yields an empty store.
    pub fn load_from_file(path: &Path) -> ConsentResult<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let raw = fs::read_to_string(path)?;
        let credentials: HashMap<String, Credential> = deserialize(&raw)?;
        log::debug!("loaded {} credential records from {}", credentials.len(), path.display());
        Ok(Self {
            credentials: RwLock::new(credentials),
            backing_file: None,
        })
    }

    /// Loads `path` (if present) and rewrites it after every submission.
    pub fn with_backing_file(path: impl Into<PathBuf>) -> ConsentResult<Self> {
        let path = path.into();
        let mut store = Self::load_from_file(&path)?;
        store.backing_file = Some(path);
        Ok(store)
    }

    /// Writes every record as one JSON document, replacing the file wholesale.
    pub fn save_to_file(&self, path: &Path) -> ConsentResult<()> {
        let guard = self.credentials.read().unwrap_or_else(|e| e.into_inner());
        write_snapshot(path, &guard)
    }
}

fn write_snapshot(path: &Path, records: &HashMap<String, Credential>) -> ConsentResult<()> {
    let json = serialize(records)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl CredentialStore for InMemoryCredentialStore {
    fn store_credential(&self, did: &str, credential: Credential) -> ConsentResult<()> {
        let mut guard = self.credentials.write().unwrap_or_else(|e| e.into_inner());
        match &self.backing_file {
            // Memory only changes once the file write succeeded.
            Some(path) => {
                let mut next = guard.clone();
                next.insert(did.to_string(), credential);
                write_snapshot(path, &next)?;
                *guard = next;
            }
            None => {
                guard.insert(did.to_string(), credential);
            }
        }
        Ok(())
    }

    fn get_credential(&self, did: &str) -> Option<Credential> {
        let guard = self.credentials.read().unwrap_or_else(|e| e.into_inner());
        guard.get(did).cloned()
    }

    fn count_credentials(&self) -> usize {
        self.credentials.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}
