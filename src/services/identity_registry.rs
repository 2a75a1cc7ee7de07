// src/services/identity_registry.rs
//! Identity Registry
//!
//! Maps DIDs to their keypairs. The registry is the only source of signing
//! identity: authentication, VC signing and VC verification all resolve keys
//! through it. Entries are never rotated or deleted.

use crate::error::{ConsentError, ConsentResult};
use crate::models::did::{DidDocument, Identity};
use crate::wallet::key_management::KeyManager;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::RwLock;

/// Repository interface for DID identities.
pub trait IdentityRegistry: Send + Sync {
    /// Generates a keypair, derives its DID and records the mapping.
    fn register(&self) -> ConsentResult<Identity>;

    /// Returns the identity registered under `did`.
    fn lookup(&self, did: &str) -> ConsentResult<Identity>;

    /// Public view of `did`, suitable for relying parties.
    fn resolve(&self, did: &str) -> ConsentResult<DidDocument> {
        self.lookup(did).map(|identity| identity.public_document())
    }

    fn count(&self) -> usize;
}

/// Registry held in process memory behind one `RwLock`.
#[derive(Default)]
pub struct InMemoryIdentityRegistry {
    identities: RwLock<HashMap<String, Identity>>,
}

impl InMemoryIdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityRegistry for InMemoryIdentityRegistry {
    fn register(&self) -> ConsentResult<Identity> {
        let identity = KeyManager::new().to_identity();

        let mut guard = self.identities.write().unwrap_or_else(|e| e.into_inner());
        match guard.entry(identity.did.clone()) {
            Entry::Occupied(_) => {
                // 128-bit digest prefix; only reachable if the RNG is broken.
                log::error!("DID collision on {}", identity.did);
                Err(ConsentError::Crypto(format!("DID collision: {}", identity.did)))
            }
            Entry::Vacant(slot) => {
                slot.insert(identity.clone());
                log::info!("registered identity {}", identity.did);
                Ok(identity)
            }
        }
    }

    fn lookup(&self, did: &str) -> ConsentResult<Identity> {
        let guard = self.identities.read().unwrap_or_else(|e| e.into_inner());
        guard
            .get(did.trim())
            .cloned()
            .ok_or_else(|| ConsentError::NotFound(format!("DID {}", did)))
    }

    fn count(&self) -> usize {
        self.identities.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}
