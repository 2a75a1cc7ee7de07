// src/models/did.rs
//! Decentralized Identifier (DID) data model.
//!
//! A DID here is self-certifying: `did:pg:` followed by the first 32 hex
//! characters (128 bits) of the SHA-256 of the subject's uncompressed SEC1
//! public key.

use crate::utils::crypto::hash_hex;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

/// Method tag prefixed to every DID this system mints.
pub const DID_METHOD_PREFIX: &str = "did:pg:";

/// Hex characters of the public-key digest retained in a DID.
pub const DID_DIGEST_HEX_LEN: usize = 32;

/// Derives the DID for a public key.
pub fn derive_did(public_key: &[u8]) -> String {
    let digest = hash_hex(public_key);
    format!("{}{}", DID_METHOD_PREFIX, &digest[..DID_DIGEST_HEX_LEN])
}

/// A registered identity: DID plus its secp256k1 keypair.
///
/// The mapping DID → keys never changes once created. The private key is kept
/// only for self-custody demos; it is redacted from `Debug` output and wiped on drop.
///
/// # Fields
/// - `did`: `did:pg:<32 hex>` identifier
/// - `public_key`: 65-byte uncompressed SEC1 point
/// - `private_key`: 32-byte secp256k1 scalar
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub did: String,
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub private_key: Vec<u8>,
}

impl Identity {
    /// The public half, safe to hand to relying parties.
    pub fn public_document(&self) -> DidDocument {
        DidDocument {
            id: self.did.clone(),
            public_key: self.public_key.clone(),
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("did", &self.did)
            .field("public_key", &hex::encode(&self.public_key))
            .field("private_key", &"<redacted>")
            .finish()
    }
}

impl Drop for Identity {
    fn drop(&mut self) {
        self.private_key.zeroize();
    }
}

/// Public view of an identity, as returned by DID resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DidDocument {
    /// The complete DID string identifier
    pub id: String,

    /// Uncompressed SEC1 public key bytes
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
}

/// Serde adapter rendering byte vectors as lowercase hex strings.
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_did_shape_and_determinism() {
        let did = derive_did(b"some public key");
        assert!(did.starts_with(DID_METHOD_PREFIX));
        assert_eq!(did.len(), DID_METHOD_PREFIX.len() + DID_DIGEST_HEX_LEN);
        assert_eq!(did, derive_did(b"some public key"));
        assert_ne!(did, derive_did(b"another public key"));
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let identity = Identity {
            did: "did:pg:00".into(),
            public_key: vec![4, 1, 2],
            private_key: vec![0xAA, 0xBB],
        };
        let shown = format!("{:?}", identity);
        assert!(shown.contains("<redacted>"));
        assert!(!shown.contains("aabb"));
    }
}
