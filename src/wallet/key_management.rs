// src/wallet/key_management.rs
//! Cryptographic key management for DID identities.
//!
//! Provides generation, import, and usage of secp256k1 keys for:
//! - Challenge signing during login
//! - Verifiable Credential signatures
//! - DID derivation
//!
//! Uses the following cryptographic primitives:
//! - secp256k1 curve (via `k256` crate)
//! - SHA-256 prehashing (via `ring`)
//! - Operating-system random number generation

use crate::error::{ConsentError, ConsentResult};
use crate::models::did::{derive_did, Identity};
use crate::utils::crypto::hash_data;
use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

/// Key management for one secp256k1 keypair.
///
/// # Security Notes
/// - Secret keys are zeroized on drop by `k256`
/// - Uses deterministic ECDSA (RFC 6979), so signing needs no randomness
#[derive(Clone)]
pub struct KeyManager {
    secret_key: SecretKey,
    /// Derived public key for verification
    pub public_key: PublicKey,
}

impl KeyManager {
    /// Generates a new KeyManager with a fresh random key from the OS RNG.
    pub fn new() -> Self {
        let secret_key = SecretKey::random(&mut OsRng);
        let public_key = secret_key.public_key();
        KeyManager {
            secret_key,
            public_key,
        }
    }

    /// Imports a raw 32-byte private scalar.
    ///
    /// # Errors
    /// `Crypto` if the bytes are not a valid non-zero scalar.
    pub fn from_private_key(bytes: &[u8]) -> ConsentResult<Self> {
        let secret_key = SecretKey::from_slice(bytes)
            .map_err(|_| ConsentError::Crypto("invalid secp256k1 private key".into()))?;
        let public_key = secret_key.public_key();
        Ok(KeyManager {
            secret_key,
            public_key,
        })
    }

    /// Uncompressed SEC1 encoding (65 bytes, leading `0x04`).
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.public_key.to_encoded_point(false).as_bytes().to_vec()
    }

    pub fn private_key_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.secret_key.to_bytes().to_vec())
    }

    /// The DID this keypair certifies.
    pub fn did(&self) -> String {
        derive_did(&self.public_key_bytes())
    }

    /// Packages the keypair as a registry [`Identity`].
    pub fn to_identity(&self) -> Identity {
        Identity {
            did: self.did(),
            public_key: self.public_key_bytes(),
            private_key: self.private_key_bytes().to_vec(),
        }
    }

    /// Signs a message using ECDSA (secp256k1) with SHA-256 prehashing.
    ///
    /// # Returns
    /// 64-byte compact ECDSA signature (R || S values)
    pub fn sign_message(&self, message: &[u8]) -> ConsentResult<Vec<u8>> {
        let hash = hash_data(message);
        let signing_key = SigningKey::from(&self.secret_key);
        let signature: Signature = signing_key
            .sign_prehash(&hash)
            .map_err(|e| ConsentError::Crypto(format!("signing failed: {}", e)))?;
        Ok(signature.to_bytes().to_vec())
    }
}

impl Default for KeyManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Verifies a compact ECDSA signature over `message` against an SEC1 public key.
///
/// Malformed keys or signatures verify as `false`.
pub fn verify_message(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_sec1_bytes(public_key) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    let hash = hash_data(message);
    verifying_key.verify_prehash(&hash, &signature).is_ok()
}
