// src/services/authenticator.rs
//! Challenge-response authentication.
//!
//! Per login attempt: `Start -> ChallengeIssued -> {Verified, Failed}`.
//! A challenge is a random nonce bound to one DID. It is consumed by the first
//! verification attempt, successful or not, and lapses after a configurable
//! window.

use crate::error::{AuthFailure, ConsentError, ConsentResult};
use crate::services::identity_registry::IdentityRegistry;
use crate::utils::clock::Clock;
use crate::utils::crypto::random_id;
use crate::wallet::key_management::{verify_message, KeyManager};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A pending login challenge. Single use, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub did: String,
    pub nonce: String,
    pub issued_at: DateTime<Utc>,
}

/// Proof that `did` passed challenge-response authentication.
///
/// Only this crate can mint one, so holding it is the capability required by
/// signing operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSubject {
    did: String,
    verified_at: DateTime<Utc>,
}

impl VerifiedSubject {
    pub(crate) fn new(did: impl Into<String>, verified_at: DateTime<Utc>) -> Self {
        Self {
            did: did.into(),
            verified_at,
        }
    }

    pub fn did(&self) -> &str {
        &self.did
    }

    pub fn verified_at(&self) -> DateTime<Utc> {
        self.verified_at
    }
}

pub struct Authenticator {
    registry: Arc<dyn IdentityRegistry>,
    clock: Arc<dyn Clock>,
    challenge_ttl: TimeDelta,
    pending: Mutex<HashMap<String, Challenge>>,
}

impl Authenticator {
    pub fn new(
        registry: Arc<dyn IdentityRegistry>,
        clock: Arc<dyn Clock>,
        challenge_ttl: TimeDelta,
    ) -> Self {
        Self {
            registry,
            clock,
            challenge_ttl,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Issues a fresh nonce for `did`.
    ///
    /// # Errors
    /// `NotFound` if the DID is not registered.
    pub fn begin(&self, did: &str) -> ConsentResult<Challenge> {
        let did = did.trim();
        self.registry.lookup(did)?;

        let now = self.clock.now();
        let challenge = Challenge {
            did: did.to_string(),
            nonce: random_id(),
            issued_at: now,
        };

        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.retain(|_, c| self.deadline(c).map_or(true, |deadline| now <= deadline));
        pending.insert(challenge.nonce.clone(), challenge.clone());

        log::debug!("issued challenge for {}", did);
        Ok(challenge)
    }

    /// Verifies a client-side signature over the nonce.
    ///
    /// # Errors
    /// - `AuthFailed(UnknownChallenge)` if the nonce was never issued to `did` or was used
    /// - `AuthFailed(ChallengeExpired)` if the window lapsed
    /// - `AuthFailed(BadSignature)` if the signature does not verify under the registered key
    pub fn verify(&self, did: &str, nonce: &str, signature: &[u8]) -> ConsentResult<VerifiedSubject> {
        let challenge = self.take_challenge(did.trim(), nonce.trim())?;
        let identity = self.registry.lookup(&challenge.did)?;

        if !verify_message(&identity.public_key, challenge.nonce.as_bytes(), signature) {
            log::warn!("bad signature on challenge for {}", challenge.did);
            return Err(ConsentError::AuthFailed(AuthFailure::BadSignature));
        }
        Ok(self.verified(challenge))
    }

    /// Self-custody login: the subject hands over the private key, the server
    /// checks it belongs to the DID, signs the nonce with it and verifies that
    /// signature against the registered public key.
    ///
    /// # Errors
    /// As [`verify`](Self::verify), plus `AuthFailed(KeyMismatch)` when the key
    /// does not correspond to the registered public key.
    pub fn verify_with_private_key(
        &self,
        did: &str,
        nonce: &str,
        private_key: &[u8],
    ) -> ConsentResult<VerifiedSubject> {
        let challenge = self.take_challenge(did.trim(), nonce.trim())?;
        let identity = self.registry.lookup(&challenge.did)?;

        let key_manager = KeyManager::from_private_key(private_key)
            .map_err(|_| ConsentError::AuthFailed(AuthFailure::KeyMismatch))?;
        if key_manager.public_key_bytes() != identity.public_key {
            log::warn!("private key mismatch for {}", challenge.did);
            return Err(ConsentError::AuthFailed(AuthFailure::KeyMismatch));
        }

        let signature = key_manager.sign_message(challenge.nonce.as_bytes())?;
        if !verify_message(&identity.public_key, challenge.nonce.as_bytes(), &signature) {
            return Err(ConsentError::AuthFailed(AuthFailure::BadSignature));
        }
        Ok(self.verified(challenge))
    }

    /// Number of challenges awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn take_challenge(&self, did: &str, nonce: &str) -> ConsentResult<Challenge> {
        let challenge = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            let bound_to_did = pending.get(nonce).map_or(false, |c| c.did == did);
            if bound_to_did {
                pending.remove(nonce)
            } else {
                None
            }
        }
        .ok_or(ConsentError::AuthFailed(AuthFailure::UnknownChallenge))?;

        if self.clock.now() > self.deadline(&challenge)? {
            return Err(ConsentError::AuthFailed(AuthFailure::ChallengeExpired));
        }
        Ok(challenge)
    }

    fn deadline(&self, challenge: &Challenge) -> ConsentResult<DateTime<Utc>> {
        challenge
            .issued_at
            .checked_add_signed(self.challenge_ttl)
            .ok_or_else(|| ConsentError::InvalidInput("challenge window out of range".into()))
    }

    fn verified(&self, challenge: Challenge) -> VerifiedSubject {
        log::info!("authenticated {}", challenge.did);
        VerifiedSubject::new(challenge.did, self.clock.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::identity_registry::InMemoryIdentityRegistry;
    use crate::utils::clock::ManualClock;
    use chrono::TimeZone;

    fn setup() -> (Authenticator, Arc<InMemoryIdentityRegistry>, Arc<ManualClock>) {
        let registry = Arc::new(InMemoryIdentityRegistry::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
        ));
        let auth = Authenticator::new(registry.clone(), clock.clone(), TimeDelta::seconds(120));
        (auth, registry, clock)
    }

    #[test]
    fn test_client_signature_login() {
        let (auth, registry, _) = setup();
        let identity = registry.register().unwrap();
        let challenge = auth.begin(&identity.did).unwrap();

        let km = KeyManager::from_private_key(&identity.private_key).unwrap();
        let sig = km.sign_message(challenge.nonce.as_bytes()).unwrap();

        let subject = auth.verify(&identity.did, &challenge.nonce, &sig).unwrap();
        assert_eq!(subject.did(), identity.did);
        assert_eq!(auth.pending_count(), 0);
    }

    #[test]
    fn test_begin_requires_registered_did() {
        let (auth, _, _) = setup();
        assert!(matches!(
            auth.begin("did:pg:nobody"),
            Err(ConsentError::NotFound(_))
        ));
    }

    #[test]
    fn test_forged_signature_rejected() {
        let (auth, registry, _) = setup();
        let identity = registry.register().unwrap();
        let challenge = auth.begin(&identity.did).unwrap();

        let impostor = KeyManager::new();
        let sig = impostor.sign_message(challenge.nonce.as_bytes()).unwrap();
        assert!(matches!(
            auth.verify(&identity.did, &challenge.nonce, &sig),
            Err(ConsentError::AuthFailed(AuthFailure::BadSignature))
        ));
    }

    #[test]
    fn test_garbage_signature_rejected() {
        let (auth, registry, _) = setup();
        let identity = registry.register().unwrap();
        let challenge = auth.begin(&identity.did).unwrap();
        assert!(matches!(
            auth.verify(&identity.did, &challenge.nonce, b"always-true?"),
            Err(ConsentError::AuthFailed(AuthFailure::BadSignature))
        ));
    }

    #[test]
    fn test_challenge_is_single_use() {
        let (auth, registry, _) = setup();
        let identity = registry.register().unwrap();
        let challenge = auth.begin(&identity.did).unwrap();

        auth.verify_with_private_key(&identity.did, &challenge.nonce, &identity.private_key)
            .unwrap();
        assert!(matches!(
            auth.verify_with_private_key(&identity.did, &challenge.nonce, &identity.private_key),
            Err(ConsentError::AuthFailed(AuthFailure::UnknownChallenge))
        ));
    }

    #[test]
    fn test_wrong_private_key_is_key_mismatch() {
        let (auth, registry, _) = setup();
        let identity = registry.register().unwrap();
        let other = registry.register().unwrap();
        let challenge = auth.begin(&identity.did).unwrap();

        assert!(matches!(
            auth.verify_with_private_key(&identity.did, &challenge.nonce, &other.private_key),
            Err(ConsentError::AuthFailed(AuthFailure::KeyMismatch))
        ));
        assert!(matches!(
            auth.begin(&identity.did).and_then(|c| auth.verify_with_private_key(
                &identity.did,
                &c.nonce,
                b"not a key"
            )),
            Err(ConsentError::AuthFailed(AuthFailure::KeyMismatch))
        ));
    }

    #[test]
    fn test_nonce_bound_to_did() {
        let (auth, registry, _) = setup();
        let alice = registry.register().unwrap();
        let bob = registry.register().unwrap();
        let challenge = auth.begin(&alice.did).unwrap();

        assert!(matches!(
            auth.verify_with_private_key(&bob.did, &challenge.nonce, &bob.private_key),
            Err(ConsentError::AuthFailed(AuthFailure::UnknownChallenge))
        ));
        // Alice's challenge survives the misdirected attempt.
        assert!(auth
            .verify_with_private_key(&alice.did, &challenge.nonce, &alice.private_key)
            .is_ok());
    }

    #[test]
    fn test_unbounded_window_errors_instead_of_overflowing() {
        let registry = Arc::new(InMemoryIdentityRegistry::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
        ));
        let auth = Authenticator::new(registry.clone(), clock, TimeDelta::MAX);
        let identity = registry.register().unwrap();

        let challenge = auth.begin(&identity.did).unwrap();
        // A second begin sweeps pending challenges with the same window.
        auth.begin(&identity.did).unwrap();
        assert!(matches!(
            auth.verify_with_private_key(&identity.did, &challenge.nonce, &identity.private_key),
            Err(ConsentError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_challenge_expires() {
        let (auth, registry, clock) = setup();
        let identity = registry.register().unwrap();
        let challenge = auth.begin(&identity.did).unwrap();

        clock.advance(TimeDelta::seconds(121));
        assert!(matches!(
            auth.verify_with_private_key(&identity.did, &challenge.nonce, &identity.private_key),
            Err(ConsentError::AuthFailed(AuthFailure::ChallengeExpired))
        ));
    }
}
