// src/services/consent.rs
//! Consent Vault
//!
//! Orchestrates the four lifecycle operations a presentation layer calls:
//! register, request-disclosure (value, predicate or file), redeem and revoke.
//! Every store is injected behind its repository trait so the vault can run
//! fully in memory for tests or against the filesystem in production.

use crate::error::{ConsentError, ConsentResult};
use crate::models::credential::{AttributeValue, Credential, VerifiableCredential};
use crate::models::did::{DidDocument, Identity};
use crate::models::token::{AccessToken, Disclosure, FileReference, Operator, TokenSummary};
use crate::services::authenticator::{Authenticator, Challenge, VerifiedSubject};
use crate::services::disclosure::DisclosureEngine;
use crate::services::identity_registry::{IdentityRegistry, InMemoryIdentityRegistry};
use crate::services::token_ledger::{InMemoryTokenStore, TokenLedger, TokenStore};
use crate::sharing::{self, SecretShare};
use crate::storage::blob_store::{BlobStore, InMemoryBlobStore};
use crate::utils::clock::{max_window, Clock};
use crate::utils::crypto::random_id;
use crate::utils::encryption::{
    decrypt_buffer, encrypt_buffer, file_key_from_slice, generate_file_key, FileKey,
};
use crate::wallet::credential_storage::{CredentialStore, InMemoryCredentialStore};
use crate::wallet::key_management::{verify_message, KeyManager};
use chrono::TimeDelta;
use std::sync::Arc;

/// Tunables for file sharing and login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultSettings {
    /// Shares produced per encrypted file (`n`).
    pub share_total: usize,
    /// Shares needed to recover a file key (`k`).
    pub share_threshold: usize,
    pub challenge_ttl: TimeDelta,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            share_total: 3,
            share_threshold: 2,
            challenge_ttl: TimeDelta::seconds(120),
        }
    }
}

impl VaultSettings {
    pub fn validate(&self) -> ConsentResult<()> {
        if self.share_threshold == 0
            || self.share_threshold > self.share_total
            || self.share_total > sharing::shamir::MAX_SHARES
        {
            return Err(ConsentError::InvalidThreshold(format!(
                "need 1 <= k <= n <= {}, got k={} n={}",
                sharing::shamir::MAX_SHARES,
                self.share_threshold,
                self.share_total
            )));
        }
        if self.challenge_ttl <= TimeDelta::zero() || self.challenge_ttl > max_window() {
            return Err(ConsentError::InvalidInput(
                "challenge ttl must be positive and at most one year".into(),
            ));
        }
        Ok(())
    }
}

/// An uploaded file awaiting disclosure.
#[derive(Clone)]
pub struct FileUpload {
    pub name: Option<String>,
    pub bytes: Vec<u8>,
}

pub struct ConsentVault {
    identities: Arc<dyn IdentityRegistry>,
    credentials: Arc<dyn CredentialStore>,
    blobs: Arc<dyn BlobStore>,
    authenticator: Authenticator,
    engine: DisclosureEngine,
    ledger: TokenLedger,
    clock: Arc<dyn Clock>,
    settings: VaultSettings,
}

impl ConsentVault {
    /// Wires the vault from its collaborators.
    ///
    /// # Errors
    /// `InvalidThreshold`/`InvalidInput` when `settings` do not validate.
    pub fn new(
        identities: Arc<dyn IdentityRegistry>,
        credentials: Arc<dyn CredentialStore>,
        tokens: Arc<dyn TokenStore>,
        blobs: Arc<dyn BlobStore>,
        clock: Arc<dyn Clock>,
        settings: VaultSettings,
    ) -> ConsentResult<Self> {
        settings.validate()?;
        Ok(Self {
            authenticator: Authenticator::new(
                identities.clone(),
                clock.clone(),
                settings.challenge_ttl,
            ),
            engine: DisclosureEngine::new(clock.clone()),
            ledger: TokenLedger::new(tokens, clock.clone()),
            clock,
            identities,
            credentials,
            blobs,
            settings,
        })
    }

    /// A vault whose every store lives in process memory.
    pub fn in_memory(clock: Arc<dyn Clock>, settings: VaultSettings) -> ConsentResult<Self> {
        Self::new(
            Arc::new(InMemoryIdentityRegistry::new()),
            Arc::new(InMemoryCredentialStore::new()),
            Arc::new(InMemoryTokenStore::new()),
            Arc::new(InMemoryBlobStore::new()),
            clock,
            settings,
        )
    }

    pub fn settings(&self) -> &VaultSettings {
        &self.settings
    }

    // Identity and login

    pub fn register(&self) -> ConsentResult<Identity> {
        self.identities.register()
    }

    pub fn resolve(&self, did: &str) -> ConsentResult<DidDocument> {
        self.identities.resolve(did)
    }

    pub fn begin_login(&self, did: &str) -> ConsentResult<Challenge> {
        self.authenticator.begin(did)
    }

    pub fn verify_login(
        &self,
        did: &str,
        nonce: &str,
        signature: &[u8],
    ) -> ConsentResult<VerifiedSubject> {
        self.authenticator.verify(did, nonce, signature)
    }

    pub fn verify_login_with_private_key(
        &self,
        did: &str,
        nonce: &str,
        private_key: &[u8],
    ) -> ConsentResult<VerifiedSubject> {
        self.authenticator
            .verify_with_private_key(did, nonce, private_key)
    }

    // Credentials

    /// Stores (or replaces) the attribute record of a registered subject.
    pub fn submit_credential(&self, did: &str, credential: Credential) -> ConsentResult<()> {
        let did = did.trim();
        self.identities.lookup(did)?;
        self.credentials.store_credential(did, credential)?;
        log::info!("stored credential record for {}", did);
        Ok(())
    }

    pub fn credential(&self, did: &str) -> ConsentResult<Credential> {
        self.credentials
            .get_credential(did.trim())
            .ok_or_else(|| ConsentError::NotFound(format!("credential for {}", did.trim())))
    }

    // Disclosure requests

    /// Issues a token that discloses one raw attribute of `did`'s record.
    pub fn request_value(
        &self,
        did: &str,
        field: &str,
        ttl: Option<TimeDelta>,
    ) -> ConsentResult<AccessToken> {
        let credential = self.credential(did)?;
        let disclosure = self.engine.disclose_value(&credential, field)?;
        self.ledger.issue(did.trim(), disclosure, ttl)
    }

    /// Evaluates a predicate over `did`'s record now and issues a token that
    /// carries only the boolean outcome.
    pub fn request_predicate(
        &self,
        did: &str,
        operator: Operator,
        field: &str,
        comparand: AttributeValue,
        ttl: Option<TimeDelta>,
    ) -> ConsentResult<AccessToken> {
        let credential = self.credential(did)?;
        let disclosure = self
            .engine
            .disclose_predicate(&credential, operator, field, comparand)?;
        self.ledger.issue(did.trim(), disclosure, ttl)
    }

    /// Stores a file for `did` and issues a token referencing it.
    ///
    /// With `encrypt`, the file is sealed under a fresh AES-256-GCM key, the
    /// ciphertext is stored, and the key is split into
    /// `share_threshold`-of-`share_total` shares carried by the token.
    pub fn request_file(
        &self,
        did: &str,
        upload: FileUpload,
        encrypt: bool,
        ttl: Option<TimeDelta>,
    ) -> ConsentResult<AccessToken> {
        let did = did.trim();
        self.identities.lookup(did)?;
        if upload.bytes.is_empty() {
            return Err(ConsentError::InvalidInput("empty file".into()));
        }

        let (stored, key_shares) = if encrypt {
            let key = generate_file_key();
            let sealed = encrypt_buffer(&key, &upload.bytes)?;
            let shares = sharing::split(
                key.as_slice(),
                self.settings.share_total,
                self.settings.share_threshold,
            )?;
            (sealed, Some(shares))
        } else {
            (upload.bytes, None)
        };

        let content_address = self.blobs.put(&stored)?;
        let reference = FileReference {
            retrieval_locator: self.blobs.locator(&content_address),
            content_address,
            file_name: upload.name,
            encrypted: encrypt,
            key_shares,
        };
        self.ledger.issue(did, Disclosure::File(reference), ttl)
    }

    // Token lifecycle

    pub fn redeem(&self, token_id: &str) -> ConsentResult<Disclosure> {
        self.ledger.redeem(token_id)
    }

    /// Revokes a token `did` granted. Other subjects' tokens are `NotFound`.
    pub fn revoke(&self, did: &str, token_id: &str) -> ConsentResult<AccessToken> {
        self.ledger.revoke(did.trim(), token_id)
    }

    /// The tokens `did` has granted, newest first.
    pub fn tokens(&self, did: &str) -> Vec<TokenSummary> {
        self.ledger.list(did.trim())
    }

    // Files

    /// Reconstructs a file key from at least `share_threshold` shares.
    pub fn recover_file_key(&self, shares: &[SecretShare]) -> ConsentResult<FileKey> {
        let secret = zeroize::Zeroizing::new(sharing::recover(shares)?);
        file_key_from_slice(&secret)
    }

    /// Fetches an encrypted blob and decrypts it with the recovered key.
    pub fn open_file(&self, address: &str, shares: &[SecretShare]) -> ConsentResult<Vec<u8>> {
        let key = self.recover_file_key(shares)?;
        let sealed = self.blobs.get(address.trim())?;
        decrypt_buffer(&key, &sealed)
    }

    /// Raw stored bytes (ciphertext for encrypted files).
    pub fn fetch_blob(&self, address: &str) -> ConsentResult<Vec<u8>> {
        self.blobs.get(address.trim())
    }

    // Verifiable credentials

    /// Signs a credential with the authenticated subject's registered key.
    pub fn sign_credential(
        &self,
        issuer: &VerifiedSubject,
        subject: &str,
        claims: serde_json::Value,
    ) -> ConsentResult<VerifiableCredential> {
        let identity = self.identities.lookup(issuer.did())?;
        let key_manager = KeyManager::from_private_key(&identity.private_key)?;

        let mut vc = VerifiableCredential {
            id: format!("urn:pg:vc:{}", random_id()),
            issuer: identity.did.clone(),
            subject: subject.trim().to_string(),
            claims,
            issued_at: self.clock.now(),
            signature: Vec::new(),
        };
        vc.signature = key_manager.sign_message(&vc.signing_input()?)?;
        log::info!("{} signed credential {}", vc.issuer, vc.id);
        Ok(vc)
    }

    /// Checks a credential's signature against its issuer's registered key.
    ///
    /// # Errors
    /// `NotFound` when the issuer DID is not registered.
    pub fn verify_credential(&self, vc: &VerifiableCredential) -> ConsentResult<bool> {
        let issuer = self.identities.resolve(&vc.issuer)?;
        Ok(verify_message(
            &issuer.public_key,
            &vc.signing_input()?,
            &vc.signature,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DenialReason;
    use crate::utils::clock::ManualClock;
    use chrono::{NaiveDate, TimeZone, Utc};
    use serde_json::json;

    fn vault() -> (ConsentVault, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap(),
        ));
        let vault = ConsentVault::in_memory(clock.clone(), VaultSettings::default()).unwrap();
        (vault, clock)
    }

    fn enrolled(vault: &ConsentVault) -> Identity {
        let identity = vault.register().unwrap();
        vault
            .submit_credential(
                &identity.did,
                Credential::from_submission(
                    "Asha Verma",
                    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
                    "F",
                    "1234-5678-9012",
                ),
            )
            .unwrap();
        identity
    }

    fn login(vault: &ConsentVault, identity: &Identity) -> VerifiedSubject {
        let challenge = vault.begin_login(&identity.did).unwrap();
        vault
            .verify_login_with_private_key(&identity.did, &challenge.nonce, &identity.private_key)
            .unwrap()
    }

    #[test]
    fn test_value_token_returns_stored_name() {
        let (vault, _) = vault();
        let identity = enrolled(&vault);

        let token = vault.request_value(&identity.did, "name", None).unwrap();
        let first = vault.redeem(&token.token_id).unwrap();
        let second = vault.redeem(&token.token_id).unwrap();

        assert_eq!(
            first,
            Disclosure::Value {
                field: "name".into(),
                value: AttributeValue::Text("Asha Verma".into()),
            }
        );
        assert_eq!(first, second);
    }

    #[test]
    fn test_forbidden_field_issues_nothing() {
        let (vault, _) = vault();
        let identity = enrolled(&vault);
        assert!(matches!(
            vault.request_value(&identity.did, "password", None),
            Err(ConsentError::Forbidden(_))
        ));
        assert!(vault.tokens(&identity.did).is_empty());
    }

    #[test]
    fn test_predicate_is_frozen_at_issuance() {
        let (vault, _) = vault();
        let identity = enrolled(&vault);
        let token = vault
            .request_predicate(
                &identity.did,
                Operator::Ge,
                "age",
                AttributeValue::Integer(18),
                Some(TimeDelta::seconds(300)),
            )
            .unwrap();

        // A later resubmission does not change what the token says.
        vault
            .submit_credential(
                &identity.did,
                Credential::from_submission(
                    "Asha Verma",
                    NaiveDate::from_ymd_opt(2015, 1, 1).unwrap(),
                    "F",
                    "1234-5678-9012",
                ),
            )
            .unwrap();

        match vault.redeem(&token.token_id).unwrap() {
            Disclosure::Predicate { result, .. } => assert!(result),
            other => panic!("unexpected disclosure {:?}", other),
        }
    }

    #[test]
    fn test_credential_requires_registered_did() {
        let (vault, _) = vault();
        let cred = Credential::from_submission(
            "X",
            NaiveDate::from_ymd_opt(1999, 9, 9).unwrap(),
            "M",
            "1",
        );
        assert!(matches!(
            vault.submit_credential("did:pg:unknown", cred),
            Err(ConsentError::NotFound(_))
        ));
        assert!(matches!(
            vault.request_value("did:pg:unknown", "name", None),
            Err(ConsentError::NotFound(_))
        ));
    }

    #[test]
    fn test_encrypted_file_recovers_from_any_threshold_subset() {
        let (vault, _) = vault();
        let owner = vault.register().unwrap();
        let original = b"%PDF-1.7 scanned passport page".to_vec();
        let token = vault
            .request_file(
                &owner.did,
                FileUpload {
                    name: Some("passport.pdf".into()),
                    bytes: original.clone(),
                },
                true,
                None,
            )
            .unwrap();

        let reference = match vault.redeem(&token.token_id).unwrap() {
            Disclosure::File(reference) => reference,
            other => panic!("unexpected disclosure {:?}", other),
        };
        assert!(reference.encrypted);
        assert_eq!(reference.file_name.as_deref(), Some("passport.pdf"));
        assert_eq!(
            reference.retrieval_locator,
            format!("/blobs/{}", reference.content_address)
        );
        assert_ne!(vault.fetch_blob(&reference.content_address).unwrap(), original);

        let shares = reference.key_shares.unwrap();
        assert_eq!(shares.len(), 3);
        for (a, b) in [(0, 1), (0, 2), (1, 2)] {
            let pair = [shares[a].clone(), shares[b].clone()];
            let opened = vault.open_file(&reference.content_address, &pair).unwrap();
            assert_eq!(opened, original);
        }

        assert!(matches!(
            vault.open_file(&reference.content_address, &shares[..1]),
            Err(ConsentError::InsufficientShares { needed: 2, supplied: 1 })
        ));
    }

    #[test]
    fn test_plain_file_has_no_shares() {
        let (vault, _) = vault();
        let owner = vault.register().unwrap();
        let token = vault
            .request_file(
                &owner.did,
                FileUpload {
                    name: None,
                    bytes: b"hello".to_vec(),
                },
                false,
                None,
            )
            .unwrap();
        match vault.redeem(&token.token_id).unwrap() {
            Disclosure::File(reference) => {
                assert!(!reference.encrypted);
                assert!(reference.key_shares.is_none());
                assert_eq!(
                    vault.fetch_blob(&reference.content_address).unwrap(),
                    b"hello"
                );
            }
            other => panic!("unexpected disclosure {:?}", other),
        }
    }

    #[test]
    fn test_revoked_token_is_denied() {
        let (vault, clock) = vault();
        let identity = enrolled(&vault);
        let token = vault
            .request_value(&identity.did, "gender", Some(TimeDelta::seconds(60)))
            .unwrap();
        vault.revoke(&identity.did, &token.token_id).unwrap();
        clock.advance(TimeDelta::seconds(1));
        assert!(matches!(
            vault.redeem(&token.token_id),
            Err(ConsentError::Denied(DenialReason::Revoked))
        ));
        assert!(vault.tokens(&identity.did)[0].revoked);
    }

    #[test]
    fn test_signed_credential_verifies() {
        let (vault, _) = vault();
        let issuer = vault.register().unwrap();
        let subject = login(&vault, &issuer);

        let mut vc = vault
            .sign_credential(&subject, "did:pg:holder", json!({"degree": "BSc"}))
            .unwrap();
        assert_eq!(vc.issuer, issuer.did);
        assert!(vault.verify_credential(&vc).unwrap());

        vc.claims = json!({"degree": "PhD"});
        assert!(!vault.verify_credential(&vc).unwrap());

        vc.issuer = "did:pg:nobody".into();
        assert!(matches!(
            vault.verify_credential(&vc),
            Err(ConsentError::NotFound(_))
        ));
    }

    #[test]
    fn test_settings_validation() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));
        let bad = VaultSettings {
            share_total: 2,
            share_threshold: 3,
            ..VaultSettings::default()
        };
        assert!(matches!(
            ConsentVault::in_memory(clock.clone(), bad),
            Err(ConsentError::InvalidThreshold(_))
        ));

        let endless = VaultSettings {
            challenge_ttl: TimeDelta::MAX,
            ..VaultSettings::default()
        };
        assert!(matches!(
            ConsentVault::in_memory(clock, endless),
            Err(ConsentError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_tokens_are_scoped_to_their_owner() {
        let (vault, _) = vault();
        let alice = enrolled(&vault);
        let mallory = enrolled(&vault);
        let token = vault.request_value(&alice.did, "name", None).unwrap();
        assert_eq!(token.owner, alice.did);

        assert!(vault.tokens(&mallory.did).is_empty());
        assert!(matches!(
            vault.revoke(&mallory.did, &token.token_id),
            Err(ConsentError::NotFound(_))
        ));
        assert!(vault.redeem(&token.token_id).is_ok());
        assert_eq!(vault.tokens(&alice.did).len(), 1);
    }

    #[test]
    fn test_file_request_requires_registered_did() {
        let (vault, _) = vault();
        let upload = FileUpload {
            name: None,
            bytes: b"hello".to_vec(),
        };
        assert!(matches!(
            vault.request_file("did:pg:unknown", upload, false, None),
            Err(ConsentError::NotFound(_))
        ));
    }
}
