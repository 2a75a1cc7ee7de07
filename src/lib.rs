// src/lib.rs

//! # DID Consent Vault
//!
//! Consent-gated selective disclosure over DID identities. A subject registers
//! a DID, stores an attested attribute record, and grants relying parties
//! time-bounded, revocable access tokens that reveal one value, one predicate
//! outcome, or one (optionally encrypted) file.
//!
//! ## Architecture Overview
//! 1. **Models**: identities, credentials, tokens and their disclosures
//! 2. **Wallet**: secp256k1 keys and the per-DID credential store
//! 3. **Sharing**: Shamir threshold sharing over GF(2^8) for file keys
//! 4. **Storage**: content-addressed blob store
//! 5. **Services**: registry, login, disclosure engine, token ledger, the
//!    [`services::consent::ConsentVault`] facade and the HTTP server

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod sharing;
pub mod storage;
pub mod utils;
pub mod wallet;

pub use error::{ConsentError, ConsentResult};
