// src/error.rs
//! Error taxonomy for the consent engine.
//!
//! Every failure the core can produce is a variant of [`ConsentError`]. None of
//! them are fatal: the presentation layer decides how to render each one, the
//! core only classifies it.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why a token redemption was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    Revoked,
    Expired,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::Revoked => write!(f, "token revoked"),
            DenialReason::Expired => write!(f, "token expired"),
        }
    }
}

/// Why a challenge-response login failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFailure {
    /// The asserted private key does not belong to the registered public key.
    KeyMismatch,
    /// The signature over the nonce did not verify.
    BadSignature,
    /// No pending challenge with that nonce exists for the DID (or it was already used).
    UnknownChallenge,
    /// The challenge outlived its validity window.
    ChallengeExpired,
    /// A session token was malformed, forged or past its lifetime.
    SessionInvalid,
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            AuthFailure::KeyMismatch => "private key does not match registered public key",
            AuthFailure::BadSignature => "signature verification failed",
            AuthFailure::UnknownChallenge => "unknown or already used challenge",
            AuthFailure::ChallengeExpired => "challenge expired",
            AuthFailure::SessionInvalid => "session invalid or expired",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Error)]
pub enum ConsentError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("field not allowed: {0}")]
    Forbidden(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("access denied: {0}")]
    Denied(DenialReason),

    #[error("insufficient shares: need {needed}, got {supplied}")]
    InsufficientShares { needed: usize, supplied: usize },

    #[error("invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("malformed share: {0}")]
    MalformedShare(String),

    #[error("authentication failed: {0}")]
    AuthFailed(AuthFailure),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ConsentError {
    fn from(e: serde_json::Error) -> Self {
        ConsentError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for ConsentError {
    fn from(e: std::io::Error) -> Self {
        ConsentError::Storage(e.to_string())
    }
}

pub type ConsentResult<T> = Result<T, ConsentError>;
