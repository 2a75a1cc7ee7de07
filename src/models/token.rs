// src/models/token.rs
//! Access tokens and the disclosures they carry.

use crate::error::{ConsentError, DenialReason};
use crate::models::credential::AttributeValue;
use crate::sharing::SecretShare;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Predicate operators a relying party may ask about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Gt,
    Ge,
    Eq,
    In,
}

impl FromStr for Operator {
    type Err = ConsentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "gt" => Ok(Operator::Gt),
            "ge" => Ok(Operator::Ge),
            "eq" => Ok(Operator::Eq),
            "in" => Ok(Operator::In),
            other => Err(ConsentError::UnsupportedOperator(other.to_string())),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Gt => "gt",
            Operator::Ge => "ge",
            Operator::Eq => "eq",
            Operator::In => "in",
        };
        f.write_str(s)
    }
}

/// Where a disclosed file lives and how to open it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReference {
    /// SHA-256 hex of the stored bytes (ciphertext when encrypted).
    pub content_address: String,
    pub retrieval_locator: String,
    pub file_name: Option<String>,
    pub encrypted: bool,
    /// Present only for encrypted files.
    pub key_shares: Option<Vec<SecretShare>>,
}

/// The frozen payload bound into a token at issuance.
///
/// Predicate results are computed once when the token is minted; redemption
/// replays them and never consults the credential again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Disclosure {
    Value {
        field: String,
        value: AttributeValue,
    },
    Predicate {
        operator: Operator,
        field: String,
        comparand: AttributeValue,
        result: bool,
    },
    File(FileReference),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenMode {
    Value,
    Predicate,
    File,
}

impl fmt::Display for TokenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenMode::Value => "value",
            TokenMode::Predicate => "predicate",
            TokenMode::File => "file",
        };
        f.write_str(s)
    }
}

impl Disclosure {
    pub fn mode(&self) -> TokenMode {
        match self {
            Disclosure::Value { .. } => TokenMode::Value,
            Disclosure::Predicate { .. } => TokenMode::Predicate,
            Disclosure::File(_) => TokenMode::File,
        }
    }

    /// Short human label for token tables. Never includes disclosed values.
    pub fn label(&self) -> String {
        match self {
            Disclosure::Value { field, .. } => field.clone(),
            Disclosure::Predicate {
                operator, field, ..
            } => format!("predicate:{} {}", field, operator),
            Disclosure::File(file) => file.content_address.clone(),
        }
    }
}

/// A time-bounded, revocable grant over one disclosure.
///
/// `expiry == None` means the token never expires. `revoked` only ever moves
/// from `false` to `true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub token_id: String,
    /// DID of the subject who granted the token. Only the owner may list or
    /// revoke it.
    pub owner: String,
    pub payload: Disclosure,
    pub issued_at: DateTime<Utc>,
    pub expiry: Option<DateTime<Utc>>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn mode(&self) -> TokenMode {
        self.payload.mode()
    }

    pub fn is_owned_by(&self, did: &str) -> bool {
        self.owner == did
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expiry, Some(expiry) if now > expiry)
    }

    /// Revocation wins over expiry when both apply.
    pub fn check_redeemable(&self, now: DateTime<Utc>) -> Result<(), DenialReason> {
        if self.revoked {
            return Err(DenialReason::Revoked);
        }
        if self.is_expired_at(now) {
            return Err(DenialReason::Expired);
        }
        Ok(())
    }

    pub fn remaining_at(&self, now: DateTime<Utc>) -> Remaining {
        match self.expiry {
            None => Remaining::Never,
            Some(expiry) => {
                let secs = (expiry - now).num_seconds();
                if secs > 0 {
                    Remaining::Seconds(secs)
                } else {
                    Remaining::Expired
                }
            }
        }
    }
}

/// Time left on a token, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Remaining {
    Never,
    Seconds(i64),
    Expired,
}

impl fmt::Display for Remaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Remaining::Never => f.write_str("Never"),
            Remaining::Seconds(s) => write!(f, "{}s", s),
            Remaining::Expired => f.write_str("Expired"),
        }
    }
}

/// One row of the token table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSummary {
    pub token_id: String,
    pub mode: TokenMode,
    pub label: String,
    pub issued: String,
    pub expiry: String,
    pub remaining: Remaining,
    pub revoked: bool,
    pub revoked_at: Option<String>,
}
