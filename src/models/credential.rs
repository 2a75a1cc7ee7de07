// src/models/credential.rs
//! Attested attribute records and Verifiable Credential data model.
//!
//! A [`Credential`] is the subject's attested attribute set (one per DID). A
//! [`VerifiableCredential`] is a signed claim document a subject can issue
//! once authenticated.

use crate::error::ConsentResult;
use crate::models::did::hex_bytes;
use crate::utils::crypto::hash_hex;
use crate::utils::serialization::canonical_json;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

/// The only attribute names that may ever leave the store as raw values.
pub const DISCLOSABLE_FIELDS: [&str; 4] = ["name", "date_of_birth", "gender", "id_hash"];

/// Attested attributes of one subject.
///
/// `id_hash` is the SHA-256 hex of the national identifier; the raw identifier
/// is never stored. Records are replaced wholesale, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub name: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
    pub id_hash: String,
}

impl Credential {
    /// Builds a record from raw form input, hashing the national identifier.
    pub fn from_submission(
        name: impl Into<String>,
        date_of_birth: NaiveDate,
        gender: impl Into<String>,
        national_id: &str,
    ) -> Self {
        Credential {
            name: name.into(),
            date_of_birth,
            gender: gender.into(),
            id_hash: hash_hex(national_id.trim().as_bytes()),
        }
    }
}

/// A typed attribute value, or a comparand supplied with a predicate.
///
/// Untagged on the wire: integers stay numbers, `YYYY-MM-DD` strings become
/// dates, other strings stay text, arrays become lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Integer(i64),
    Date(NaiveDate),
    Text(String),
    List(Vec<AttributeValue>),
}

impl AttributeValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::Integer(_) => "integer",
            AttributeValue::Date(_) => "date",
            AttributeValue::Text(_) => "text",
            AttributeValue::List(_) => "list",
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Integer(v) => write!(f, "{}", v),
            AttributeValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            AttributeValue::Text(s) => f.write_str(s),
            AttributeValue::List(items) => {
                let rendered: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
        }
    }
}

/// A Verifiable Credential signed by its issuer's DID key.
///
/// # Fields
/// - `id`: Unique identifier URI for the credential
/// - `issuer`: DID of the signing subject
/// - `subject`: what the credential is about (free text or another DID)
/// - `claims`: arbitrary JSON claims
/// - `issued_at`: signing time
/// - `signature`: 64-byte compact ECDSA signature over [`VerifiableCredential::signing_input`]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VerifiableCredential {
    /// Example: "urn:uuid:9f0c..."
    pub id: String,

    pub issuer: String,

    pub subject: String,

    pub claims: serde_json::Value,

    pub issued_at: DateTime<Utc>,

    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

impl VerifiableCredential {
    /// Canonical bytes covered by the signature (everything except the signature).
    pub fn signing_input(&self) -> ConsentResult<Vec<u8>> {
        canonical_json(&json!({
            "id": self.id,
            "issuer": self.issuer,
            "subject": self.subject,
            "claims": self.claims,
            "issued_at": self.issued_at.to_rfc3339(),
        }))
    }
}
