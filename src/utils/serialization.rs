// src/utils/serialization.rs
//! Serialization utilities for the consent engine.
//!
//! Provides serialization and deserialization functions for:
//! - JSON data structures (persisted credential records, VC documents)
//! - Base64 transport of binary payloads (uploaded files)

use crate::error::{ConsentError, ConsentResult};
use serde::{Deserialize, Serialize};

/// Serializes a value to a JSON string.
///
/// # Returns
/// - `Ok(String)` with JSON representation on success
/// - `Err(ConsentError::Serialization)` if serialization fails
pub fn serialize<T: Serialize>(data: &T) -> ConsentResult<String> {
    serde_json::to_string(data).map_err(Into::into)
}

/// Deserializes a value from a JSON string.
///
/// # Note
/// The lifetime parameter lets the deserialized value borrow from the input string.
pub fn deserialize<'a, T: Deserialize<'a>>(data: &'a str) -> ConsentResult<T> {
    serde_json::from_str(data).map_err(Into::into)
}

/// Canonical bytes of a JSON value for signing: keys sorted, no whitespace.
///
/// `serde_json::Value` keeps object keys in a `BTreeMap`, so re-serializing a
/// parsed value yields the same bytes regardless of the input's key order.
pub fn canonical_json(value: &serde_json::Value) -> ConsentResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(Into::into)
}

/// Encodes binary data as standard base64.
pub fn encode_base64(data: &[u8]) -> String {
    base64::encode(data)
}

/// Decodes standard base64 into bytes.
pub fn decode_base64(data: &str) -> ConsentResult<Vec<u8>> {
    base64::decode(data.trim())
        .map_err(|e| ConsentError::InvalidInput(format!("Base64 decoding failed: {}", e)))
}
