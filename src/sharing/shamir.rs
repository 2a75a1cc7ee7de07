// src/sharing/shamir.rs
//! (k, n) threshold secret sharing.
//!
//! Each byte of the secret becomes the constant term of an independent random
//! polynomial of degree `k - 1` over GF(2^8). Share `i` holds every polynomial
//! evaluated at `x = i`. Any `k` shares pin the polynomials down by Lagrange
//! interpolation; `k - 1` shares are consistent with every possible secret.

use crate::error::{ConsentError, ConsentResult};
use crate::sharing::gf256;
use crate::utils::crypto::random_bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

/// Largest number of shares a single split can produce (x = 1..=255).
pub const MAX_SHARES: usize = 255;

/// One share of a split secret.
///
/// Carries the threshold it was produced under so recovery can tell how many
/// shares it needs. Text form: `<threshold>-<index>-<hex data>`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct SecretShare {
    threshold: u8,
    index: u8,
    data: Vec<u8>,
}

impl SecretShare {
    pub fn new(threshold: u8, index: u8, data: Vec<u8>) -> ConsentResult<Self> {
        if threshold == 0 {
            return Err(ConsentError::MalformedShare("threshold must be at least 1".into()));
        }
        if index == 0 {
            return Err(ConsentError::MalformedShare("share index must be non-zero".into()));
        }
        Ok(Self {
            threshold,
            index,
            data,
        })
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Display for SecretShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.threshold, self.index, hex::encode(&self.data))
    }
}

// Share bytes stay out of logs.
impl fmt::Debug for SecretShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretShare")
            .field("threshold", &self.threshold)
            .field("index", &self.index)
            .field("len", &self.data.len())
            .finish()
    }
}

impl FromStr for SecretShare {
    type Err = ConsentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().splitn(3, '-');
        let (Some(k), Some(i), Some(data)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(ConsentError::MalformedShare(
                "expected <threshold>-<index>-<hex>".into(),
            ));
        };
        let threshold = k
            .parse::<u8>()
            .map_err(|e| ConsentError::MalformedShare(format!("bad threshold: {}", e)))?;
        let index = i
            .parse::<u8>()
            .map_err(|e| ConsentError::MalformedShare(format!("bad index: {}", e)))?;
        let data = hex::decode(data)
            .map_err(|e| ConsentError::MalformedShare(format!("bad share data: {}", e)))?;
        SecretShare::new(threshold, index, data)
    }
}

impl From<SecretShare> for String {
    fn from(share: SecretShare) -> Self {
        share.to_string()
    }
}

impl TryFrom<String> for SecretShare {
    type Error = ConsentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Splits `secret` into `n` shares, any `k` of which reconstruct it.
///
/// # Errors
/// - `InvalidThreshold` unless `1 <= k <= n <= 255`
/// - `InvalidInput` for an empty secret
pub fn split(secret: &[u8], n: usize, k: usize) -> ConsentResult<Vec<SecretShare>> {
    if k == 0 || k > n || n > MAX_SHARES {
        return Err(ConsentError::InvalidThreshold(format!(
            "need 1 <= k <= n <= {}, got k={} n={}",
            MAX_SHARES, k, n
        )));
    }
    if secret.is_empty() {
        return Err(ConsentError::InvalidInput("cannot split an empty secret".into()));
    }

    // Row per secret byte: [secret_byte, r_1, ..., r_{k-1}]
    let randomness = Zeroizing::new(random_bytes(secret.len() * (k - 1)));
    let mut coeffs = Zeroizing::new(vec![0u8; k]);

    let mut outputs: Vec<Vec<u8>> = vec![Vec::with_capacity(secret.len()); n];
    for (byte_pos, &byte) in secret.iter().enumerate() {
        coeffs[0] = byte;
        coeffs[1..].copy_from_slice(&randomness[byte_pos * (k - 1)..(byte_pos + 1) * (k - 1)]);
        for (slot, out) in outputs.iter_mut().enumerate() {
            out.push(gf256::eval_poly(&coeffs, (slot + 1) as u8));
        }
    }

    Ok(outputs
        .into_iter()
        .enumerate()
        .map(|(slot, data)| SecretShare {
            threshold: k as u8,
            index: (slot + 1) as u8,
            data,
        })
        .collect())
}

/// Reconstructs the secret from at least `threshold` distinct shares.
///
/// Extra shares are ignored; the lowest `threshold` indices are used, so every
/// sufficient subset of one split yields the same bytes.
///
/// # Errors
/// - `InsufficientShares` when fewer distinct indices than the threshold are present
/// - `MalformedShare` when shares disagree on threshold or length, or two
///   shares claim the same index with different data
pub fn recover(shares: &[SecretShare]) -> ConsentResult<Vec<u8>> {
    let first = shares.first().ok_or(ConsentError::InsufficientShares {
        needed: 1,
        supplied: 0,
    })?;
    let threshold = first.threshold as usize;
    let len = first.data.len();

    let mut distinct: BTreeMap<u8, &SecretShare> = BTreeMap::new();
    for share in shares {
        if share.threshold as usize != threshold {
            return Err(ConsentError::MalformedShare("shares disagree on threshold".into()));
        }
        if share.data.len() != len {
            return Err(ConsentError::MalformedShare("shares disagree on length".into()));
        }
        if let Some(existing) = distinct.insert(share.index, share) {
            if existing.data != share.data {
                return Err(ConsentError::MalformedShare(format!(
                    "conflicting data for share index {}",
                    share.index
                )));
            }
        }
    }

    if distinct.len() < threshold {
        return Err(ConsentError::InsufficientShares {
            needed: threshold,
            supplied: distinct.len(),
        });
    }

    let chosen: Vec<&SecretShare> = distinct.values().take(threshold).copied().collect();
    let weights = lagrange_weights_at_zero(&chosen)?;

    let mut secret = vec![0u8; len];
    for (byte_pos, out) in secret.iter_mut().enumerate() {
        *out = chosen
            .iter()
            .zip(weights.iter())
            .fold(0u8, |acc, (share, &w)| gf256::add(acc, gf256::mul(share.data[byte_pos], w)));
    }
    Ok(secret)
}

/// Lagrange basis polynomials evaluated at x = 0 for the chosen share indices.
fn lagrange_weights_at_zero(shares: &[&SecretShare]) -> ConsentResult<Vec<u8>> {
    shares
        .iter()
        .map(|si| {
            shares
                .iter()
                .filter(|sj| sj.index != si.index)
                .try_fold(1u8, |acc, sj| {
                    let term = gf256::div(sj.index, sj.index ^ si.index).ok_or_else(|| {
                        ConsentError::MalformedShare("duplicate share index".into())
                    })?;
                    Ok::<u8, ConsentError>(gf256::mul(acc, term))
                })
        })
        .collect()
}
