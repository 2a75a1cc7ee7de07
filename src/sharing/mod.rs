// src/sharing/mod.rs
//! Threshold secret sharing used to protect file-encryption keys.

pub mod gf256;
pub mod shamir;

pub use shamir::{recover, split, SecretShare};
