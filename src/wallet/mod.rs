// src/wallet/mod.rs
//! Key material and attested attribute records held on behalf of subjects.

pub mod credential_storage;
pub mod key_management;
