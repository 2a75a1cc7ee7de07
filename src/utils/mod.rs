// src/utils/mod.rs
//! Helper functions: hashing, symmetric encryption, serialization, time.

pub mod clock;
pub mod crypto;
pub mod encryption;
pub mod serialization;
