// src/storage/mod.rs
//! Storage collaborators.

pub mod blob_store;
