// src/models/mod.rs
//! Data structures shared across the engine.

pub mod credential;
pub mod did;
pub mod token;
