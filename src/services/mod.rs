// src/services/mod.rs
//! Business logic and the HTTP surface over it.

pub mod api_server;
pub mod authenticator;
pub mod consent;
pub mod disclosure;
pub mod identity_registry;
pub mod session;
pub mod token_ledger;
