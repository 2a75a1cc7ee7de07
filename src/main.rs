// src/main.rs

//! # DID Consent Vault - Main Entry Point
//!
//! Initializes the consent engine and starts the API server.
//!
//! ## Architecture Overview
//! 1. **Identity Layer**: in-memory DID registry with challenge-response login
//! 2. **Credential Layer**: per-DID attribute records mirrored to a JSON file
//! 3. **Storage Layer**: filesystem content-addressed blob store
//! 4. **Services Layer**: disclosure engine, token ledger and JSON API
//!
//! ## Environment Variables (all optional, also read from `.env`)
//! - `CONSENT_BIND_ADDRESS`: listen address (default: 127.0.0.1:4000)
//! - `CONSENT_BLOB_DIR`: blob directory (default: uploads)
//! - `CONSENT_CREDENTIAL_DB`: credential record file (default: user_db.json)
//! - `CONSENT_DEFAULT_TTL_SECS`: lifetime of tokens requested with a blank TTL (default: 300)
//! - `CONSENT_SHARE_TOTAL` / `CONSENT_SHARE_THRESHOLD`: file key sharing (default: 2 of 3)
//! - `CONSENT_CHALLENGE_TTL_SECS`: login challenge window (default: 120)
//! - `CONSENT_SESSION_SECRET`: HS256 session secret (default: random per process)
//! - `CONSENT_SESSION_TTL_SECS`: session lifetime (default: 8 hours)
//! - `RUST_LOG`: log filter for `env_logger`

use anyhow::Context;
use did_consent_vault::config::AppConfig;
use did_consent_vault::services::api_server::ApiServer;
use did_consent_vault::services::consent::ConsentVault;
use did_consent_vault::services::identity_registry::InMemoryIdentityRegistry;
use did_consent_vault::services::session::SessionIssuer;
use did_consent_vault::services::token_ledger::InMemoryTokenStore;
use did_consent_vault::storage::blob_store::FsBlobStore;
use did_consent_vault::utils::clock::SystemClock;
use did_consent_vault::utils::crypto::random_bytes;
use did_consent_vault::wallet::credential_storage::InMemoryCredentialStore;
use dotenv::dotenv;
use std::sync::Arc;
use zeroize::Zeroizing;

/// Main application entry point
///
/// # Initialization Sequence
/// 1. Load environment configuration
/// 2. Open the blob store and credential records
/// 3. Wire the consent vault and session issuer
/// 4. Start API server
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();
    env_logger::init();

    let config = AppConfig::load().context("failed to load configuration")?;
    let addr = config.socket_addr()?;

    let blobs = FsBlobStore::open(&config.blob_dir)
        .with_context(|| format!("failed to open blob store at {}", config.blob_dir))?;
    let credentials = InMemoryCredentialStore::with_backing_file(&config.credential_db)
        .with_context(|| format!("failed to load credentials from {}", config.credential_db))?;

    let clock = Arc::new(SystemClock::new());
    let vault = ConsentVault::new(
        Arc::new(InMemoryIdentityRegistry::new()),
        Arc::new(credentials),
        Arc::new(InMemoryTokenStore::new()),
        Arc::new(blobs),
        clock.clone(),
        config.vault_settings(),
    )?;

    let secret = if config.session_secret.is_empty() {
        log::warn!("CONSENT_SESSION_SECRET not set; sessions will not survive a restart");
        Zeroizing::new(random_bytes(32))
    } else {
        Zeroizing::new(config.session_secret.as_bytes().to_vec())
    };
    let sessions = SessionIssuer::new(&secret, config.session_ttl(), clock)?;

    let api_server = ApiServer::new(Arc::new(vault), sessions, config.default_ttl());

    println!("API server running at http://{}", addr);
    println!("Available endpoints:");
    println!("- POST /signup");
    println!("- POST /login, POST /verify");
    println!("- POST /userdata");
    println!("- POST /access-request, POST /verify-access");
    println!("- GET  /tokens, POST /revoke-token");
    println!("- POST /shamir/recover, GET /blobs/:address");
    println!("- POST /vc/sign, POST /vc/verify");

    api_server.run(addr).await.context("API server failed")?;
    Ok(())
}
