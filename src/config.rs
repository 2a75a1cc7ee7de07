// src/config.rs
//! Service configuration.
//!
//! Defaults are layered under environment variables prefixed `CONSENT_`
//! (`CONSENT_BIND_ADDRESS`, `CONSENT_SHARE_THRESHOLD`, ...). `main` loads a
//! `.env` file first, so the same names work there.

use crate::error::{ConsentError, ConsentResult};
use crate::services::consent::VaultSettings;
use crate::sharing::shamir::MAX_SHARES;
use crate::utils::clock::MAX_WINDOW_SECS;
use chrono::TimeDelta;
use config::{Config, Environment};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

pub const ENV_PREFIX: &str = "CONSENT";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Address the HTTP server binds to.
    pub bind_address: String,

    /// Directory of the content-addressed blob store.
    pub blob_dir: String,

    /// JSON file mirroring submitted credential records.
    pub credential_db: String,

    /// Token lifetime when a request leaves the TTL blank.
    pub default_ttl_secs: u64,

    /// Shares produced per encrypted file.
    pub share_total: u64,

    /// Shares needed to recover a file key.
    pub share_threshold: u64,

    pub challenge_ttl_secs: u64,

    /// HS256 secret for sessions. Empty means a random per-process secret.
    pub session_secret: String,

    pub session_ttl_secs: u64,
}

impl AppConfig {
    /// Loads defaults overlaid with `CONSENT_*` environment variables.
    pub fn load() -> ConsentResult<Self> {
        Self::load_with_prefix(ENV_PREFIX)
    }

    pub fn load_with_prefix(prefix: &str) -> ConsentResult<Self> {
        let config_error = |e: config::ConfigError| {
            ConsentError::InvalidInput(format!("configuration: {}", e))
        };

        let settings = Config::builder()
            .set_default("bind_address", "127.0.0.1:4000")
            .and_then(|b| b.set_default("blob_dir", "uploads"))
            .and_then(|b| b.set_default("credential_db", "user_db.json"))
            .and_then(|b| b.set_default("default_ttl_secs", 300_i64))
            .and_then(|b| b.set_default("share_total", 3_i64))
            .and_then(|b| b.set_default("share_threshold", 2_i64))
            .and_then(|b| b.set_default("challenge_ttl_secs", 120_i64))
            .and_then(|b| b.set_default("session_secret", ""))
            .and_then(|b| b.set_default("session_ttl_secs", 8 * 60 * 60_i64))
            .map_err(config_error)?
            .add_source(Environment::with_prefix(prefix).try_parsing(true))
            .build()
            .map_err(config_error)?;

        let config: AppConfig = settings.try_deserialize().map_err(config_error)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the vault cannot run with.
    pub fn validate(&self) -> ConsentResult<()> {
        if self.share_threshold == 0
            || self.share_threshold > self.share_total
            || self.share_total > MAX_SHARES as u64
        {
            return Err(ConsentError::InvalidThreshold(format!(
                "need 1 <= share_threshold <= share_total <= {}, got {} of {}",
                MAX_SHARES, self.share_threshold, self.share_total
            )));
        }
        let window = 1..=MAX_WINDOW_SECS as u64;
        if !window.contains(&self.challenge_ttl_secs) || !window.contains(&self.session_ttl_secs) {
            return Err(ConsentError::InvalidInput(format!(
                "challenge and session lifetimes must be between 1 and {} seconds",
                MAX_WINDOW_SECS
            )));
        }
        self.socket_addr()?;
        Ok(())
    }

    pub fn socket_addr(&self) -> ConsentResult<SocketAddr> {
        self.bind_address.trim().parse().map_err(|_| {
            ConsentError::InvalidInput(format!("bad bind_address '{}'", self.bind_address))
        })
    }

    pub fn vault_settings(&self) -> VaultSettings {
        VaultSettings {
            share_total: self.share_total as usize,
            share_threshold: self.share_threshold as usize,
            challenge_ttl: seconds(self.challenge_ttl_secs),
        }
    }

    pub fn default_ttl(&self) -> TimeDelta {
        seconds(self.default_ttl_secs)
    }

    pub fn session_ttl(&self) -> TimeDelta {
        seconds(self.session_ttl_secs)
    }
}

fn seconds(secs: u64) -> TimeDelta {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}
