// src/services/token_ledger.rs
//! Token Ledger
//!
//! Issues, redeems, revokes and lists access tokens. Each token wraps one
//! frozen [`Disclosure`]; redemption only ever replays it. Lifecycle:
//!
//! ```text
//! Active --revoke--> Revoked      (terminal)
//! Active --time----> Expired      (terminal; revoke still allowed)
//! ```

use crate::error::{ConsentError, ConsentResult};
use crate::models::token::{AccessToken, Disclosure, TokenSummary};
use crate::utils::clock::Clock;
use crate::utils::crypto::random_id;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Repository interface for issued tokens.
pub trait TokenStore: Send + Sync {
    fn insert(&self, token: AccessToken) -> ConsentResult<()>;

    fn get(&self, token_id: &str) -> Option<AccessToken>;

    /// Marks `owner`'s token revoked, keeping the first `revoked_at`. Returns
    /// the updated token, or `None` for an unknown id or another owner's token.
    fn revoke(&self, owner: &str, token_id: &str, at: DateTime<Utc>) -> Option<AccessToken>;

    fn owned_by(&self, owner: &str) -> Vec<AccessToken>;
}

#[derive(Default)]
pub struct InMemoryTokenStore {
    tokens: RwLock<HashMap<String, AccessToken>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for InMemoryTokenStore {
    fn insert(&self, token: AccessToken) -> ConsentResult<()> {
        let mut guard = self.tokens.write().unwrap_or_else(|e| e.into_inner());
        if guard.contains_key(&token.token_id) {
            return Err(ConsentError::Crypto(format!(
                "token id collision: {}",
                token.token_id
            )));
        }
        guard.insert(token.token_id.clone(), token);
        Ok(())
    }

    fn get(&self, token_id: &str) -> Option<AccessToken> {
        let guard = self.tokens.read().unwrap_or_else(|e| e.into_inner());
        guard.get(token_id).cloned()
    }

    fn revoke(&self, owner: &str, token_id: &str, at: DateTime<Utc>) -> Option<AccessToken> {
        let mut guard = self.tokens.write().unwrap_or_else(|e| e.into_inner());
        let token = guard
            .get_mut(token_id)
            .filter(|token| token.is_owned_by(owner))?;
        if !token.revoked {
            token.revoked = true;
            token.revoked_at = Some(at);
        }
        Some(token.clone())
    }

    fn owned_by(&self, owner: &str) -> Vec<AccessToken> {
        let guard = self.tokens.read().unwrap_or_else(|e| e.into_inner());
        guard
            .values()
            .filter(|token| token.is_owned_by(owner))
            .cloned()
            .collect()
    }
}

/// Parses the TTL form field.
///
/// | input       | result               |
/// |-------------|----------------------|
/// | absent/blank| `default`            |
/// | `"0"`       | never expires        |
/// | `n > 0`     | `n` seconds          |
/// | otherwise   | `InvalidInput`       |
pub fn parse_ttl_field(raw: Option<&str>, default: TimeDelta) -> ConsentResult<Option<TimeDelta>> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(Some(default)),
        Some(raw) => raw,
    };
    let secs: i64 = raw
        .parse()
        .map_err(|_| ConsentError::InvalidInput(format!("ttl must be whole seconds, got '{}'", raw)))?;
    match secs {
        0 => Ok(None),
        s if s > 0 => TimeDelta::try_seconds(s)
            .map(Some)
            .ok_or_else(|| ConsentError::InvalidInput(format!("ttl too large: {}", s))),
        s => Err(ConsentError::InvalidInput(format!("ttl cannot be negative: {}", s))),
    }
}

pub struct TokenLedger {
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
}

impl TokenLedger {
    pub fn new(store: Arc<dyn TokenStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Mints a token over `payload` on behalf of `owner`. `ttl` of `None` or
    /// zero never expires.
    pub fn issue(
        &self,
        owner: &str,
        payload: Disclosure,
        ttl: Option<TimeDelta>,
    ) -> ConsentResult<AccessToken> {
        let issued_at = self.clock.now();
        let expiry = match ttl {
            None => None,
            Some(ttl) if ttl == TimeDelta::zero() => None,
            Some(ttl) if ttl < TimeDelta::zero() => {
                return Err(ConsentError::InvalidInput("ttl cannot be negative".into()))
            }
            Some(ttl) => Some(
                issued_at
                    .checked_add_signed(ttl)
                    .ok_or_else(|| ConsentError::InvalidInput("ttl too large".into()))?,
            ),
        };

        let token = AccessToken {
            token_id: random_id(),
            owner: owner.to_string(),
            payload,
            issued_at,
            expiry,
            revoked: false,
            revoked_at: None,
        };
        self.store.insert(token.clone())?;
        log::info!(
            "issued {} token {} for {} (expires {})",
            token.mode(),
            token.token_id,
            token.owner,
            format_expiry(token.expiry)
        );
        Ok(token)
    }

    /// Returns the frozen disclosure if the token is live.
    ///
    /// # Errors
    /// - `NotFound` for an unknown id
    /// - `Denied(Revoked)` once revoked, checked first
    /// - `Denied(Expired)` when now is past the expiry
    pub fn redeem(&self, token_id: &str) -> ConsentResult<Disclosure> {
        let token_id = token_id.trim();
        let token = self
            .store
            .get(token_id)
            .ok_or_else(|| ConsentError::NotFound(format!("token {}", token_id)))?;

        if let Err(reason) = token.check_redeemable(self.clock.now()) {
            log::info!("refused token {}: {}", token_id, reason);
            return Err(ConsentError::Denied(reason));
        }
        Ok(token.payload)
    }

    /// Revokes one of `owner`'s tokens. Revoking twice is a no-op that keeps
    /// the first timestamp; expired tokens can still be revoked.
    ///
    /// # Errors
    /// `NotFound` for an unknown id or a token granted by someone else.
    pub fn revoke(&self, owner: &str, token_id: &str) -> ConsentResult<AccessToken> {
        let token_id = token_id.trim();
        let token = self
            .store
            .revoke(owner, token_id, self.clock.now())
            .ok_or_else(|| ConsentError::NotFound(format!("token {}", token_id)))?;
        log::info!("revoked token {}", token_id);
        Ok(token)
    }

    pub fn get(&self, token_id: &str) -> Option<AccessToken> {
        self.store.get(token_id.trim())
    }

    /// `owner`'s token table, newest first.
    pub fn list(&self, owner: &str) -> Vec<TokenSummary> {
        let now = self.clock.now();
        let mut tokens = self.store.owned_by(owner);
        tokens.sort_by(|a, b| {
            b.issued_at
                .cmp(&a.issued_at)
                .then_with(|| a.token_id.cmp(&b.token_id))
        });
        tokens
            .into_iter()
            .map(|token| TokenSummary {
                mode: token.mode(),
                label: token.payload.label(),
                issued: token.issued_at.format(DISPLAY_FORMAT).to_string(),
                expiry: format_expiry(token.expiry),
                remaining: token.remaining_at(now),
                revoked: token.revoked,
                revoked_at: token
                    .revoked_at
                    .map(|at| at.format(DISPLAY_FORMAT).to_string()),
                token_id: token.token_id,
            })
            .collect()
    }
}

fn format_expiry(expiry: Option<DateTime<Utc>>) -> String {
    expiry
        .map(|at| at.format(DISPLAY_FORMAT).to_string())
        .unwrap_or_else(|| "Never".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DenialReason;
    use crate::models::credential::AttributeValue;
    use crate::models::token::{Remaining, TokenMode};
    use crate::utils::clock::ManualClock;
    use chrono::TimeZone;

    const OWNER: &str = "did:pg:0123456789abcdef0123456789abcdef";

    fn ledger() -> (TokenLedger, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap(),
        ));
        let ledger = TokenLedger::new(Arc::new(InMemoryTokenStore::new()), clock.clone());
        (ledger, clock)
    }

    fn name_disclosure() -> Disclosure {
        Disclosure::Value {
            field: "name".into(),
            value: AttributeValue::Text("Asha".into()),
        }
    }

    #[test]
    fn test_expiry_window() {
        let (ledger, clock) = ledger();
        let token = ledger
            .issue(OWNER, name_disclosure(), Some(TimeDelta::seconds(5)))
            .unwrap();

        clock.advance(TimeDelta::seconds(4));
        assert_eq!(ledger.redeem(&token.token_id).unwrap(), name_disclosure());
        clock.advance(TimeDelta::seconds(1));
        assert!(ledger.redeem(&token.token_id).is_ok());
        clock.advance(TimeDelta::seconds(1));
        assert!(matches!(
            ledger.redeem(&token.token_id),
            Err(ConsentError::Denied(DenialReason::Expired))
        ));
    }

    #[test]
    fn test_no_expiry() {
        let (ledger, clock) = ledger();
        let forever = ledger.issue(OWNER, name_disclosure(), None).unwrap();
        let zero = ledger
            .issue(OWNER, name_disclosure(), Some(TimeDelta::zero()))
            .unwrap();
        assert!(forever.expiry.is_none());
        assert!(zero.expiry.is_none());

        clock.advance(TimeDelta::days(3650));
        assert!(ledger.redeem(&forever.token_id).is_ok());
        assert!(ledger.redeem(&zero.token_id).is_ok());
    }

    #[test]
    fn test_negative_ttl_rejected() {
        let (ledger, _) = ledger();
        assert!(matches!(
            ledger.issue(OWNER, name_disclosure(), Some(TimeDelta::seconds(-1))),
            Err(ConsentError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_revoke_is_idempotent_and_wins() {
        let (ledger, clock) = ledger();
        let token = ledger
            .issue(OWNER, name_disclosure(), Some(TimeDelta::seconds(1)))
            .unwrap();

        let first = ledger.revoke(OWNER, &token.token_id).unwrap();
        clock.advance(TimeDelta::seconds(30));
        let second = ledger.revoke(OWNER, &token.token_id).unwrap();
        assert!(second.revoked);
        assert_eq!(first.revoked_at, second.revoked_at);

        // Past expiry and revoked: revocation is reported.
        assert!(matches!(
            ledger.redeem(&token.token_id),
            Err(ConsentError::Denied(DenialReason::Revoked))
        ));
    }

    #[test]
    fn test_unknown_token() {
        let (ledger, _) = ledger();
        assert!(matches!(ledger.redeem("nope"), Err(ConsentError::NotFound(_))));
        assert!(matches!(ledger.revoke(OWNER, "nope"), Err(ConsentError::NotFound(_))));
    }

    #[test]
    fn test_redeem_is_repeatable() {
        let (ledger, _) = ledger();
        let token = ledger.issue(OWNER, name_disclosure(), None).unwrap();
        let a = ledger.redeem(&token.token_id).unwrap();
        let b = ledger.redeem(&token.token_id).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_token_ids_unique() {
        let (ledger, _) = ledger();
        let ids: std::collections::HashSet<String> = (0..200)
            .map(|_| ledger.issue(OWNER, name_disclosure(), None).unwrap().token_id)
            .collect();
        assert_eq!(ids.len(), 200);
    }

    #[test]
    fn test_list_rows() {
        let (ledger, clock) = ledger();
        let old = ledger
            .issue(OWNER, name_disclosure(), Some(TimeDelta::seconds(300)))
            .unwrap();
        clock.advance(TimeDelta::seconds(10));
        let newer = ledger.issue(OWNER, name_disclosure(), None).unwrap();
        ledger.revoke(OWNER, &newer.token_id).unwrap();

        let rows = ledger.list(OWNER);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].token_id, newer.token_id);
        assert_eq!(rows[0].expiry, "Never");
        assert_eq!(rows[0].remaining, Remaining::Never);
        assert_eq!(rows[0].revoked_at.as_deref(), Some("2025-01-01 12:00:10"));
        assert_eq!(rows[1].token_id, old.token_id);
        assert_eq!(rows[1].mode, TokenMode::Value);
        assert_eq!(rows[1].issued, "2025-01-01 12:00:00");
        assert_eq!(rows[1].expiry, "2025-01-01 12:05:00");
        assert_eq!(rows[1].remaining, Remaining::Seconds(290));
        assert_eq!(rows[1].label, "name");
    }

    #[test]
    fn test_parse_ttl_field() {
        let default = TimeDelta::seconds(300);
        assert_eq!(parse_ttl_field(None, default).unwrap(), Some(default));
        assert_eq!(parse_ttl_field(Some("  "), default).unwrap(), Some(default));
        assert_eq!(parse_ttl_field(Some("0"), default).unwrap(), None);
        assert_eq!(
            parse_ttl_field(Some("45"), default).unwrap(),
            Some(TimeDelta::seconds(45))
        );
        assert!(matches!(
            parse_ttl_field(Some("-5"), default),
            Err(ConsentError::InvalidInput(_))
        ));
        assert!(matches!(
            parse_ttl_field(Some("soon"), default),
            Err(ConsentError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_foreign_owner_cannot_list_or_revoke() {
        let (ledger, _) = ledger();
        let other = "did:pg:ffffffffffffffffffffffffffffffff";
        let token = ledger.issue(OWNER, name_disclosure(), None).unwrap();

        assert!(ledger.list(other).is_empty());
        assert!(matches!(
            ledger.revoke(other, &token.token_id),
            Err(ConsentError::NotFound(_))
        ));
        assert!(!ledger.get(&token.token_id).unwrap().revoked);
        assert_eq!(ledger.list(OWNER).len(), 1);
    }

    #[test]
    fn test_concurrent_issue_yields_unique_ids() {
        let (ledger, _) = ledger();
        let shared = &ledger;
        let ids: Vec<String> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(move || {
                        (0..50)
                            .map(|_| shared.issue(OWNER, name_disclosure(), None).unwrap().token_id)
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            workers
                .into_iter()
                .flat_map(|worker| worker.join().unwrap())
                .collect()
        });

        let unique: std::collections::HashSet<&String> = ids.iter().collect();
        assert_eq!(ids.len(), 400);
        assert_eq!(unique.len(), 400);
        assert_eq!(ledger.list(OWNER).len(), 400);
    }

    #[test]
    fn test_redeem_after_concurrent_revoke_is_denied() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let (ledger, _) = ledger();
        let token = ledger.issue(OWNER, name_disclosure(), None).unwrap();
        let revoked = AtomicBool::new(false);
        let (shared, token_id, revoked_flag) = (&ledger, token.token_id.as_str(), &revoked);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(move || {
                    for _ in 0..500 {
                        let revoke_returned = revoked_flag.load(Ordering::SeqCst);
                        match shared.redeem(token_id) {
                            Ok(disclosure) => {
                                assert!(!revoke_returned, "redeemed after revoke returned");
                                assert_eq!(disclosure, name_disclosure());
                            }
                            Err(ConsentError::Denied(DenialReason::Revoked)) => {}
                            Err(other) => panic!("unexpected error {:?}", other),
                        }
                    }
                });
            }
            scope.spawn(move || {
                std::thread::yield_now();
                shared.revoke(OWNER, token_id).unwrap();
                revoked_flag.store(true, Ordering::SeqCst);
            });
        });

        assert!(matches!(
            ledger.redeem(&token.token_id),
            Err(ConsentError::Denied(DenialReason::Revoked))
        ));
    }
}
