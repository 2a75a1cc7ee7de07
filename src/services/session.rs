// src/services/session.rs
//! HS256 session tokens minted after a successful login.
//!
//! A session is the HTTP-side carrier of a [`VerifiedSubject`]: `sub` is the
//! DID, `exp` is checked against the injected clock rather than wall time.

use crate::error::{AuthFailure, ConsentError, ConsentResult};
use crate::services::authenticator::VerifiedSubject;
use crate::utils::clock::{max_window, Clock};
use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
}

pub struct SessionIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl SessionIssuer {
    /// # Errors
    /// `InvalidInput` for an empty secret, or a lifetime that is not positive
    /// or exceeds one year.
    pub fn new(secret: &[u8], ttl: TimeDelta, clock: Arc<dyn Clock>) -> ConsentResult<Self> {
        if secret.is_empty() {
            return Err(ConsentError::InvalidInput("session secret is empty".into()));
        }
        if ttl <= TimeDelta::zero() || ttl > max_window() {
            return Err(ConsentError::InvalidInput(
                "session lifetime must be positive and at most one year".into(),
            ));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
            clock,
        })
    }

    pub fn issue(&self, subject: &VerifiedSubject) -> ConsentResult<String> {
        let now = self.clock.now();
        let expires = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| ConsentError::InvalidInput("session expiry out of range".into()))?;
        let claims = Claims {
            sub: subject.did().to_string(),
            iat: now.timestamp(),
            exp: expires.timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ConsentError::Crypto(format!("session encoding failed: {}", e)))
    }

    /// Decodes a session back into the subject it was issued for.
    ///
    /// # Errors
    /// `AuthFailed(SessionInvalid)` for a forged, malformed or expired token.
    pub fn validate(&self, token: &str) -> ConsentResult<VerifiedSubject> {
        let invalid = || ConsentError::AuthFailed(AuthFailure::SessionInvalid);

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        let data = decode::<Claims>(token.trim(), &self.decoding, &validation).map_err(|e| {
            log::warn!("rejected session token: {}", e);
            invalid()
        })?;

        let claims = data.claims;
        if self.clock.now().timestamp() > claims.exp {
            return Err(invalid());
        }
        let verified_at = DateTime::<Utc>::from_timestamp(claims.iat, 0).ok_or_else(invalid)?;
        Ok(VerifiedSubject::new(claims.sub, verified_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::clock::{ManualClock, SystemClock};
    use chrono::TimeZone;

    fn issuer() -> (SessionIssuer, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 2, 1, 9, 0, 0).unwrap(),
        ));
        let issuer = SessionIssuer::new(b"test-secret", TimeDelta::hours(8), clock.clone()).unwrap();
        (issuer, clock)
    }

    #[test]
    fn test_session_round_trip() {
        let (issuer, clock) = issuer();
        let subject = VerifiedSubject::new("did:pg:abc", clock.now());
        let token = issuer.issue(&subject).unwrap();
        assert_eq!(issuer.validate(&token).unwrap(), subject);
    }

    #[test]
    fn test_session_expires() {
        let (issuer, clock) = issuer();
        let token = issuer
            .issue(&VerifiedSubject::new("did:pg:abc", clock.now()))
            .unwrap();
        clock.advance(TimeDelta::hours(8) + TimeDelta::seconds(1));
        assert!(matches!(
            issuer.validate(&token),
            Err(ConsentError::AuthFailed(AuthFailure::SessionInvalid))
        ));
    }

    #[test]
    fn test_foreign_secret_rejected() {
        let (issuer, clock) = issuer();
        let other = SessionIssuer::new(b"other-secret", TimeDelta::hours(8), clock.clone()).unwrap();
        let token = other
            .issue(&VerifiedSubject::new("did:pg:abc", clock.now()))
            .unwrap();
        assert!(issuer.validate(&token).is_err());
        assert!(issuer.validate("not.a.jwt").is_err());
    }

    #[test]
    fn test_empty_secret_refused() {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        assert!(SessionIssuer::new(b"", TimeDelta::hours(1), clock.clone()).is_err());
        assert!(SessionIssuer::new(b"s", TimeDelta::zero(), clock.clone()).is_err());
        assert!(matches!(
            SessionIssuer::new(b"s", TimeDelta::MAX, clock),
            Err(ConsentError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_issue_near_end_of_time_is_an_error() {
        let clock = Arc::new(ManualClock::new(DateTime::<Utc>::MAX_UTC - TimeDelta::hours(1)));
        let issuer = SessionIssuer::new(b"test-secret", TimeDelta::hours(8), clock.clone()).unwrap();
        assert!(matches!(
            issuer.issue(&VerifiedSubject::new("did:pg:abc", clock.now())),
            Err(ConsentError::InvalidInput(_))
        ));
    }
}
