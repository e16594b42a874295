// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HS256 session tokens.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::{AuthError, AuthenticatedUser};

/// Session lifetime.
pub const SESSION_TTL_HOURS: i64 = 24;

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    /// Account id
    sub: String,
    iat: i64,
    exp: i64,
}

/// Issues and verifies session tokens with a shared secret.
pub struct SessionManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl: Duration::hours(SESSION_TTL_HOURS),
        }
    }

    #[cfg(test)]
    fn with_ttl(secret: &[u8], ttl: Duration) -> Self {
        Self {
            ttl,
            ..Self::new(secret)
        }
    }

    /// Lifetime of issued tokens in seconds (cookie `Max-Age`).
    pub fn ttl_secs(&self) -> i64 {
        self.ttl.num_seconds()
    }

    /// Issue a token for `account_id`.
    pub fn issue(&self, account_id: &str) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: account_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::InternalError(e.to_string()))
    }

    /// Verify a token and return the principal it names.
    pub fn verify(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = CLOCK_SKEW_LEEWAY;

        let data = decode::<SessionClaims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                _ => AuthError::MalformedToken,
            }
        })?;

        Ok(AuthenticatedUser {
            account_id: data.claims.sub,
            expires_at: data.claims.exp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_and_verify() {
        let sessions = SessionManager::new(b"test-secret");
        let token = sessions.issue("acc-1").unwrap();
        let user = sessions.verify(&token).unwrap();
        assert_eq!(user.account_id, "acc-1");
        assert!(user.expires_at > Utc::now().timestamp());
    }

    #[test]
    fn wrong_secret_rejected() {
        let token = SessionManager::new(b"one").issue("acc-1").unwrap();
        let err = SessionManager::new(b"two").verify(&token).unwrap_err();
        assert!(matches!(err, AuthError::InvalidSignature));
    }

    #[test]
    fn expired_token_rejected() {
        let sessions = SessionManager::with_ttl(b"secret", Duration::hours(-2));
        let token = sessions.issue("acc-1").unwrap();
        assert!(matches!(
            sessions.verify(&token).unwrap_err(),
            AuthError::TokenExpired
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        let sessions = SessionManager::new(b"secret");
        assert!(matches!(
            sessions.verify("not.a.jwt").unwrap_err(),
            AuthError::MalformedToken
        ));
    }
}
