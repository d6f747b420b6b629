//! JWT claims model and validation.
//!
//! Claims validation (exp/iat sanity) is deterministic and kept separate
//! from signature verification, which requires the secret and talks to the
//! `jsonwebtoken` crate directly. Splitting the two means the pure
//! validation logic is exercised by cheap unit tests without needing to
//! mint a signed token.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use eln_core::id::{DeviceId, UserId};
use eln_core::user::Role;

use crate::principal::Principal;

/// Claims embedded in an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject: the authenticated user.
    pub sub: UserId,

    /// Role at the time of issuance. Tokens are short-lived enough that a
    /// role change takes effect on the next login/refresh rather than mid-token.
    pub role: Role,

    /// Device the token was issued to; scopes sync cursors and audit actors.
    pub device_id: DeviceId,

    #[serde(rename = "iat", with = "chrono::serde::ts_seconds")]
    pub issued_at: DateTime<Utc>,

    #[serde(rename = "exp", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

impl JwtClaims {
    pub fn into_principal(self) -> Principal {
        Principal {
            user_id: self.sub,
            role: self.role,
            device_id: self.device_id,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("missing token")]
    MissingToken,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,
}

/// Deterministically validate JWT claims' time window.
///
/// Signature verification / decoding is intentionally outside this
/// function — see [`Hs256JwtValidator`].
pub fn validate_claims(claims: &JwtClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

/// JWT validator abstraction (keeps the API crate decoupled from token
/// decoding details).
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError>;
}

/// HS256 validator: signature verification via `jsonwebtoken`, then
/// deterministic claims validation.
#[derive(Debug, Clone)]
pub struct Hs256JwtValidator {
    secret: Vec<u8>,
}

impl Hs256JwtValidator {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Encode a fresh access token for `claims`, signed with this
    /// validator's secret.
    pub fn encode(&self, claims: &JwtClaims) -> Result<String, TokenValidationError> {
        jsonwebtoken::encode(
            &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
            claims,
            &jsonwebtoken::EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| TokenValidationError::InvalidToken(e.to_string()))
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError> {
        if token.trim().is_empty() {
            return Err(TokenValidationError::MissingToken);
        }

        let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
        // Validated deterministically by `validate_claims` below instead.
        validation.validate_exp = false;
        validation.validate_nbf = false;

        let decoded = jsonwebtoken::decode::<JwtClaims>(
            token,
            &jsonwebtoken::DecodingKey::from_secret(&self.secret),
            &validation,
        )
        .map_err(|e| TokenValidationError::InvalidToken(e.to_string()))?;

        validate_claims(&decoded.claims, now)?;
        Ok(decoded.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn claims(issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> JwtClaims {
        JwtClaims {
            sub: UserId::new(),
            role: Role::Owner,
            device_id: DeviceId::new("device-1"),
            issued_at,
            expires_at,
        }
    }

    #[test]
    fn rejects_inverted_time_window() {
        let now = Utc::now();
        let c = claims(now, now - Duration::seconds(1));
        assert_eq!(validate_claims(&c, now), Err(TokenValidationError::InvalidTimeWindow));
    }

    #[test]
    fn rejects_not_yet_valid() {
        let now = Utc::now();
        let c = claims(now + Duration::seconds(60), now + Duration::seconds(120));
        assert_eq!(validate_claims(&c, now), Err(TokenValidationError::NotYetValid));
    }

    #[test]
    fn rejects_expired() {
        let now = Utc::now();
        let c = claims(now - Duration::seconds(120), now - Duration::seconds(60));
        assert_eq!(validate_claims(&c, now), Err(TokenValidationError::Expired));
    }

    #[test]
    fn accepts_token_within_window() {
        let now = Utc::now();
        let c = claims(now - Duration::seconds(1), now + Duration::seconds(60));
        assert!(validate_claims(&c, now).is_ok());
    }

    #[test]
    fn round_trips_through_encode_and_validate() {
        let validator = Hs256JwtValidator::new(b"test-secret".to_vec());
        let now = Utc::now();
        let c = claims(now - Duration::seconds(1), now + Duration::seconds(60));
        let token = validator.encode(&c).unwrap();
        let decoded = validator.validate(&token, now).unwrap();
        assert_eq!(decoded, c);
    }

    #[test]
    fn rejects_token_signed_with_a_different_secret() {
        let signer = Hs256JwtValidator::new(b"secret-a".to_vec());
        let verifier = Hs256JwtValidator::new(b"secret-b".to_vec());
        let now = Utc::now();
        let c = claims(now - Duration::seconds(1), now + Duration::seconds(60));
        let token = signer.encode(&c).unwrap();
        assert!(verifier.validate(&token, now).is_err());
    }
}
