//! Single-use refresh token rotation records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::id::{DeviceId, RefreshTokenId, UserId};

/// A rotation record backing `/v1/auth/refresh`. The bearer token itself is
/// never stored, only `token_hash` (a SHA-256 of the token, so a leaked
/// database dump does not hand out live sessions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: RefreshTokenId,
    pub user_id: UserId,
    pub device_id: DeviceId,
    pub token_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub replaced_by_token_id: Option<RefreshTokenId>,
}

impl Entity for RefreshToken {
    type Id = RefreshTokenId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl RefreshToken {
    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether this token may still be redeemed at `now`: unused and not
    /// expired. Reuse of an already-used-or-expired token is a forensic
    /// signal, not an ordinary failure — callers revoke the device's
    /// remaining chain when this returns `false` for a token presented as
    /// fresh.
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        !self.is_used() && !self.is_expired(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn fresh_token() -> RefreshToken {
        let now = Utc::now();
        RefreshToken {
            id: RefreshTokenId::new(),
            user_id: UserId::new(),
            device_id: DeviceId::new("device-1"),
            token_hash: "hash".to_string(),
            issued_at: now,
            expires_at: now + Duration::days(30),
            used_at: None,
            replaced_by_token_id: None,
        }
    }

    #[test]
    fn fresh_token_is_redeemable() {
        assert!(fresh_token().is_redeemable(Utc::now()));
    }

    #[test]
    fn used_token_is_not_redeemable() {
        let mut token = fresh_token();
        token.used_at = Some(Utc::now());
        assert!(!token.is_redeemable(Utc::now()));
    }

    #[test]
    fn expired_token_is_not_redeemable() {
        let token = fresh_token();
        assert!(!token.is_redeemable(token.expires_at + Duration::seconds(1)));
    }
}
