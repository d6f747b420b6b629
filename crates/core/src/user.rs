//! Credential holders. Password hashing/verification lives in `eln-auth`;
//! this module only holds the data shape and the normalization rule that
//! everything else (login, uniqueness checks) must agree on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::id::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Admin,
    Viewer,
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Viewer => "viewer",
        };
        f.write_str(s)
    }
}

/// A credential holder and role assignee.
///
/// `password_hash` is never serialized: it is skipped on output and absent
/// from `Deserialize` entirely, so a `User` built from an API request body
/// simply cannot carry one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl User {
    /// Normalize an email for uniqueness comparison and storage: lowercased,
    /// surrounding whitespace trimmed.
    pub fn normalize_email(email: &str) -> String {
        email.trim().to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(User::normalize_email("  Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn password_hash_is_not_serialized() {
        let user = User {
            id: UserId::new(),
            email: "alice@example.com".to_string(),
            password_hash: "$argon2id$v=19$...".to_string(),
            display_name: "Alice".to_string(),
            role: Role::Owner,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2id"));
        assert!(!json.contains("password_hash"));
    }
}
