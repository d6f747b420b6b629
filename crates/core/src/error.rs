//! Domain error model.
//!
//! Errors are tagged variants, not stringly-typed: the HTTP surface maps each
//! variant to a status code via a single table rather than pattern-matching on
//! messages (see `eln_api::errors`).

use thiserror::Error;

use crate::id::ConflictArtifactId;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts, authorization). Transport concerns (status codes,
/// response bodies) live at the HTTP boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A request was malformed (e.g. empty title, malformed checksum).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No valid credential/session was presented.
    #[error("unauthenticated")]
    Unauthenticated,

    /// A credential was presented but does not authorize this operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// An identifier was invalid (parse failure) or named no visible resource.
    #[error("not found")]
    NotFound,

    /// An addendum's base entry was stale, or a refresh token was reused.
    ///
    /// `conflict_artifact_id` is populated for the addendum case so HTTP
    /// handlers can surface a machine-readable identifier without a second
    /// lookup.
    #[error("conflict: {message}")]
    Conflict {
        message: String,
        conflict_artifact_id: Option<ConflictArtifactId>,
    },

    /// Password reauthentication (e-signature) did not match the stored credential.
    #[error("invalid password")]
    InvalidPassword,

    /// Storage or other I/O failure. Never includes stack traces in its Display.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict {
            message: msg.into(),
            conflict_artifact_id: None,
        }
    }

    pub fn stale_addendum(artifact_id: ConflictArtifactId) -> Self {
        Self::Conflict {
            message: "addendum base entry is stale".to_string(),
            conflict_artifact_id: Some(artifact_id),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

