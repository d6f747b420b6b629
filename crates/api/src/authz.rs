//! API-side authorization guard.
//!
//! Thin wrapper over [`eln_auth::authorize`]'s pure gate rules: turns the
//! request's resolved principal plus an [`Action`] into a [`DomainError`] so
//! route handlers can `?` straight into the shared error mapping.

use eln_auth::{authorize, Action};
use eln_core::DomainError;

use crate::context::RequestPrincipal;

pub fn require(principal: &RequestPrincipal, action: Action<'_>) -> Result<(), DomainError> {
    authorize(principal, action).map_err(|_| DomainError::forbidden("not authorized for this operation"))
}
