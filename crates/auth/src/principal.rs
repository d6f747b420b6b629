//! The authenticated caller, as resolved from a validated bearer token.

use eln_core::id::{DeviceId, UserId};
use eln_core::user::Role;

/// A fully resolved principal for authorization decisions.
///
/// Construction is decoupled from storage and transport: the HTTP layer
/// builds this directly from validated JWT claims, with no further lookup
/// required for the gate rules in [`crate::authorize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
    pub device_id: DeviceId,
}
