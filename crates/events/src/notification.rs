//! The message pushed to live WebSocket subscribers.

use eln_core::id::UserId;
use serde::Serialize;

/// Lightweight notification enqueued to every subscriber of an owner on a
/// successful sync append. Carries no payload beyond the owner it is for —
/// the subscriber reacts by issuing a normal `Pull`, which is authoritative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncNotification {
    pub owner_user_id: UserId,
}

/// Wire shape sent over the WebSocket: `{"type":"events"}`.
#[derive(Debug, Clone, Serialize)]
pub struct SyncNotificationFrame {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl Default for SyncNotificationFrame {
    fn default() -> Self {
        Self { kind: "events" }
    }
}
