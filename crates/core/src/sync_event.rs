//! Per-owner sync change notifications (the event log clients pull from).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::{DeviceId, UserId};

/// A single change notification, sequenced monotonically within its owner.
///
/// Sequence is gap-free per `owner_user_id`; across owners there is no
/// ordering relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    pub sequence: i64,
    pub owner_user_id: UserId,
    pub actor_user_id: UserId,
    pub device_id: DeviceId,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to append a sync event; `sequence` is assigned by the
/// store under the per-owner sequence lock, not supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSyncEvent {
    pub owner_user_id: UserId,
    pub actor_user_id: UserId,
    pub device_id: DeviceId,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub payload: Value,
}

/// A page of sync events returned by `Pull`, plus the cursor to resume from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPage {
    pub events: Vec<SyncEvent>,
    pub next_cursor: i64,
}

impl SyncPage {
    /// `next_cursor` is the last event's sequence, or the caller's own
    /// cursor unchanged when the page is empty (Pull is idempotent and does
    /// not advance the cursor when there is nothing new).
    pub fn from_events(events: Vec<SyncEvent>, requested_cursor: i64) -> Self {
        let next_cursor = events.last().map(|e| e.sequence).unwrap_or(requested_cursor);
        Self { events, next_cursor }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(sequence: i64) -> SyncEvent {
        SyncEvent {
            sequence,
            owner_user_id: UserId::new(),
            actor_user_id: UserId::new(),
            device_id: DeviceId::new("device-1"),
            event_type: "experiment.created".to_string(),
            aggregate_type: "experiment".to_string(),
            aggregate_id: "exp-1".to_string(),
            payload: serde_json::json!({}),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_page_does_not_advance_cursor() {
        let page = SyncPage::from_events(vec![], 7);
        assert_eq!(page.next_cursor, 7);
    }

    #[test]
    fn non_empty_page_advances_to_last_sequence() {
        let page = SyncPage::from_events(vec![event(8), event(9)], 7);
        assert_eq!(page.next_cursor, 9);
    }
}
