//! Reconciliation finding model: what `eln-infra`'s scheduled reconciler
//! writes when DB and object-store state diverge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::Entity;
use crate::id::ReconcileFindingId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileFindingKind {
    StaleInitiated,
    MissingChecksum,
    IntegrityMismatch,
    OrphanObject,
}

/// A single reconciliation finding, deduplicated across runs by
/// `(kind, object_key_or_attachment_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileFinding {
    pub id: ReconcileFindingId,
    pub run_id: String,
    pub object_key_or_attachment_id: String,
    pub kind: ReconcileFindingKind,
    pub detail: Value,
    pub created_at: DateTime<Utc>,
}

impl Entity for ReconcileFinding {
    type Id = ReconcileFindingId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Counts surfaced by one reconciliation pass, returned to the ops caller
/// and used as `staleInitiatedCount` etc. in the end-to-end scenario.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileCounts {
    pub stale_initiated: u64,
    pub missing_checksum: u64,
    pub integrity_mismatch: u64,
    pub orphan_object: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_key_is_kind_and_subject() {
        let a = ReconcileFinding {
            id: ReconcileFindingId::new(),
            run_id: "run-1".to_string(),
            object_key_or_attachment_id: "obj-1".to_string(),
            kind: ReconcileFindingKind::StaleInitiated,
            detail: serde_json::json!({}),
            created_at: Utc::now(),
        };
        let b = ReconcileFinding {
            id: ReconcileFindingId::new(),
            run_id: "run-2".to_string(),
            ..a.clone()
        };
        assert_eq!(
            (a.kind, a.object_key_or_attachment_id.clone()),
            (b.kind, b.object_key_or_attachment_id.clone())
        );
    }
}
