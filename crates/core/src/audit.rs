//! Audit hash chain record and the pure functions used to compute and
//! verify it. Storage (sequencing under an advisory lock, appends, reading a
//! consistent snapshot for verification) lives in `eln-infra`; this module
//! only knows how to compute `thisHash` from a record's fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::canonical::canonicalize;
use crate::id::UserId;

/// `thisHash` of the event preceding sequence 1. Fixed, not derived.
pub const GENESIS_HASH: [u8; 32] = [0u8; 32];

/// A single hash-chained write record. `this_hash` is computed by
/// [`compute_hash`] and must match what is stored; [`verify_link`] checks
/// that a record's stored hash is consistent with its own fields and the
/// hash of its predecessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub sequence: i64,
    pub actor_user_id: UserId,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub payload: Value,
    pub prev_hash: [u8; 32],
    pub this_hash: [u8; 32],
    pub created_at: DateTime<Utc>,
}

/// Compute `thisHash` for a record about to be appended at `sequence`,
/// chained onto `prev_hash`.
///
/// `H(sequence ‖ actorUserId ‖ eventType ‖ aggregateType ‖ aggregateId ‖
/// canonical(payload) ‖ prevHash ‖ createdAt)`, all fields concatenated as
/// their canonical string/byte forms, with `‖` a literal `|` separator so
/// variable-length fields cannot be confused for one another.
pub fn compute_hash(
    sequence: i64,
    actor_user_id: UserId,
    event_type: &str,
    aggregate_type: &str,
    aggregate_id: &str,
    payload: &Value,
    prev_hash: &[u8; 32],
    created_at: DateTime<Utc>,
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(sequence.to_be_bytes());
    hasher.update(b"|");
    hasher.update(actor_user_id.as_uuid().as_bytes());
    hasher.update(b"|");
    hasher.update(event_type.as_bytes());
    hasher.update(b"|");
    hasher.update(aggregate_type.as_bytes());
    hasher.update(b"|");
    hasher.update(aggregate_id.as_bytes());
    hasher.update(b"|");
    hasher.update(canonicalize(payload));
    hasher.update(b"|");
    hasher.update(prev_hash);
    hasher.update(b"|");
    hasher.update(created_at.to_rfc3339().as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Recompute `event`'s hash from its own fields and compare against its
/// stored `this_hash`. Does not check `prev_hash` linkage to a predecessor;
/// callers walking the full chain also compare `event.prev_hash` against
/// the previous event's `this_hash`.
pub fn recompute_matches(event: &AuditEvent) -> bool {
    let recomputed = compute_hash(
        event.sequence,
        event.actor_user_id,
        &event.event_type,
        &event.aggregate_type,
        &event.aggregate_id,
        &event.payload,
        &event.prev_hash,
        event.created_at,
    );
    recomputed == event.this_hash
}

/// Result of walking the full chain in `eln-infra`'s verifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub valid: bool,
    pub checked_events: u64,
    pub broken_at_sequence: Option<i64>,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_event(sequence: i64, prev_hash: [u8; 32]) -> AuditEvent {
        let actor_user_id = UserId::new();
        let payload = json!({"title": "Gel A"});
        let created_at = Utc::now();
        let this_hash = compute_hash(
            sequence,
            actor_user_id,
            "experiment.created",
            "experiment",
            "exp-1",
            &payload,
            &prev_hash,
            created_at,
        );
        AuditEvent {
            sequence,
            actor_user_id,
            event_type: "experiment.created".to_string(),
            aggregate_type: "experiment".to_string(),
            aggregate_id: "exp-1".to_string(),
            payload,
            prev_hash,
            this_hash,
            created_at,
        }
    }

    #[test]
    fn freshly_computed_hash_matches() {
        let event = sample_event(1, GENESIS_HASH);
        assert!(recompute_matches(&event));
    }

    #[test]
    fn tampering_with_payload_breaks_verification() {
        let mut event = sample_event(1, GENESIS_HASH);
        event.payload = json!({"title": "tampered"});
        assert!(!recompute_matches(&event));
    }

    #[test]
    fn chain_links_via_prev_hash() {
        let first = sample_event(1, GENESIS_HASH);
        let second = sample_event(2, first.this_hash);
        assert_eq!(second.prev_hash, first.this_hash);
        assert!(recompute_matches(&first));
        assert!(recompute_matches(&second));
    }

    #[test]
    fn same_fields_hash_identically_regardless_of_payload_key_order() {
        let actor_user_id = UserId::new();
        let created_at = Utc::now();
        let a = compute_hash(
            1,
            actor_user_id,
            "t",
            "agg",
            "id",
            &json!({"a": 1, "b": 2}),
            &GENESIS_HASH,
            created_at,
        );
        let b = compute_hash(
            1,
            actor_user_id,
            "t",
            "agg",
            "id",
            &json!({"b": 2, "a": 1}),
            &GENESIS_HASH,
            created_at,
        );
        assert_eq!(a, b);
    }
}
