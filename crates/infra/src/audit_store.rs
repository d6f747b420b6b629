//! Hash-chained audit log storage: append under an advisory lock, verify the
//! full chain online.
//!
//! The advisory lock is acquired for the duration of the caller's
//! transaction (`pg_advisory_xact_lock`, auto-released at commit/rollback),
//! which is what makes "read the tip, compute thisHash, insert" race-free
//! without holding a row lock on `audit_log` itself.

use chrono::Utc;
use serde_json::Value;
use sqlx::{Postgres, Row, Transaction};

use eln_core::audit::{compute_hash, recompute_matches, AuditEvent, VerificationResult, GENESIS_HASH};
use eln_core::id::UserId;
use eln_core::DomainError;

use crate::db::AUDIT_LOCK_KEY;
use crate::error::map_sqlx_error;

#[derive(Debug, Clone)]
pub struct AuditAppend<'a> {
    pub actor_user_id: UserId,
    pub event_type: &'a str,
    pub aggregate_type: &'a str,
    pub aggregate_id: &'a str,
    pub payload: Value,
}

/// Append one audit event inside `tx`. The caller's transaction must also
/// contain the data change and any sync append; all three commit or roll
/// back together.
pub async fn append(
    tx: &mut Transaction<'_, Postgres>,
    event: AuditAppend<'_>,
) -> Result<i64, DomainError> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(AUDIT_LOCK_KEY)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("audit_advisory_lock", e))?;

    let tip_row = sqlx::query("SELECT sequence, this_hash FROM audit_log ORDER BY sequence DESC LIMIT 1")
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("audit_read_tip", e))?;

    let (prev_sequence, prev_hash): (i64, [u8; 32]) = match tip_row {
        Some(row) => {
            let seq: i64 = row.try_get("sequence").map_err(|e| map_sqlx_error("audit_read_tip", e))?;
            let hash: Vec<u8> = row.try_get("this_hash").map_err(|e| map_sqlx_error("audit_read_tip", e))?;
            let mut arr = [0u8; 32];
            arr.copy_from_slice(&hash);
            (seq, arr)
        }
        None => (0, GENESIS_HASH),
    };

    let sequence = prev_sequence + 1;
    let created_at = Utc::now();
    let this_hash = compute_hash(
        sequence,
        event.actor_user_id,
        event.event_type,
        event.aggregate_type,
        event.aggregate_id,
        &event.payload,
        &prev_hash,
        created_at,
    );

    sqlx::query(
        r#"
        INSERT INTO audit_log (sequence, actor_user_id, event_type, aggregate_type, aggregate_id, payload, prev_hash, this_hash, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(sequence)
    .bind(event.actor_user_id.as_uuid())
    .bind(event.event_type)
    .bind(event.aggregate_type)
    .bind(event.aggregate_id)
    .bind(&event.payload)
    .bind(&prev_hash[..])
    .bind(&this_hash[..])
    .bind(created_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("audit_insert", e))?;

    Ok(sequence)
}

/// Walk the chain in ascending sequence order and recompute every hash.
/// Reads a single consistent snapshot (one query) so it never blocks or is
/// blocked by concurrent appends for longer than that query takes.
pub async fn verify_chain(pool: &sqlx::PgPool) -> Result<VerificationResult, DomainError> {
    let rows = sqlx::query(
        r#"
        SELECT sequence, actor_user_id, event_type, aggregate_type, aggregate_id, payload, prev_hash, this_hash, created_at
        FROM audit_log
        ORDER BY sequence ASC
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|e| map_sqlx_error("audit_verify_scan", e))?;

    let mut expected_prev_hash = GENESIS_HASH;
    let mut checked: u64 = 0;

    for row in rows {
        let sequence: i64 = row.try_get("sequence").map_err(|e| map_sqlx_error("audit_verify_row", e))?;
        let actor_user_id: uuid::Uuid = row.try_get("actor_user_id").map_err(|e| map_sqlx_error("audit_verify_row", e))?;
        let event_type: String = row.try_get("event_type").map_err(|e| map_sqlx_error("audit_verify_row", e))?;
        let aggregate_type: String = row.try_get("aggregate_type").map_err(|e| map_sqlx_error("audit_verify_row", e))?;
        let aggregate_id: String = row.try_get("aggregate_id").map_err(|e| map_sqlx_error("audit_verify_row", e))?;
        let payload: Value = row.try_get("payload").map_err(|e| map_sqlx_error("audit_verify_row", e))?;
        let prev_hash_bytes: Vec<u8> = row.try_get("prev_hash").map_err(|e| map_sqlx_error("audit_verify_row", e))?;
        let this_hash_bytes: Vec<u8> = row.try_get("this_hash").map_err(|e| map_sqlx_error("audit_verify_row", e))?;
        let created_at = row.try_get("created_at").map_err(|e| map_sqlx_error("audit_verify_row", e))?;

        let mut prev_hash = [0u8; 32];
        prev_hash.copy_from_slice(&prev_hash_bytes);
        let mut this_hash = [0u8; 32];
        this_hash.copy_from_slice(&this_hash_bytes);

        if prev_hash != expected_prev_hash {
            return Ok(VerificationResult {
                valid: false,
                checked_events: checked,
                broken_at_sequence: Some(sequence),
                message: format!("prevHash mismatch at sequence {sequence}"),
            });
        }

        let event = AuditEvent {
            sequence,
            actor_user_id: UserId::from_uuid(actor_user_id),
            event_type,
            aggregate_type,
            aggregate_id,
            payload,
            prev_hash,
            this_hash,
            created_at,
        };

        if !recompute_matches(&event) {
            return Ok(VerificationResult {
                valid: false,
                checked_events: checked,
                broken_at_sequence: Some(sequence),
                message: format!("thisHash mismatch at sequence {sequence}"),
            });
        }

        checked += 1;
        expected_prev_hash = this_hash;
    }

    Ok(VerificationResult {
        valid: true,
        checked_events: checked,
        broken_at_sequence: None,
        message: format!("{checked} events verified"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advisory_lock_key_is_nonzero() {
        assert_ne!(AUDIT_LOCK_KEY, 0);
    }
}
