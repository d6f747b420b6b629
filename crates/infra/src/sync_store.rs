//! Per-owner monotonic sync event log: append (inside the caller's
//! transaction), cursor-based pull, and the live WS fan-out that rides on
//! top of a successful append.

use serde_json::Value;
use sqlx::{PgPool, Postgres, Row, Transaction};

use eln_core::id::{DeviceId, UserId};
use eln_core::sync_event::{SyncEvent, SyncPage};
use eln_core::DomainError;
use eln_events::{OwnerFanout, SyncNotification};

use crate::error::map_sqlx_error;

#[derive(Debug, Clone)]
pub struct SyncAppend<'a> {
    pub owner_user_id: UserId,
    pub actor_user_id: UserId,
    pub device_id: &'a DeviceId,
    pub event_type: &'a str,
    pub aggregate_type: &'a str,
    pub aggregate_id: &'a str,
    pub payload: Value,
}

/// Append one sync event inside `tx`, under a row lock on that owner's
/// cursor record. Never call standalone — always inside the write's own
/// transaction alongside the data change and audit append.
pub async fn append(
    tx: &mut Transaction<'_, Postgres>,
    event: SyncAppend<'_>,
) -> Result<i64, DomainError> {
    sqlx::query(
        r#"
        INSERT INTO sync_owner_cursors (owner_user_id, last_sequence)
        VALUES ($1, 0)
        ON CONFLICT (owner_user_id) DO NOTHING
        "#,
    )
    .bind(event.owner_user_id.as_uuid())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("sync_seed_cursor", e))?;

    let row = sqlx::query(
        "SELECT last_sequence FROM sync_owner_cursors WHERE owner_user_id = $1 FOR UPDATE",
    )
    .bind(event.owner_user_id.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("sync_lock_cursor", e))?;

    let last_sequence: i64 = row.try_get("last_sequence").map_err(|e| map_sqlx_error("sync_lock_cursor", e))?;
    let sequence = last_sequence + 1;

    sqlx::query("UPDATE sync_owner_cursors SET last_sequence = $1 WHERE owner_user_id = $2")
        .bind(sequence)
        .bind(event.owner_user_id.as_uuid())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("sync_advance_cursor", e))?;

    let created_at = chrono::Utc::now();

    sqlx::query(
        r#"
        INSERT INTO sync_events (owner_user_id, sequence, actor_user_id, device_id, event_type, aggregate_type, aggregate_id, payload, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(event.owner_user_id.as_uuid())
    .bind(sequence)
    .bind(event.actor_user_id.as_uuid())
    .bind(event.device_id.as_str())
    .bind(event.event_type)
    .bind(event.aggregate_type)
    .bind(event.aggregate_id)
    .bind(&event.payload)
    .bind(created_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("sync_insert_event", e))?;

    Ok(sequence)
}

/// Notify the fan-out after the append's transaction has committed. Kept as
/// a separate call (not inside `append`) so a transaction that later rolls
/// back never fires a notification for an event nobody can Pull yet.
pub fn notify(fanout: &OwnerFanout<SyncNotification>, owner_user_id: UserId) {
    fanout.publish(owner_user_id, SyncNotification { owner_user_id });
}

/// `(cursor, cursor+limit]`, ordered by sequence ascending. Idempotent: an
/// empty result leaves `next_cursor` equal to the requested cursor.
pub async fn pull(pool: &PgPool, owner_user_id: UserId, cursor: i64, limit: i64) -> Result<SyncPage, DomainError> {
    let rows = sqlx::query(
        r#"
        SELECT sequence, owner_user_id, actor_user_id, device_id, event_type, aggregate_type, aggregate_id, payload, created_at
        FROM sync_events
        WHERE owner_user_id = $1 AND sequence > $2
        ORDER BY sequence ASC
        LIMIT $3
        "#,
    )
    .bind(owner_user_id.as_uuid())
    .bind(cursor)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(|e| map_sqlx_error("sync_pull", e))?;

    let mut events = Vec::with_capacity(rows.len());
    for row in rows {
        let device_id: String = row.try_get("device_id").map_err(|e| map_sqlx_error("sync_pull_row", e))?;
        let owner: uuid::Uuid = row.try_get("owner_user_id").map_err(|e| map_sqlx_error("sync_pull_row", e))?;
        let actor: uuid::Uuid = row.try_get("actor_user_id").map_err(|e| map_sqlx_error("sync_pull_row", e))?;
        events.push(SyncEvent {
            sequence: row.try_get("sequence").map_err(|e| map_sqlx_error("sync_pull_row", e))?,
            owner_user_id: UserId::from_uuid(owner),
            actor_user_id: UserId::from_uuid(actor),
            device_id: DeviceId::new(device_id),
            event_type: row.try_get("event_type").map_err(|e| map_sqlx_error("sync_pull_row", e))?,
            aggregate_type: row.try_get("aggregate_type").map_err(|e| map_sqlx_error("sync_pull_row", e))?,
            aggregate_id: row.try_get("aggregate_id").map_err(|e| map_sqlx_error("sync_pull_row", e))?,
            payload: row.try_get("payload").map_err(|e| map_sqlx_error("sync_pull_row", e))?,
            created_at: row.try_get("created_at").map_err(|e| map_sqlx_error("sync_pull_row", e))?,
        });
    }

    Ok(SyncPage::from_events(events, cursor))
}
