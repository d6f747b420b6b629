//! Conflict Registry: thin append-only store for `ConflictArtifact` rows.
//! Written exclusively by the Experiment Store's addendum path; read-only to
//! every other component.

use serde_json::Value;
use sqlx::{PgPool, Postgres, Row, Transaction};

use eln_core::experiment::ConflictArtifact;
use eln_core::id::{ConflictArtifactId, EntryId, ExperimentId, UserId};
use eln_core::DomainError;

use crate::error::map_sqlx_error;

/// Insert a conflict artifact inside the caller's transaction.
pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    experiment_id: ExperimentId,
    client_base_entry_id: EntryId,
    server_latest_entry_id: EntryId,
    payload: Value,
) -> Result<ConflictArtifact, DomainError> {
    let artifact = ConflictArtifact {
        id: ConflictArtifactId::new(),
        experiment_id,
        client_base_entry_id,
        server_latest_entry_id,
        payload,
        created_at: chrono::Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO conflict_artifacts (id, experiment_id, client_base_entry_id, server_latest_entry_id, payload, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(artifact.id.as_uuid())
    .bind(artifact.experiment_id.as_uuid())
    .bind(artifact.client_base_entry_id.as_uuid())
    .bind(artifact.server_latest_entry_id.as_uuid())
    .bind(&artifact.payload)
    .bind(artifact.created_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("conflict_insert", e))?;

    Ok(artifact)
}

/// Fetch a single artifact by id, for rendering the full 409 body after
/// `add_addendum` reports a stale base via its id alone.
pub async fn get(pool: &PgPool, id: ConflictArtifactId) -> Result<ConflictArtifact, DomainError> {
    let row = sqlx::query(
        r#"
        SELECT id, experiment_id, client_base_entry_id, server_latest_entry_id, payload, created_at
        FROM conflict_artifacts
        WHERE id = $1
        "#,
    )
    .bind(id.as_uuid())
    .fetch_optional(pool)
    .await
    .map_err(|e| map_sqlx_error("conflict_get", e))?
    .ok_or(DomainError::NotFound)?;

    let experiment_id: uuid::Uuid = row.try_get("experiment_id").map_err(|e| map_sqlx_error("conflict_get_row", e))?;
    let client_base_entry_id: uuid::Uuid = row.try_get("client_base_entry_id").map_err(|e| map_sqlx_error("conflict_get_row", e))?;
    let server_latest_entry_id: uuid::Uuid = row.try_get("server_latest_entry_id").map_err(|e| map_sqlx_error("conflict_get_row", e))?;

    Ok(ConflictArtifact {
        id,
        experiment_id: ExperimentId::from_uuid(experiment_id),
        client_base_entry_id: EntryId::from_uuid(client_base_entry_id),
        server_latest_entry_id: EntryId::from_uuid(server_latest_entry_id),
        payload: row.try_get("payload").map_err(|e| map_sqlx_error("conflict_get_row", e))?,
        created_at: row.try_get("created_at").map_err(|e| map_sqlx_error("conflict_get_row", e))?,
    })
}

/// `ListConflicts`: every artifact for experiments owned by `owner_user_id`,
/// most recent first.
pub async fn list_for_owner(pool: &PgPool, owner_user_id: UserId, limit: i64) -> Result<Vec<ConflictArtifact>, DomainError> {
    let rows = sqlx::query(
        r#"
        SELECT c.id, c.experiment_id, c.client_base_entry_id, c.server_latest_entry_id, c.payload, c.created_at
        FROM conflict_artifacts c
        JOIN experiments e ON e.id = c.experiment_id
        WHERE e.owner_user_id = $1
        ORDER BY c.created_at DESC
        LIMIT $2
        "#,
    )
    .bind(owner_user_id.as_uuid())
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(|e| map_sqlx_error("conflict_list", e))?;

    let mut artifacts = Vec::with_capacity(rows.len());
    for row in rows {
        let id: uuid::Uuid = row.try_get("id").map_err(|e| map_sqlx_error("conflict_list_row", e))?;
        let experiment_id: uuid::Uuid = row.try_get("experiment_id").map_err(|e| map_sqlx_error("conflict_list_row", e))?;
        let client_base_entry_id: uuid::Uuid = row.try_get("client_base_entry_id").map_err(|e| map_sqlx_error("conflict_list_row", e))?;
        let server_latest_entry_id: uuid::Uuid = row.try_get("server_latest_entry_id").map_err(|e| map_sqlx_error("conflict_list_row", e))?;
        artifacts.push(ConflictArtifact {
            id: ConflictArtifactId::from_uuid(id),
            experiment_id: ExperimentId::from_uuid(experiment_id),
            client_base_entry_id: EntryId::from_uuid(client_base_entry_id),
            server_latest_entry_id: EntryId::from_uuid(server_latest_entry_id),
            payload: row.try_get("payload").map_err(|e| map_sqlx_error("conflict_list_row", e))?,
            created_at: row.try_get("created_at").map_err(|e| map_sqlx_error("conflict_list_row", e))?,
        });
    }
    Ok(artifacts)
}
