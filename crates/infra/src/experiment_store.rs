//! Experiment Store: the only gateway that creates or extends experiment
//! history. Every write here is one transaction containing the data change,
//! the audit append, and the sync append.

use serde_json::json;
use sqlx::{PgPool, Row};

use eln_core::experiment::{Entry, EntryType, Experiment, ExperimentStatus};
use eln_core::id::{DeviceId, EntryId, ExperimentId, UserId};
use eln_core::{DomainError, DomainResult};

use crate::audit_store::{self, AuditAppend};
use crate::conflict_store;
use crate::error::map_sqlx_error;
use crate::sync_store::{self, SyncAppend};
use eln_events::{OwnerFanout, SyncNotification};

pub struct CreatedExperiment {
    pub experiment_id: ExperimentId,
    pub original_entry_id: EntryId,
    pub status: ExperimentStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

pub struct AddedAddendum {
    pub entry_id: EntryId,
    pub supersedes_entry_id: EntryId,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

pub struct EffectiveView {
    pub experiment: Experiment,
    pub original_entry_id: EntryId,
    pub effective_entry_id: EntryId,
    pub effective_body: String,
}

pub async fn create_experiment(
    pool: &PgPool,
    fanout: &OwnerFanout<SyncNotification>,
    owner_user_id: UserId,
    device_id: &DeviceId,
    title: &str,
    original_body: &str,
) -> DomainResult<CreatedExperiment> {
    let title = Experiment::validate_title(title)?;

    let mut tx = pool.begin().await.map_err(|e| map_sqlx_error("create_experiment_begin", e))?;

    let experiment_id = ExperimentId::new();
    let original_entry_id = EntryId::new();
    let now = chrono::Utc::now();

    sqlx::query(
        r#"
        INSERT INTO experiments (id, owner_user_id, title, status, created_at, updated_at)
        VALUES ($1, $2, $3, 'draft', $4, $4)
        "#,
    )
    .bind(experiment_id.as_uuid())
    .bind(owner_user_id.as_uuid())
    .bind(&title)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(|e| map_sqlx_error("create_experiment_insert", e))?;

    sqlx::query(
        r#"
        INSERT INTO experiment_entries (id, experiment_id, author_user_id, entry_type, supersedes_entry_id, body, created_at)
        VALUES ($1, $2, $3, 'original', NULL, $4, $5)
        "#,
    )
    .bind(original_entry_id.as_uuid())
    .bind(experiment_id.as_uuid())
    .bind(owner_user_id.as_uuid())
    .bind(original_body)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(|e| map_sqlx_error("create_experiment_entry", e))?;

    let payload = json!({
        "experimentId": experiment_id.to_string(),
        "title": title,
        "originalEntryId": original_entry_id.to_string(),
    });

    audit_store::append(
        &mut tx,
        AuditAppend {
            actor_user_id: owner_user_id,
            event_type: "experiment.created",
            aggregate_type: "experiment",
            aggregate_id: &experiment_id.to_string(),
            payload: payload.clone(),
        },
    )
    .await?;

    sync_store::append(
        &mut tx,
        SyncAppend {
            owner_user_id,
            actor_user_id: owner_user_id,
            device_id,
            event_type: "experiment.created",
            aggregate_type: "experiment",
            aggregate_id: &experiment_id.to_string(),
            payload,
        },
    )
    .await?;

    tx.commit().await.map_err(|e| map_sqlx_error("create_experiment_commit", e))?;
    sync_store::notify(fanout, owner_user_id);

    Ok(CreatedExperiment {
        experiment_id,
        original_entry_id,
        status: ExperimentStatus::Draft,
        created_at: now,
    })
}

/// Add an addendum, or on a stale base, write a `ConflictArtifact` and
/// return the tagged `Conflict` error carrying its id.
pub async fn add_addendum(
    pool: &PgPool,
    fanout: &OwnerFanout<SyncNotification>,
    experiment_id: ExperimentId,
    owner_user_id: UserId,
    device_id: &DeviceId,
    base_entry_id: EntryId,
    body: &str,
) -> DomainResult<AddedAddendum> {
    let trimmed_body = body.trim();
    if trimmed_body.is_empty() {
        return Err(DomainError::invalid_input("addendum body must not be empty"));
    }

    let mut tx = pool.begin().await.map_err(|e| map_sqlx_error("add_addendum_begin", e))?;

    let exp_row = sqlx::query("SELECT status FROM experiments WHERE id = $1 FOR UPDATE")
        .bind(experiment_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("add_addendum_lock_experiment", e))?
        .ok_or_else(DomainError::not_found)?;

    let status: String = exp_row.try_get("status").map_err(|e| map_sqlx_error("add_addendum_status", e))?;
    if status != "draft" {
        return Err(DomainError::forbidden("experiment is completed"));
    }

    let history = load_history(&mut tx, experiment_id).await?;
    let effective = Entry::effective(&history);
    let effective_id = effective.id;

    if base_entry_id != effective_id {
        let payload = json!({ "body": trimmed_body, "deviceId": device_id.as_str() });
        let artifact = conflict_store::insert(&mut tx, experiment_id, base_entry_id, effective_id, payload.clone()).await?;

        let audit_payload = json!({
            "conflictArtifactId": artifact.id.to_string(),
            "clientBaseEntryId": base_entry_id.to_string(),
            "serverLatestEntryId": effective_id.to_string(),
        });
        audit_store::append(
            &mut tx,
            AuditAppend {
                actor_user_id: owner_user_id,
                event_type: "conflict.stale_addendum",
                aggregate_type: "experiment",
                aggregate_id: &experiment_id.to_string(),
                payload: audit_payload.clone(),
            },
        )
        .await?;
        sync_store::append(
            &mut tx,
            SyncAppend {
                owner_user_id,
                actor_user_id: owner_user_id,
                device_id,
                event_type: "conflict.stale_addendum",
                aggregate_type: "experiment",
                aggregate_id: &experiment_id.to_string(),
                payload: audit_payload,
            },
        )
        .await?;

        tx.commit().await.map_err(|e| map_sqlx_error("add_addendum_conflict_commit", e))?;
        sync_store::notify(fanout, owner_user_id);

        return Err(DomainError::stale_addendum(artifact.id));
    }

    let entry_id = EntryId::new();
    let now = chrono::Utc::now();

    sqlx::query(
        r#"
        INSERT INTO experiment_entries (id, experiment_id, author_user_id, entry_type, supersedes_entry_id, body, created_at)
        VALUES ($1, $2, $3, 'addendum', $4, $5, $6)
        "#,
    )
    .bind(entry_id.as_uuid())
    .bind(experiment_id.as_uuid())
    .bind(owner_user_id.as_uuid())
    .bind(effective_id.as_uuid())
    .bind(trimmed_body)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(|e| map_sqlx_error("add_addendum_insert", e))?;

    let payload = json!({
        "entryId": entry_id.to_string(),
        "supersedesEntryId": effective_id.to_string(),
    });

    audit_store::append(
        &mut tx,
        AuditAppend {
            actor_user_id: owner_user_id,
            event_type: "entry.addendum_added",
            aggregate_type: "experiment",
            aggregate_id: &experiment_id.to_string(),
            payload: payload.clone(),
        },
    )
    .await?;
    sync_store::append(
        &mut tx,
        SyncAppend {
            owner_user_id,
            actor_user_id: owner_user_id,
            device_id,
            event_type: "entry.addendum_added",
            aggregate_type: "experiment",
            aggregate_id: &experiment_id.to_string(),
            payload,
        },
    )
    .await?;

    tx.commit().await.map_err(|e| map_sqlx_error("add_addendum_commit", e))?;
    sync_store::notify(fanout, owner_user_id);

    Ok(AddedAddendum {
        entry_id,
        supersedes_entry_id: effective_id,
        created_at: now,
    })
}

pub async fn mark_completed(
    pool: &PgPool,
    fanout: &OwnerFanout<SyncNotification>,
    experiment_id: ExperimentId,
    owner_user_id: UserId,
    device_id: &DeviceId,
) -> DomainResult<()> {
    let mut tx = pool.begin().await.map_err(|e| map_sqlx_error("mark_completed_begin", e))?;

    let exp_row = sqlx::query("SELECT status FROM experiments WHERE id = $1 FOR UPDATE")
        .bind(experiment_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("mark_completed_lock", e))?
        .ok_or_else(DomainError::not_found)?;

    let status: String = exp_row.try_get("status").map_err(|e| map_sqlx_error("mark_completed_status", e))?;
    if status != "draft" {
        return Err(DomainError::forbidden("experiment is already completed"));
    }

    let now = chrono::Utc::now();
    sqlx::query("UPDATE experiments SET status = 'completed', updated_at = $1 WHERE id = $2")
        .bind(now)
        .bind(experiment_id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("mark_completed_update", e))?;

    let payload = json!({ "experimentId": experiment_id.to_string() });
    audit_store::append(
        &mut tx,
        AuditAppend {
            actor_user_id: owner_user_id,
            event_type: "experiment.completed",
            aggregate_type: "experiment",
            aggregate_id: &experiment_id.to_string(),
            payload: payload.clone(),
        },
    )
    .await?;
    sync_store::append(
        &mut tx,
        SyncAppend {
            owner_user_id,
            actor_user_id: owner_user_id,
            device_id,
            event_type: "experiment.completed",
            aggregate_type: "experiment",
            aggregate_id: &experiment_id.to_string(),
            payload,
        },
    )
    .await?;

    tx.commit().await.map_err(|e| map_sqlx_error("mark_completed_commit", e))?;
    sync_store::notify(fanout, owner_user_id);
    Ok(())
}

pub async fn get_experiment(pool: &PgPool, experiment_id: ExperimentId) -> DomainResult<Experiment> {
    let row = sqlx::query("SELECT id, owner_user_id, title, status, created_at, updated_at FROM experiments WHERE id = $1")
        .bind(experiment_id.as_uuid())
        .fetch_optional(pool)
        .await
        .map_err(|e| map_sqlx_error("get_experiment", e))?
        .ok_or_else(DomainError::not_found)?;
    row_to_experiment(&row)
}

pub async fn get_effective_view(pool: &PgPool, experiment_id: ExperimentId) -> DomainResult<EffectiveView> {
    let experiment = get_experiment(pool, experiment_id).await?;
    let history = get_history(pool, experiment_id).await?;
    let effective = Entry::effective(&history);
    Ok(EffectiveView {
        original_entry_id: history.first().expect("history has at least the original entry").id,
        effective_entry_id: effective.id,
        effective_body: effective.body.clone(),
        experiment,
    })
}

pub async fn get_history(pool: &PgPool, experiment_id: ExperimentId) -> DomainResult<Vec<Entry>> {
    let rows = sqlx::query(
        r#"
        SELECT id, experiment_id, author_user_id, entry_type, supersedes_entry_id, body, created_at
        FROM experiment_entries
        WHERE experiment_id = $1
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(experiment_id.as_uuid())
    .fetch_all(pool)
    .await
    .map_err(|e| map_sqlx_error("get_history", e))?;

    rows.iter().map(row_to_entry).collect()
}

/// Viewer grants for an experiment, resolved for the AuthZ gate's
/// `ReadExperiment` action.
pub async fn list_viewer_grants(pool: &PgPool, experiment_id: ExperimentId) -> DomainResult<Vec<UserId>> {
    let rows = sqlx::query("SELECT user_id FROM experiment_viewer_grants WHERE experiment_id = $1")
        .bind(experiment_id.as_uuid())
        .fetch_all(pool)
        .await
        .map_err(|e| map_sqlx_error("list_viewer_grants", e))?;
    rows.iter()
        .map(|row| {
            let id: uuid::Uuid = row.try_get("user_id").map_err(|e| map_sqlx_error("list_viewer_grants_row", e))?;
            Ok(UserId::from_uuid(id))
        })
        .collect()
}

async fn load_history(tx: &mut sqlx::Transaction<'_, sqlx::Postgres>, experiment_id: ExperimentId) -> DomainResult<Vec<Entry>> {
    let rows = sqlx::query(
        r#"
        SELECT id, experiment_id, author_user_id, entry_type, supersedes_entry_id, body, created_at
        FROM experiment_entries
        WHERE experiment_id = $1
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(experiment_id.as_uuid())
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("load_history", e))?;

    rows.iter().map(row_to_entry).collect()
}

fn row_to_experiment(row: &sqlx::postgres::PgRow) -> DomainResult<Experiment> {
    let id: uuid::Uuid = row.try_get("id").map_err(|e| map_sqlx_error("row_to_experiment", e))?;
    let owner_user_id: uuid::Uuid = row.try_get("owner_user_id").map_err(|e| map_sqlx_error("row_to_experiment", e))?;
    let status: String = row.try_get("status").map_err(|e| map_sqlx_error("row_to_experiment", e))?;
    Ok(Experiment {
        id: ExperimentId::from_uuid(id),
        owner_user_id: UserId::from_uuid(owner_user_id),
        title: row.try_get("title").map_err(|e| map_sqlx_error("row_to_experiment", e))?,
        status: if status == "draft" { ExperimentStatus::Draft } else { ExperimentStatus::Completed },
        created_at: row.try_get("created_at").map_err(|e| map_sqlx_error("row_to_experiment", e))?,
        updated_at: row.try_get("updated_at").map_err(|e| map_sqlx_error("row_to_experiment", e))?,
    })
}

fn row_to_entry(row: &sqlx::postgres::PgRow) -> DomainResult<Entry> {
    let id: uuid::Uuid = row.try_get("id").map_err(|e| map_sqlx_error("row_to_entry", e))?;
    let experiment_id: uuid::Uuid = row.try_get("experiment_id").map_err(|e| map_sqlx_error("row_to_entry", e))?;
    let author_user_id: uuid::Uuid = row.try_get("author_user_id").map_err(|e| map_sqlx_error("row_to_entry", e))?;
    let entry_type: String = row.try_get("entry_type").map_err(|e| map_sqlx_error("row_to_entry", e))?;
    let supersedes: Option<uuid::Uuid> = row.try_get("supersedes_entry_id").map_err(|e| map_sqlx_error("row_to_entry", e))?;
    Ok(Entry {
        id: EntryId::from_uuid(id),
        experiment_id: ExperimentId::from_uuid(experiment_id),
        author_user_id: UserId::from_uuid(author_user_id),
        entry_type: if entry_type == "original" { EntryType::Original } else { EntryType::Addendum },
        supersedes_entry_id: supersedes.map(EntryId::from_uuid),
        body: row.try_get("body").map_err(|e| map_sqlx_error("row_to_entry", e))?,
        created_at: row.try_get("created_at").map_err(|e| map_sqlx_error("row_to_entry", e))?,
    })
}
