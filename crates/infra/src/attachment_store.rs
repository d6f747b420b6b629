//! Attachment Broker storage: initiate/complete/download plus the
//! reconciliation sweep that reconstructs the attachment state machine
//! against the object store.

use serde_json::json;
use sqlx::{PgPool, Row};

use eln_core::attachment::{Attachment, AttachmentStatus};
use eln_core::id::{AttachmentId, DeviceId, ExperimentId, UserId};
use eln_core::reconcile::{ReconcileCounts, ReconcileFindingKind};
use eln_core::{DomainError, DomainResult};
use eln_events::{OwnerFanout, SyncNotification};

use crate::audit_store::{self, AuditAppend};
use crate::error::map_sqlx_error;
use crate::sync_store::{self, SyncAppend};
use crate::url_signer::{HttpMethod, UrlSigner};

pub struct InitiatedAttachment {
    pub attachment_id: AttachmentId,
    pub upload_url: String,
    pub upload_url_expires_at: chrono::DateTime<chrono::Utc>,
}

pub struct CompletedAttachment {
    pub attachment_id: AttachmentId,
    pub status: AttachmentStatus,
}

pub struct DownloadGrant {
    pub download_url: String,
    pub download_url_expires_at: chrono::DateTime<chrono::Utc>,
}

pub async fn initiate(
    pool: &PgPool,
    fanout: &OwnerFanout<SyncNotification>,
    signer: &UrlSigner,
    upload_ttl: chrono::Duration,
    experiment_id: ExperimentId,
    owner_user_id: UserId,
    device_id: &DeviceId,
    object_key: &str,
    size_bytes: i64,
    mime_type: &str,
    max_size_bytes: i64,
) -> DomainResult<InitiatedAttachment> {
    if size_bytes <= 0 || size_bytes > max_size_bytes {
        return Err(DomainError::invalid_input("sizeBytes exceeds configured maximum"));
    }

    let mut tx = pool.begin().await.map_err(|e| map_sqlx_error("attachment_initiate_begin", e))?;

    let attachment_id = AttachmentId::new();
    let now = chrono::Utc::now();

    sqlx::query(
        r#"
        INSERT INTO attachments (id, experiment_id, object_key, size_bytes, mime_type, status, checksum, created_at, completed_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, 'initiated', NULL, $6, NULL, $6)
        "#,
    )
    .bind(attachment_id.as_uuid())
    .bind(experiment_id.as_uuid())
    .bind(object_key)
    .bind(size_bytes)
    .bind(mime_type)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(|e| map_sqlx_error("attachment_initiate_insert", e))?;

    let payload = json!({
        "attachmentId": attachment_id.to_string(),
        "objectKey": object_key,
        "sizeBytes": size_bytes,
        "mimeType": mime_type,
    });

    audit_store::append(
        &mut tx,
        AuditAppend {
            actor_user_id: owner_user_id,
            event_type: "attachment.initiated",
            aggregate_type: "attachment",
            aggregate_id: &attachment_id.to_string(),
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
            event_type: "attachment.initiated",
            aggregate_type: "attachment",
            aggregate_id: &attachment_id.to_string(),
            payload,
        },
    )
    .await?;

    tx.commit().await.map_err(|e| map_sqlx_error("attachment_initiate_commit", e))?;
    sync_store::notify(fanout, owner_user_id);

    let signed = signer.sign(HttpMethod::Put, object_key, upload_ttl);
    Ok(InitiatedAttachment {
        attachment_id,
        upload_url: signed.url,
        upload_url_expires_at: signed.expires_at,
    })
}

pub async fn complete(
    pool: &PgPool,
    fanout: &OwnerFanout<SyncNotification>,
    attachment_id: AttachmentId,
    owner_user_id: UserId,
    device_id: &DeviceId,
    checksum: &str,
    size_bytes: i64,
) -> DomainResult<CompletedAttachment> {
    let checksum = Attachment::validate_checksum(checksum)?;

    let mut tx = pool.begin().await.map_err(|e| map_sqlx_error("attachment_complete_begin", e))?;

    let row = sqlx::query("SELECT experiment_id, status, size_bytes FROM attachments WHERE id = $1 FOR UPDATE")
        .bind(attachment_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("attachment_complete_lock", e))?
        .ok_or_else(DomainError::not_found)?;

    let status: String = row.try_get("status").map_err(|e| map_sqlx_error("attachment_complete_row", e))?;
    let recorded_size: i64 = row.try_get("size_bytes").map_err(|e| map_sqlx_error("attachment_complete_row", e))?;

    if status != "initiated" {
        return Err(DomainError::forbidden("attachment is not in initiated state"));
    }
    if recorded_size != size_bytes {
        return Err(DomainError::invalid_input("sizeBytes does not match the value recorded at Initiate"));
    }

    let now = chrono::Utc::now();
    sqlx::query("UPDATE attachments SET status = 'completed', checksum = $1, completed_at = $2, updated_at = $2 WHERE id = $3")
        .bind(&checksum)
        .bind(now)
        .bind(attachment_id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("attachment_complete_update", e))?;

    let payload = json!({ "attachmentId": attachment_id.to_string(), "checksum": checksum });
    audit_store::append(
        &mut tx,
        AuditAppend {
            actor_user_id: owner_user_id,
            event_type: "attachment.completed",
            aggregate_type: "attachment",
            aggregate_id: &attachment_id.to_string(),
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
            event_type: "attachment.completed",
            aggregate_type: "attachment",
            aggregate_id: &attachment_id.to_string(),
            payload,
        },
    )
    .await?;

    tx.commit().await.map_err(|e| map_sqlx_error("attachment_complete_commit", e))?;
    sync_store::notify(fanout, owner_user_id);

    Ok(CompletedAttachment { attachment_id, status: AttachmentStatus::Completed })
}

pub async fn download(
    pool: &PgPool,
    signer: &UrlSigner,
    download_ttl: chrono::Duration,
    attachment_id: AttachmentId,
) -> DomainResult<DownloadGrant> {
    let attachment = get(pool, attachment_id).await?;
    if attachment.status != AttachmentStatus::Completed {
        return Err(DomainError::not_found());
    }
    let signed = signer.sign(HttpMethod::Get, &attachment.object_key, download_ttl);
    Ok(DownloadGrant { download_url: signed.url, download_url_expires_at: signed.expires_at })
}

pub async fn get(pool: &PgPool, attachment_id: AttachmentId) -> DomainResult<Attachment> {
    let row = sqlx::query(
        r#"
        SELECT id, experiment_id, object_key, size_bytes, mime_type, status, checksum, created_at, completed_at, updated_at
        FROM attachments WHERE id = $1
        "#,
    )
    .bind(attachment_id.as_uuid())
    .fetch_optional(pool)
    .await
    .map_err(|e| map_sqlx_error("attachment_get", e))?
    .ok_or_else(DomainError::not_found)?;
    row_to_attachment(&row)
}

fn row_to_attachment(row: &sqlx::postgres::PgRow) -> DomainResult<Attachment> {
    let id: uuid::Uuid = row.try_get("id").map_err(|e| map_sqlx_error("row_to_attachment", e))?;
    let experiment_id: uuid::Uuid = row.try_get("experiment_id").map_err(|e| map_sqlx_error("row_to_attachment", e))?;
    let status: String = row.try_get("status").map_err(|e| map_sqlx_error("row_to_attachment", e))?;
    Ok(Attachment {
        id: AttachmentId::from_uuid(id),
        experiment_id: ExperimentId::from_uuid(experiment_id),
        object_key: row.try_get("object_key").map_err(|e| map_sqlx_error("row_to_attachment", e))?,
        size_bytes: row.try_get("size_bytes").map_err(|e| map_sqlx_error("row_to_attachment", e))?,
        mime_type: row.try_get("mime_type").map_err(|e| map_sqlx_error("row_to_attachment", e))?,
        status: parse_status(&status),
        checksum: row.try_get("checksum").map_err(|e| map_sqlx_error("row_to_attachment", e))?,
        created_at: row.try_get("created_at").map_err(|e| map_sqlx_error("row_to_attachment", e))?,
        completed_at: row.try_get("completed_at").map_err(|e| map_sqlx_error("row_to_attachment", e))?,
        updated_at: row.try_get("updated_at").map_err(|e| map_sqlx_error("row_to_attachment", e))?,
    })
}

fn parse_status(s: &str) -> AttachmentStatus {
    match s {
        "initiated" => AttachmentStatus::Initiated,
        "completed" => AttachmentStatus::Completed,
        "missing" => AttachmentStatus::Missing,
        _ => AttachmentStatus::Orphan,
    }
}

/// Lister interface the reconciler needs from the object store: HEAD a key
/// (returns the object's size if present) and list keys under a prefix,
/// bounded. A real deployment backs this with an S3-compatible client; tests
/// use an in-memory fake.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    async fn head(&self, object_key: &str) -> Option<i64>;
    async fn list_keys(&self, limit: i64) -> Vec<String>;
}

pub struct ReconcileParams<'a> {
    pub run_id: &'a str,
    pub stale_after: chrono::Duration,
    pub scan_limit: i64,
    pub sample_size: i64,
    pub orphan_scan_limit: i64,
}

/// `Reconcile`: the four-step sweep described in the broker's contract.
/// Every state transition and finding goes through the same audit/sync
/// append path as the request-driven operations, keyed to a system actor.
pub async fn reconcile(
    pool: &PgPool,
    fanout: &OwnerFanout<SyncNotification>,
    store: &dyn ObjectStore,
    system_actor: UserId,
    system_device: &DeviceId,
    params: ReconcileParams<'_>,
) -> DomainResult<ReconcileCounts> {
    let mut counts = ReconcileCounts::default();

    counts.stale_initiated = mark_stale_initiated(pool, fanout, system_actor, system_device, params.stale_after, params.scan_limit).await?;
    counts.missing_checksum = record_missing_checksum_findings(pool, params.run_id, params.scan_limit).await?;

    let (integrity_mismatch, missing_on_sample) =
        sample_and_check_completed(pool, fanout, store, system_actor, system_device, params.run_id, params.sample_size).await?;
    counts.integrity_mismatch = integrity_mismatch;
    counts.stale_initiated += missing_on_sample;

    counts.orphan_object = record_orphan_findings(pool, store, params.run_id, params.orphan_scan_limit).await?;

    Ok(counts)
}

async fn mark_stale_initiated(
    pool: &PgPool,
    fanout: &OwnerFanout<SyncNotification>,
    system_actor: UserId,
    system_device: &DeviceId,
    stale_after: chrono::Duration,
    scan_limit: i64,
) -> DomainResult<u64> {
    let cutoff = chrono::Utc::now() - stale_after;
    let rows = sqlx::query(
        r#"
        SELECT a.id, e.owner_user_id
        FROM attachments a
        JOIN experiments e ON e.id = a.experiment_id
        WHERE a.status = 'initiated' AND a.created_at < $1
        ORDER BY a.created_at ASC
        LIMIT $2
        "#,
    )
    .bind(cutoff)
    .bind(scan_limit)
    .fetch_all(pool)
    .await
    .map_err(|e| map_sqlx_error("reconcile_scan_stale", e))?;

    let mut transitioned = 0u64;
    for row in rows {
        let attachment_id: uuid::Uuid = row.try_get("id").map_err(|e| map_sqlx_error("reconcile_scan_stale_row", e))?;
        let owner: uuid::Uuid = row.try_get("owner_user_id").map_err(|e| map_sqlx_error("reconcile_scan_stale_row", e))?;
        let attachment_id = AttachmentId::from_uuid(attachment_id);
        let owner_user_id = UserId::from_uuid(owner);

        transition_to_missing(pool, fanout, system_actor, system_device, attachment_id, owner_user_id).await?;
        transitioned += 1;
    }
    Ok(transitioned)
}

async fn transition_to_missing(
    pool: &PgPool,
    fanout: &OwnerFanout<SyncNotification>,
    system_actor: UserId,
    system_device: &DeviceId,
    attachment_id: AttachmentId,
    owner_user_id: UserId,
) -> DomainResult<()> {
    let mut tx = pool.begin().await.map_err(|e| map_sqlx_error("reconcile_missing_begin", e))?;

    let now = chrono::Utc::now();
    sqlx::query("UPDATE attachments SET status = 'missing', updated_at = $1 WHERE id = $2")
        .bind(now)
        .bind(attachment_id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("reconcile_missing_update", e))?;

    let payload = json!({ "attachmentId": attachment_id.to_string() });
    audit_store::append(
        &mut tx,
        AuditAppend {
            actor_user_id: system_actor,
            event_type: "attachment.missing",
            aggregate_type: "attachment",
            aggregate_id: &attachment_id.to_string(),
            payload: payload.clone(),
        },
    )
    .await?;
    sync_store::append(
        &mut tx,
        SyncAppend {
            owner_user_id,
            actor_user_id: system_actor,
            device_id: system_device,
            event_type: "attachment.missing",
            aggregate_type: "attachment",
            aggregate_id: &attachment_id.to_string(),
            payload,
        },
    )
    .await?;

    tx.commit().await.map_err(|e| map_sqlx_error("reconcile_missing_commit", e))?;
    sync_store::notify(fanout, owner_user_id);
    Ok(())
}

async fn record_missing_checksum_findings(pool: &PgPool, run_id: &str, scan_limit: i64) -> DomainResult<u64> {
    let rows = sqlx::query(
        "SELECT id FROM attachments WHERE status = 'completed' AND checksum IS NULL LIMIT $1",
    )
    .bind(scan_limit)
    .fetch_all(pool)
    .await
    .map_err(|e| map_sqlx_error("reconcile_missing_checksum_scan", e))?;

    let mut recorded = 0u64;
    for row in rows {
        let id: uuid::Uuid = row.try_get("id").map_err(|e| map_sqlx_error("reconcile_missing_checksum_row", e))?;
        if insert_finding(pool, run_id, &id.to_string(), ReconcileFindingKind::MissingChecksum, json!({})).await? {
            recorded += 1;
        }
    }
    Ok(recorded)
}

async fn sample_and_check_completed(
    pool: &PgPool,
    fanout: &OwnerFanout<SyncNotification>,
    store: &dyn ObjectStore,
    system_actor: UserId,
    system_device: &DeviceId,
    run_id: &str,
    sample_size: i64,
) -> DomainResult<(u64, u64)> {
    let rows = sqlx::query(
        r#"
        SELECT a.id, a.object_key, a.size_bytes, e.owner_user_id
        FROM attachments a
        JOIN experiments e ON e.id = a.experiment_id
        WHERE a.status = 'completed'
        ORDER BY a.updated_at ASC
        LIMIT $1
        "#,
    )
    .bind(sample_size)
    .fetch_all(pool)
    .await
    .map_err(|e| map_sqlx_error("reconcile_sample_scan", e))?;

    let mut integrity_mismatch = 0u64;
    let mut missing = 0u64;

    for row in rows {
        let attachment_id: uuid::Uuid = row.try_get("id").map_err(|e| map_sqlx_error("reconcile_sample_row", e))?;
        let object_key: String = row.try_get("object_key").map_err(|e| map_sqlx_error("reconcile_sample_row", e))?;
        let recorded_size: i64 = row.try_get("size_bytes").map_err(|e| map_sqlx_error("reconcile_sample_row", e))?;
        let owner: uuid::Uuid = row.try_get("owner_user_id").map_err(|e| map_sqlx_error("reconcile_sample_row", e))?;

        let attachment_id = AttachmentId::from_uuid(attachment_id);
        let owner_user_id = UserId::from_uuid(owner);

        match store.head(&object_key).await {
            None => {
                transition_to_missing(pool, fanout, system_actor, system_device, attachment_id, owner_user_id).await?;
                missing += 1;
            }
            Some(actual_size) if actual_size != recorded_size => {
                let detail = json!({ "recordedSizeBytes": recorded_size, "actualSizeBytes": actual_size });
                if insert_finding(pool, run_id, &attachment_id.to_string(), ReconcileFindingKind::IntegrityMismatch, detail).await? {
                    integrity_mismatch += 1;
                }
            }
            Some(_) => {}
        }
    }

    Ok((integrity_mismatch, missing))
}

async fn record_orphan_findings(pool: &PgPool, store: &dyn ObjectStore, run_id: &str, limit: i64) -> DomainResult<u64> {
    let keys = store.list_keys(limit).await;
    let mut recorded = 0u64;
    for key in keys {
        let known = sqlx::query("SELECT 1 FROM attachments WHERE object_key = $1")
            .bind(&key)
            .fetch_optional(pool)
            .await
            .map_err(|e| map_sqlx_error("reconcile_orphan_lookup", e))?
            .is_some();
        if !known && insert_finding(pool, run_id, &key, ReconcileFindingKind::OrphanObject, json!({})).await? {
            recorded += 1;
        }
    }
    Ok(recorded)
}

/// Insert a finding unless `(kind, object_key_or_attachment_id)` is already
/// open from a prior run. Returns whether a new row was inserted.
async fn insert_finding(
    pool: &PgPool,
    run_id: &str,
    subject: &str,
    kind: ReconcileFindingKind,
    detail: serde_json::Value,
) -> DomainResult<bool> {
    let kind_str = match kind {
        ReconcileFindingKind::StaleInitiated => "stale_initiated",
        ReconcileFindingKind::MissingChecksum => "missing_checksum",
        ReconcileFindingKind::IntegrityMismatch => "integrity_mismatch",
        ReconcileFindingKind::OrphanObject => "orphan_object",
    };

    let result = sqlx::query(
        r#"
        INSERT INTO reconcile_findings (id, run_id, object_key_or_attachment_id, kind, detail, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (kind, object_key_or_attachment_id) DO NOTHING
        "#,
    )
    .bind(eln_core::id::ReconcileFindingId::new().as_uuid())
    .bind(run_id)
    .bind(subject)
    .bind(kind_str)
    .bind(detail)
    .bind(chrono::Utc::now())
    .execute(pool)
    .await
    .map_err(|e| map_sqlx_error("reconcile_insert_finding", e))?;

    Ok(result.rows_affected() > 0)
}

/// `ObjectStore` backed by a real HTTP object store: HEAD goes through the
/// same signed-URL path a client would use to download, so the reconciler
/// never needs out-of-band object-store credentials. Listing uses a
/// dedicated, separately authenticated admin endpoint, since object stores
/// generally do not let an unprivileged signed GET enumerate a bucket.
pub struct HttpObjectStore {
    client: reqwest::Client,
    signer: UrlSigner,
    list_endpoint: String,
    list_bearer_token: String,
}

impl HttpObjectStore {
    pub fn new(client: reqwest::Client, signer: UrlSigner, list_endpoint: impl Into<String>, list_bearer_token: impl Into<String>) -> Self {
        Self { client, signer, list_endpoint: list_endpoint.into(), list_bearer_token: list_bearer_token.into() }
    }
}

#[async_trait::async_trait]
impl ObjectStore for HttpObjectStore {
    async fn head(&self, object_key: &str) -> Option<i64> {
        let signed = self.signer.sign(HttpMethod::Get, object_key, chrono::Duration::seconds(60));
        let response = self.client.head(&signed.url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
    }

    async fn list_keys(&self, limit: i64) -> Vec<String> {
        let response = self
            .client
            .get(&self.list_endpoint)
            .bearer_auth(&self.list_bearer_token)
            .query(&[("limit", limit.to_string())])
            .send()
            .await;

        match response {
            Ok(r) if r.status().is_success() => r.json::<Vec<String>>().await.unwrap_or_default(),
            _ => Vec::new(),
        }
    }
}
