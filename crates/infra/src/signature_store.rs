//! Signature Service storage: password-reauthenticated e-signatures bound to
//! a content hash of the experiment's current history, plus re-verification.

use serde_json::json;
use sqlx::{PgPool, Row};

use eln_auth::password::PasswordHasher;
use eln_core::id::{DeviceId, ExperimentId, SignatureId, UserId};
use eln_core::signature::{compute_content_hash, SignatureVerification};
use eln_core::{DomainError, DomainResult};
use eln_events::{OwnerFanout, SyncNotification};

use crate::audit_store::{self, AuditAppend};
use crate::error::map_sqlx_error;
use crate::experiment_store;
use crate::sync_store::{self, SyncAppend};

pub struct SignResult {
    pub signature_id: SignatureId,
    pub content_hash: [u8; 32],
    pub signed_at: chrono::DateTime<chrono::Utc>,
}

pub async fn sign(
    pool: &PgPool,
    fanout: &OwnerFanout<SyncNotification>,
    hasher: &PasswordHasher,
    experiment_id: ExperimentId,
    signer_user_id: UserId,
    device_id: &DeviceId,
    password: &str,
    signature_type: &str,
    meaning: &str,
) -> DomainResult<SignResult> {
    let stored_hash: String = sqlx::query("SELECT password_hash FROM users WHERE id = $1")
        .bind(signer_user_id.as_uuid())
        .fetch_optional(pool)
        .await
        .map_err(|e| map_sqlx_error("signature_sign_user_lookup", e))?
        .ok_or_else(DomainError::not_found)?
        .try_get("password_hash")
        .map_err(|e| map_sqlx_error("signature_sign_user_row", e))?;

    let matches = hasher
        .verify(password, &stored_hash)
        .map_err(|_| DomainError::internal("stored password hash is malformed"))?;
    if !matches {
        return Err(DomainError::InvalidPassword);
    }

    let experiment = experiment_store::get_experiment(pool, experiment_id).await?;
    let history = experiment_store::get_history(pool, experiment_id).await?;
    let content_hash = compute_content_hash(&experiment, &history);

    let mut tx = pool.begin().await.map_err(|e| map_sqlx_error("signature_sign_begin", e))?;

    let signature_id = SignatureId::new();
    let signed_at = chrono::Utc::now();

    sqlx::query(
        r#"
        INSERT INTO signatures (id, experiment_id, signer_user_id, signature_type, meaning, content_hash, signed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(signature_id.as_uuid())
    .bind(experiment_id.as_uuid())
    .bind(signer_user_id.as_uuid())
    .bind(signature_type)
    .bind(meaning)
    .bind(&content_hash[..])
    .bind(signed_at)
    .execute(&mut *tx)
    .await
    .map_err(|e| map_sqlx_error("signature_sign_insert", e))?;

    let payload = json!({
        "signatureId": signature_id.to_string(),
        "signatureType": signature_type,
        "meaning": meaning,
        "contentHash": hex::encode(content_hash),
    });

    audit_store::append(
        &mut tx,
        AuditAppend {
            actor_user_id: signer_user_id,
            event_type: "signature.created",
            aggregate_type: "experiment",
            aggregate_id: &experiment_id.to_string(),
            payload: payload.clone(),
        },
    )
    .await?;
    sync_store::append(
        &mut tx,
        SyncAppend {
            owner_user_id: experiment.owner_user_id,
            actor_user_id: signer_user_id,
            device_id,
            event_type: "signature.created",
            aggregate_type: "experiment",
            aggregate_id: &experiment_id.to_string(),
            payload,
        },
    )
    .await?;

    tx.commit().await.map_err(|e| map_sqlx_error("signature_sign_commit", e))?;
    sync_store::notify(fanout, experiment.owner_user_id);

    Ok(SignResult { signature_id, content_hash, signed_at })
}

/// `VerifySignatures`: recompute the experiment's current content hash and
/// compare it against every signature ever taken over this experiment. A
/// mismatch means the history has diverged from what was signed — append-only
/// entries should make this unreachable, so a mismatch here points at
/// storage tampering the audit chain would also expose.
pub async fn verify_signatures(pool: &PgPool, experiment_id: ExperimentId) -> DomainResult<Vec<SignatureVerification>> {
    let experiment = experiment_store::get_experiment(pool, experiment_id).await?;
    let history = experiment_store::get_history(pool, experiment_id).await?;
    let computed_hash = compute_content_hash(&experiment, &history);

    let rows = sqlx::query("SELECT id, content_hash FROM signatures WHERE experiment_id = $1 ORDER BY signed_at ASC")
        .bind(experiment_id.as_uuid())
        .fetch_all(pool)
        .await
        .map_err(|e| map_sqlx_error("signature_verify_scan", e))?;

    let mut results = Vec::with_capacity(rows.len());
    for row in rows {
        let id: uuid::Uuid = row.try_get("id").map_err(|e| map_sqlx_error("signature_verify_row", e))?;
        let stored_bytes: Vec<u8> = row.try_get("content_hash").map_err(|e| map_sqlx_error("signature_verify_row", e))?;
        let mut stored_hash = [0u8; 32];
        stored_hash.copy_from_slice(&stored_bytes);

        results.push(SignatureVerification {
            signature_id: SignatureId::from_uuid(id),
            valid: stored_hash == computed_hash,
            computed_hash,
            stored_hash,
        });
    }

    Ok(results)
}
