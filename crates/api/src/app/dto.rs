//! Request/response bodies for the HTTP surface, and their mapping to/from
//! the domain types `eln-infra`'s stores return. Wire fields are camelCase;
//! domain types stay snake_case internally.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use eln_core::audit::VerificationResult;
use eln_core::experiment::{ConflictArtifact, Experiment, ExperimentStatus};
use eln_core::reconcile::ReconcileCounts;
use eln_core::signature::SignatureVerification;
use eln_core::sync_event::{SyncEvent, SyncPage};

// --- auth ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub device_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
    pub device_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub access_token_expires_at: chrono::DateTime<chrono::Utc>,
}

// --- experiments ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExperimentRequest {
    pub title: String,
    pub original_body: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddAddendumRequest {
    pub base_entry_id: String,
    pub body: String,
}

pub fn experiment_status_str(status: ExperimentStatus) -> &'static str {
    match status {
        ExperimentStatus::Draft => "draft",
        ExperimentStatus::Completed => "completed",
    }
}

pub fn conflict_artifact_json(artifact: &ConflictArtifact) -> Value {
    json!({
        "conflictArtifactId": artifact.id.to_string(),
        "experimentId": artifact.experiment_id.to_string(),
        "clientBaseEntryId": artifact.client_base_entry_id.to_string(),
        "serverLatestEntryId": artifact.server_latest_entry_id.to_string(),
        "payload": artifact.payload,
        "createdAt": artifact.created_at,
    })
}

pub fn experiment_json(experiment: &Experiment) -> Value {
    json!({
        "experimentId": experiment.id.to_string(),
        "ownerUserId": experiment.owner_user_id.to_string(),
        "title": experiment.title,
        "status": experiment_status_str(experiment.status),
        "createdAt": experiment.created_at,
        "updatedAt": experiment.updated_at,
    })
}

// --- sync ---

#[derive(Debug, Deserialize)]
pub struct PullQuery {
    #[serde(default)]
    pub cursor: i64,
    #[serde(default = "default_pull_limit")]
    pub limit: i64,
}

fn default_pull_limit() -> i64 {
    200
}

#[derive(Debug, Deserialize)]
pub struct ConflictsQuery {
    #[serde(default = "default_conflicts_limit")]
    pub limit: i64,
}

fn default_conflicts_limit() -> i64 {
    50
}

pub fn sync_event_json(event: &SyncEvent) -> Value {
    json!({
        "sequence": event.sequence,
        "ownerUserId": event.owner_user_id.to_string(),
        "actorUserId": event.actor_user_id.to_string(),
        "deviceId": event.device_id.as_str(),
        "eventType": event.event_type,
        "aggregateType": event.aggregate_type,
        "aggregateId": event.aggregate_id,
        "payload": event.payload,
        "createdAt": event.created_at,
    })
}

pub fn sync_page_json(page: &SyncPage) -> Value {
    json!({
        "events": page.events.iter().map(sync_event_json).collect::<Vec<_>>(),
        "cursor": page.next_cursor,
    })
}

#[derive(Debug, Deserialize)]
pub struct SyncWsQuery {
    #[serde(default)]
    pub cursor: i64,
    pub access_token: String,
}

// --- attachments ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateAttachmentRequest {
    pub experiment_id: String,
    pub object_key: String,
    pub size_bytes: i64,
    pub mime_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteAttachmentRequest {
    pub checksum: String,
    pub size_bytes: i64,
}

// --- signatures ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignRequest {
    pub experiment_id: String,
    pub password: String,
    pub signature_type: String,
    pub meaning: String,
}

pub fn signature_verification_json(v: &SignatureVerification) -> Value {
    json!({
        "signatureId": v.signature_id.to_string(),
        "valid": v.valid,
        "computedHash": hex::encode(v.computed_hash),
        "storedHash": hex::encode(v.stored_hash),
    })
}

// --- ops ---

pub fn verification_result_json(r: &VerificationResult) -> Value {
    json!({
        "valid": r.valid,
        "checkedEvents": r.checked_events,
        "brokenAtSequence": r.broken_at_sequence,
        "message": r.message,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileRequest {
    #[serde(default)]
    pub stale_after_seconds: Option<i64>,
    #[serde(default)]
    pub scan_limit: Option<i64>,
}

pub fn reconcile_counts_json(counts: &ReconcileCounts) -> Value {
    json!({
        "staleInitiatedCount": counts.stale_initiated,
        "missingChecksumCount": counts.missing_checksum,
        "integrityMismatchCount": counts.integrity_mismatch,
        "orphanObjectCount": counts.orphan_object,
    })
}
