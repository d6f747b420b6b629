//! Wire DTOs mirroring the server's JSON responses.
//!
//! These are deliberately separate from `eln-core`'s domain types: the wire
//! format is camelCase and only carries what a client needs to render or
//! replay, while the domain types carry server-side invariants the client
//! has no business depending on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDto {
    pub access_token: String,
    pub refresh_token: String,
    pub access_token_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentCreatedDto {
    pub experiment_id: String,
    pub original_entry_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddendumCreatedDto {
    pub entry_id: String,
    pub supersedes_entry_id: String,
    pub created_at: DateTime<Utc>,
}

/// Body of a 409 response to a stale addendum: the artifact the server
/// recorded, so the client can present it and let the user reapply intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictDto {
    pub conflict_artifact_id: String,
    pub experiment_id: String,
    pub client_base_entry_id: String,
    pub server_latest_entry_id: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryDto {
    pub id: String,
    pub experiment_id: String,
    pub author_user_id: String,
    pub entry_type: String,
    pub supersedes_entry_id: Option<String>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryDto {
    pub entries: Vec<EntryDto>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveViewDto {
    pub experiment: Value,
    pub original_entry_id: String,
    pub effective_entry_id: String,
    pub effective_body: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEventDto {
    pub sequence: i64,
    pub owner_user_id: String,
    pub actor_user_id: String,
    pub device_id: String,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncPageDto {
    pub events: Vec<SyncEventDto>,
    pub cursor: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConflictsPageDto {
    pub conflicts: Vec<ConflictDto>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentInitiatedDto {
    pub attachment_id: String,
    pub upload_url: String,
    pub upload_url_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadDto {
    pub download_url: String,
    pub download_url_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusDto {
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureCreatedDto {
    pub signature_id: String,
    pub content_hash: String,
    pub signed_at: DateTime<Utc>,
}

/// The `{"type":"events"}` notification a WS subscriber receives whenever
/// its owner's sync log gains new events. Carries no payload; it is only a
/// prompt to Pull again from the last persisted cursor.
#[derive(Debug, Clone, Deserialize)]
pub struct WsNotification {
    #[serde(rename = "type")]
    pub kind: String,
}
