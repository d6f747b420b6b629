//! Queued writes: the unit the outbox stores and the puller/HTTP layer
//! replay against the server when connectivity returns.

use chrono::{DateTime, Utc};
use eln_core::id::{AttachmentId, EntryId, ExperimentId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a queued operation, mirroring the server's own append-only
/// posture: once `Synced`, an operation is never replayed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    Pending,
    Syncing,
    Synced,
    Failed,
}

/// A write the client attempted while offline (or chose to queue instead
/// of sending inline). Each variant maps to exactly one write endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operationType", rename_all = "camelCase")]
pub enum OutboxOperation {
    CreateExperiment {
        title: String,
        original_body: String,
    },
    AddAddendum {
        experiment_id: ExperimentId,
        base_entry_id: EntryId,
        body: String,
    },
    CompleteExperiment {
        experiment_id: ExperimentId,
    },
    InitiateAttachment {
        experiment_id: ExperimentId,
        object_key: String,
        size_bytes: i64,
        mime_type: String,
    },
    CompleteAttachment {
        attachment_id: AttachmentId,
        checksum: String,
        size_bytes: i64,
    },
    Sign {
        experiment_id: ExperimentId,
        password: String,
        signature_type: String,
        meaning: String,
    },
}

/// An `OutboxOperation` plus the bookkeeping the queue needs to replay it
/// in order and report what happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedOperation {
    pub id: Uuid,
    pub operation: OutboxOperation,
    pub status: OutboxStatus,
    pub created_at: DateTime<Utc>,
    pub synced_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl QueuedOperation {
    pub fn new(operation: OutboxOperation, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            operation,
            status: OutboxStatus::Pending,
            created_at: now,
            synced_at: None,
            attempts: 0,
            last_error: None,
        }
    }
}
