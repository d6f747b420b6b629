//! The replay queue: pending writes survive a restart of the embedding
//! client and are drained in FIFO order once the puller confirms
//! connectivity.
//!
//! `Outbox` is a trait rather than a concrete store because this crate has
//! no opinion on where a native or web client persists its queue — only on
//! the state machine a queued write moves through. [`InMemoryOutbox`] is a
//! reference implementation and the one used in this crate's own tests.

use std::future::Future;

use chrono::Utc;
use uuid::Uuid;

use crate::types::{OutboxOperation, OutboxStatus, QueuedOperation};

#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error("no queued operation with id {0}")]
    NotFound(Uuid),
}

/// Durable store of queued operations. Implementations are expected to be
/// cheaply cloneable handles (e.g. an `Arc` around internal storage).
pub trait Outbox: Send + Sync {
    /// Queue a new operation in `Pending` state and return its id.
    fn enqueue(&self, operation: OutboxOperation) -> impl Future<Output = Uuid> + Send;

    /// All `Pending` operations, oldest first.
    fn list_pending(&self) -> impl Future<Output = Vec<QueuedOperation>> + Send;

    /// Mark an operation as in flight so a concurrent drain does not resend it.
    fn mark_syncing(&self, id: Uuid) -> impl Future<Output = ()> + Send;

    /// Mark an operation as durably accepted by the server.
    fn mark_synced(&self, id: Uuid) -> impl Future<Output = ()> + Send;

    /// Mark an operation as failed (network error, rejected by the server,
    /// or a stale-base conflict the caller chose not to retry automatically).
    fn mark_failed(&self, id: Uuid, error: String) -> impl Future<Output = ()> + Send;

    /// Move a `Failed` operation back to `Pending` so it is retried on the
    /// next drain.
    fn retry_failed(&self, id: Uuid) -> impl Future<Output = Result<(), OutboxError>> + Send;

    /// Drop `Synced` operations older than `older_than_days`, freeing space
    /// without touching anything still in flight.
    fn clear_synced(&self, older_than_days: i64) -> impl Future<Output = ()> + Send;
}

/// In-memory `Outbox`. Suitable as a default for short-lived processes and
/// for tests; an embedding native or web client should back this trait with
/// its own durable storage to survive a restart while offline.
#[derive(Debug, Default, Clone)]
pub struct InMemoryOutbox {
    operations: std::sync::Arc<tokio::sync::Mutex<Vec<QueuedOperation>>>,
}

impl InMemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Outbox for InMemoryOutbox {
    async fn enqueue(&self, operation: OutboxOperation) -> Uuid {
        let queued = QueuedOperation::new(operation, Utc::now());
        let id = queued.id;
        self.operations.lock().await.push(queued);
        id
    }

    async fn list_pending(&self) -> Vec<QueuedOperation> {
        let guard = self.operations.lock().await;
        let mut pending: Vec<QueuedOperation> = guard
            .iter()
            .filter(|op| op.status == OutboxStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|op| op.created_at);
        pending
    }

    async fn mark_syncing(&self, id: Uuid) {
        self.set_status(id, OutboxStatus::Syncing, None).await;
    }

    async fn mark_synced(&self, id: Uuid) {
        let mut guard = self.operations.lock().await;
        if let Some(op) = guard.iter_mut().find(|op| op.id == id) {
            op.status = OutboxStatus::Synced;
            op.synced_at = Some(Utc::now());
            op.last_error = None;
        }
    }

    async fn mark_failed(&self, id: Uuid, error: String) {
        let mut guard = self.operations.lock().await;
        if let Some(op) = guard.iter_mut().find(|op| op.id == id) {
            op.status = OutboxStatus::Failed;
            op.attempts += 1;
            op.last_error = Some(error);
        }
    }

    async fn retry_failed(&self, id: Uuid) -> Result<(), OutboxError> {
        let mut guard = self.operations.lock().await;
        let op = guard
            .iter_mut()
            .find(|op| op.id == id && op.status == OutboxStatus::Failed)
            .ok_or(OutboxError::NotFound(id))?;
        op.status = OutboxStatus::Pending;
        Ok(())
    }

    async fn clear_synced(&self, older_than_days: i64) {
        let cutoff = Utc::now() - chrono::Duration::days(older_than_days);
        let mut guard = self.operations.lock().await;
        guard.retain(|op| {
            !(op.status == OutboxStatus::Synced && op.synced_at.map(|t| t < cutoff).unwrap_or(false))
        });
    }
}

impl InMemoryOutbox {
    async fn set_status(&self, id: Uuid, status: OutboxStatus, error: Option<String>) {
        let mut guard = self.operations.lock().await;
        if let Some(op) = guard.iter_mut().find(|op| op.id == id) {
            op.status = status;
            if error.is_some() {
                op.last_error = error;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eln_core::id::ExperimentId;

    fn sample_op() -> OutboxOperation {
        OutboxOperation::CreateExperiment {
            title: "Titration run".to_string(),
            original_body: "setup notes".to_string(),
        }
    }

    #[tokio::test]
    async fn enqueued_operation_is_pending_and_listed() {
        let outbox = InMemoryOutbox::new();
        let id = outbox.enqueue(sample_op()).await;

        let pending = outbox.list_pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert_eq!(pending[0].status, OutboxStatus::Pending);
    }

    #[tokio::test]
    async fn list_pending_preserves_fifo_order() {
        let outbox = InMemoryOutbox::new();
        let first = outbox.enqueue(sample_op()).await;
        let second = outbox
            .enqueue(OutboxOperation::CompleteExperiment { experiment_id: ExperimentId::new() })
            .await;

        let pending = outbox.list_pending().await;
        assert_eq!(pending[0].id, first);
        assert_eq!(pending[1].id, second);
    }

    #[tokio::test]
    async fn syncing_operations_are_excluded_from_pending() {
        let outbox = InMemoryOutbox::new();
        let id = outbox.enqueue(sample_op()).await;
        outbox.mark_syncing(id).await;

        assert!(outbox.list_pending().await.is_empty());
    }

    #[tokio::test]
    async fn failed_operation_can_be_retried() {
        let outbox = InMemoryOutbox::new();
        let id = outbox.enqueue(sample_op()).await;
        outbox.mark_syncing(id).await;
        outbox.mark_failed(id, "network error".to_string()).await;
        assert!(outbox.list_pending().await.is_empty());

        outbox.retry_failed(id).await.unwrap();
        let pending = outbox.list_pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
    }

    #[tokio::test]
    async fn retry_unknown_id_is_an_error() {
        let outbox = InMemoryOutbox::new();
        let result = outbox.retry_failed(Uuid::now_v7()).await;
        assert!(matches!(result, Err(OutboxError::NotFound(_))));
    }

    #[tokio::test]
    async fn synced_operation_is_not_listed_as_pending() {
        let outbox = InMemoryOutbox::new();
        let id = outbox.enqueue(sample_op()).await;
        outbox.mark_synced(id).await;
        assert!(outbox.list_pending().await.is_empty());
    }
}
