//! Cursor-based pull loop: drains the outbox, then advances the client's
//! sync cursor against `/v1/sync/pull`. A closed WS connection or a missed
//! push is harmless — the next `pull_once` resumes from the last
//! persisted cursor, never from scratch.

use crate::error::ClientError;
use crate::http::SyncClient;
use crate::outbox::Outbox;
use crate::wire::SyncPageDto;

/// Drives outbox replay and cursor advancement for one client session.
/// Cheap to construct; holds only a reference to the transport and queue,
/// plus the in-process cursor (the caller persists it across restarts).
pub struct Puller<'a, O: Outbox> {
    client: &'a SyncClient,
    outbox: &'a O,
    cursor: i64,
}

impl<'a, O: Outbox> Puller<'a, O> {
    pub fn new(client: &'a SyncClient, outbox: &'a O, initial_cursor: i64) -> Self {
        Self { client, outbox, cursor: initial_cursor }
    }

    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    /// Replay every `Pending` queued write, in FIFO order, stopping at the
    /// first one that fails with something other than a conflict (so older
    /// writes are never reordered past a blocked one). Returns the ids that
    /// synced successfully.
    pub async fn drain_outbox(&self) -> Vec<uuid::Uuid> {
        let mut synced = Vec::new();
        for queued in self.outbox.list_pending().await {
            self.outbox.mark_syncing(queued.id).await;
            match self.client.submit(&queued.operation).await {
                Ok(_) => {
                    self.outbox.mark_synced(queued.id).await;
                    synced.push(queued.id);
                }
                Err(ClientError::Conflict(artifact)) => {
                    self.outbox.mark_failed(queued.id, format!("stale base: {artifact:?}")).await;
                    break;
                }
                Err(err) => {
                    self.outbox.mark_failed(queued.id, err.to_string()).await;
                    break;
                }
            }
        }
        synced
    }

    /// Pull one page at or above the current cursor and advance it.
    pub async fn pull_once(&mut self, limit: i64) -> Result<SyncPageDto, ClientError> {
        let page = self.client.pull(self.cursor, limit).await?;
        self.cursor = page.cursor;
        Ok(page)
    }

    /// Drain the outbox, then keep pulling pages until a page comes back
    /// with no events (the change feed is caught up).
    pub async fn catch_up(&mut self, page_size: i64) -> Result<Vec<SyncPageDto>, ClientError> {
        self.drain_outbox().await;
        let mut pages = Vec::new();
        loop {
            let page = self.pull_once(page_size).await?;
            let exhausted = page.events.is_empty();
            pages.push(page);
            if exhausted {
                break;
            }
        }
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::InMemoryOutbox;
    use crate::types::OutboxOperation;

    #[tokio::test]
    async fn drain_outbox_stops_after_first_failure_leaving_later_writes_pending() {
        let outbox = InMemoryOutbox::new();
        let first = outbox
            .enqueue(OutboxOperation::CreateExperiment {
                title: "first".to_string(),
                original_body: "body".to_string(),
            })
            .await;
        let second = outbox
            .enqueue(OutboxOperation::CreateExperiment {
                title: "second".to_string(),
                original_body: "body".to_string(),
            })
            .await;

        // No server reachable at this address: every submit fails with Offline.
        let client = SyncClient::new("http://127.0.0.1:0");
        let puller = Puller::new(&client, &outbox, 0);
        let synced = puller.drain_outbox().await;

        assert!(synced.is_empty());
        let pending_ids: Vec<_> = outbox.list_pending().await.into_iter().map(|op| op.id).collect();
        // First was marked failed (not pending); second was never attempted.
        assert!(!pending_ids.contains(&first));
        assert!(pending_ids.contains(&second));
    }
}
