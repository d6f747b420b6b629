//! Scheduled wrapper around the attachment reconciler: a background task
//! that sweeps on a fixed interval and retries a failed sweep with backoff
//! before falling back to its next regularly scheduled tick.

use std::time::Duration as StdDuration;

use tracing::{error, info, warn};

use eln_core::id::{DeviceId, UserId};
use eln_core::reconcile::ReconcileCounts;
use eln_events::{OwnerFanout, SyncNotification};

use crate::attachment_store::{self, ObjectStore, ReconcileParams};

#[derive(Debug, Clone, Copy)]
pub enum BackoffStrategy {
    Fixed,
    Exponential,
}

/// Retry policy for a single sweep attempt. Distinct from the sweep's own
/// interval: this governs retries *within* one tick, not the schedule
/// between ticks.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: StdDuration,
    pub max_delay: StdDuration,
    pub strategy: BackoffStrategy,
}

impl RetryPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> StdDuration {
        let delay = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential => self.base_delay.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX)),
        };
        delay.min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: StdDuration::from_secs(2),
            max_delay: StdDuration::from_secs(30),
            strategy: BackoffStrategy::Exponential,
        }
    }
}

pub struct ReconcilerConfig {
    pub tick_interval: StdDuration,
    pub stale_after: chrono::Duration,
    pub scan_limit: i64,
    pub sample_size: i64,
    pub orphan_scan_limit: i64,
    pub retry_policy: RetryPolicy,
}

/// Run the reconciliation sweep forever, one tick per `config.tick_interval`.
/// Intended to be spawned as its own tokio task at process startup; never
/// returns under normal operation.
pub async fn run(
    pool: sqlx::PgPool,
    fanout: std::sync::Arc<OwnerFanout<SyncNotification>>,
    store: std::sync::Arc<dyn ObjectStore>,
    system_actor: UserId,
    system_device: DeviceId,
    config: ReconcilerConfig,
) -> ! {
    let mut ticker = tokio::time::interval(config.tick_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut run_counter: u64 = 0;

    loop {
        ticker.tick().await;
        run_counter += 1;
        let run_id = format!("reconcile-{run_counter}");

        match run_once_with_retry(&pool, &fanout, store.as_ref(), system_actor, &system_device, &run_id, &config).await {
            Ok(counts) => info!(
                run_id,
                stale_initiated = counts.stale_initiated,
                missing_checksum = counts.missing_checksum,
                integrity_mismatch = counts.integrity_mismatch,
                orphan_object = counts.orphan_object,
                "reconciliation sweep completed"
            ),
            Err(err) => error!(run_id, %err, "reconciliation sweep failed after retries, resuming on next tick"),
        }
    }
}

async fn run_once_with_retry(
    pool: &sqlx::PgPool,
    fanout: &OwnerFanout<SyncNotification>,
    store: &dyn ObjectStore,
    system_actor: UserId,
    system_device: &DeviceId,
    run_id: &str,
    config: &ReconcilerConfig,
) -> Result<ReconcileCounts, eln_core::DomainError> {
    let mut attempt = 0u32;
    loop {
        let params = ReconcileParams {
            run_id,
            stale_after: config.stale_after,
            scan_limit: config.scan_limit,
            sample_size: config.sample_size,
            orphan_scan_limit: config.orphan_scan_limit,
        };

        match attachment_store::reconcile(pool, fanout, store, system_actor, system_device, params).await {
            Ok(counts) => return Ok(counts),
            Err(err) if attempt + 1 < config.retry_policy.max_attempts => {
                let delay = config.retry_policy.delay_for_attempt(attempt);
                warn!(run_id, %err, attempt, delay_ms = delay.as_millis() as u64, "sweep attempt failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_is_capped_at_max_delay() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: StdDuration::from_secs(1),
            max_delay: StdDuration::from_secs(10),
            strategy: BackoffStrategy::Exponential,
        };
        assert_eq!(policy.delay_for_attempt(0), StdDuration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(10), StdDuration::from_secs(10));
    }

    #[test]
    fn fixed_backoff_never_grows() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: StdDuration::from_secs(5),
            max_delay: StdDuration::from_secs(30),
            strategy: BackoffStrategy::Fixed,
        };
        assert_eq!(policy.delay_for_attempt(0), policy.delay_for_attempt(4));
    }
}
