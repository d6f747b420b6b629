//! Transient pub/sub mechanics for the sync engine's WebSocket push path.
//!
//! Nothing here is persisted; the event log of record lives in `eln-core`
//! (`SyncEvent`) and is stored by `eln-infra`. This crate only carries the
//! best-effort in-process fan-out layered on top.

pub mod notification;
pub mod owner_bus;

pub use notification::{SyncNotification, SyncNotificationFrame};
pub use owner_bus::{OwnerFanout, OwnerSubscription};
