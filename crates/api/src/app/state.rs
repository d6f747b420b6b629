//! Process-wide wiring: the connection pool, the per-owner fan-out, and the
//! ambient services every route handler needs a handle to.

use std::sync::Arc;

use eln_auth::{Hs256JwtValidator, PasswordHasher};
use eln_core::id::{DeviceId, UserId};
use eln_events::{OwnerFanout, SyncNotification};
use eln_infra::attachment_store::ObjectStore;
use eln_infra::url_signer::UrlSigner;
use eln_infra::AppConfig;
use sqlx::PgPool;
use uuid::Uuid;

/// The actor recorded against audit/sync entries written by the background
/// reconciler rather than by a request. Not a real row in `users`; nothing
/// references it by foreign key.
pub fn system_user_id() -> UserId {
    UserId::from_uuid(Uuid::nil())
}

pub const SYSTEM_DEVICE_ID_STR: &str = "system-reconciler";

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub fanout: Arc<OwnerFanout<SyncNotification>>,
    pub jwt: Arc<Hs256JwtValidator>,
    pub hasher: PasswordHasher,
    pub signer: Arc<UrlSigner>,
    pub config: Arc<AppConfig>,
    pub object_store: Arc<dyn ObjectStore>,
}

impl AppState {
    pub fn system_device_id() -> DeviceId {
        DeviceId::new(SYSTEM_DEVICE_ID_STR)
    }
}
