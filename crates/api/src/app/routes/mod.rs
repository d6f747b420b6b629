use axum::Router;

use crate::app::state::AppState;

pub mod attachments;
pub mod auth;
pub mod experiments;
pub mod ops;
pub mod signatures;
pub mod sync;
pub mod system;

/// Router for every endpoint gated by the bearer-token middleware: every
/// path except `/healthz` and the WS upgrade, which authenticates itself
/// from a query parameter (see [`sync::ws_router`]).
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/experiments", experiments::router())
        .nest("/sync", sync::router())
        .nest("/attachments", attachments::router())
        .nest("/signatures", signatures::router())
        .nest("/ops", ops::router())
}
