//! Pull/conflicts/WS: the sync surface clients use to catch up after being
//! offline. Pull is authoritative; the WS push is a best-effort nudge to
//! pull sooner, per the fan-out's own doc comment.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Extension, Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use eln_auth::JwtValidator;
use eln_core::id::UserId;
use eln_events::SyncNotificationFrame;

use crate::app::dto::{sync_page_json, ConflictsQuery, PullQuery, SyncWsQuery};
use crate::app::errors::domain_error_to_response;
use crate::app::state::AppState;
use crate::context::RequestPrincipal;

/// Pull and conflicts, mounted behind the bearer-header auth middleware.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/pull", get(pull))
        .route("/conflicts", get(conflicts))
}

/// The WS upgrade, mounted separately and ungated: it authenticates itself
/// from the `access_token` query parameter instead of the `Authorization`
/// header, since browsers cannot set custom headers on a WS handshake.
pub fn ws_router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

async fn pull(
    State(state): State<AppState>,
    Extension(principal): Extension<RequestPrincipal>,
    Query(query): Query<PullQuery>,
) -> axum::response::Response {
    match eln_infra::sync_store::pull(&state.pool, principal.user_id, query.cursor, query.limit).await {
        Ok(page) => Json(sync_page_json(&page)).into_response(),
        Err(e) => domain_error_to_response("sync.pull", e),
    }
}

async fn conflicts(
    State(state): State<AppState>,
    Extension(principal): Extension<RequestPrincipal>,
    Query(query): Query<ConflictsQuery>,
) -> axum::response::Response {
    match eln_infra::conflict_store::list_for_owner(&state.pool, principal.user_id, query.limit).await {
        Ok(artifacts) => Json(serde_json::json!({
            "conflicts": artifacts.iter().map(crate::app::dto::conflict_artifact_json).collect::<Vec<_>>(),
        }))
        .into_response(),
        Err(e) => domain_error_to_response("sync.conflicts", e),
    }
}

/// The WS route authenticates itself from the `access_token` query param
/// rather than the `Authorization` header, since browsers cannot set custom
/// headers on a WebSocket handshake — it is mounted outside the blanket
/// bearer-header middleware for that reason.
async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<SyncWsQuery>,
    ws: WebSocketUpgrade,
) -> axum::response::Response {
    let claims = match state.jwt.validate(&query.access_token, chrono::Utc::now()) {
        Ok(claims) => claims,
        Err(_) => return axum::http::StatusCode::UNAUTHORIZED.into_response(),
    };
    let owner_user_id = claims.sub;

    ws.on_upgrade(move |socket| handle_socket(socket, state, owner_user_id))
}

/// `OwnerSubscription::recv` blocks the calling thread, so it cannot be
/// awaited directly inside this async loop; it is bridged onto a blocking
/// task that forwards each notification into an async channel.
async fn handle_socket(mut socket: WebSocket, state: AppState, owner_user_id: UserId) {
    let subscription = state.fanout.subscribe(owner_user_id);
    let (tx, mut rx) = tokio::sync::mpsc::channel::<()>(8);

    tokio::task::spawn_blocking(move || {
        while subscription.recv().is_ok() {
            if tx.blocking_send(()).is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            notified = rx.recv() => {
                if notified.is_none() {
                    break;
                }
                let frame = SyncNotificationFrame::default();
                let Ok(text) = serde_json::to_string(&frame) else { continue };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}
