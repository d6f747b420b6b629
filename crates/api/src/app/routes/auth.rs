use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use eln_core::id::DeviceId;

use crate::app::dto::{LoginRequest, LogoutRequest, RefreshRequest, SessionResponse};
use crate::app::errors::domain_error_to_response;
use crate::app::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
}

fn session_response(
    access_token: String,
    refresh_token: String,
    access_ttl: std::time::Duration,
) -> SessionResponse {
    let expires_at = chrono::Utc::now() + chrono::Duration::from_std(access_ttl).unwrap_or(chrono::Duration::zero());
    SessionResponse {
        access_token,
        refresh_token,
        access_token_expires_at: expires_at,
    }
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> axum::response::Response {
    let access_ttl = chrono::Duration::from_std(state.config.access_token_ttl).unwrap_or(chrono::Duration::zero());
    let refresh_ttl = chrono::Duration::from_std(state.config.refresh_token_ttl).unwrap_or(chrono::Duration::zero());

    match eln_infra::auth_store::login(
        &state.pool,
        &state.hasher,
        &state.jwt,
        access_ttl,
        refresh_ttl,
        &req.email,
        &req.password,
        DeviceId::new(req.device_name),
    )
    .await
    {
        Ok(session) => Json(session_response(
            session.access_token,
            session.refresh_token,
            state.config.access_token_ttl,
        ))
        .into_response(),
        Err(e) => domain_error_to_response("auth.login", e),
    }
}

async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> axum::response::Response {
    let access_ttl = chrono::Duration::from_std(state.config.access_token_ttl).unwrap_or(chrono::Duration::zero());
    let refresh_ttl = chrono::Duration::from_std(state.config.refresh_token_ttl).unwrap_or(chrono::Duration::zero());

    match eln_infra::auth_store::refresh(
        &state.pool,
        &state.jwt,
        access_ttl,
        refresh_ttl,
        &req.refresh_token,
        DeviceId::new(req.device_name),
    )
    .await
    {
        Ok(session) => Json(session_response(
            session.access_token,
            session.refresh_token,
            state.config.access_token_ttl,
        ))
        .into_response(),
        Err(e) => domain_error_to_response("auth.refresh", e),
    }
}

async fn logout(
    State(state): State<AppState>,
    Json(req): Json<LogoutRequest>,
) -> axum::response::Response {
    match eln_infra::auth_store::logout(&state.pool, &req.refresh_token).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => domain_error_to_response("auth.logout", e),
    }
}
