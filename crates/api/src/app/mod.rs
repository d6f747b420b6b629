//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `state.rs`: process-wide wiring (pool, fan-out, signer, config)
//! - `routes/`: HTTP routes + handlers (one file per domain area)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;
use std::time::Duration as StdDuration;

use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use eln_auth::{Hs256JwtValidator, PasswordHasher};
use eln_infra::attachment_store::HttpObjectStore;
use eln_infra::reconcile_job::{self, ReconcilerConfig};
use eln_infra::url_signer::UrlSigner;
use eln_infra::AppConfig;

use crate::middleware::{self, AuthState};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod state;

pub use state::AppState;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: AppConfig) -> Result<Router, eln_core::DomainError> {
    let pool = eln_infra::db::connect(&config.database_url).await?;
    eln_infra::db::migrate(&pool).await?;

    let config = Arc::new(config);
    let fanout = Arc::new(eln_events::OwnerFanout::new());
    let jwt = Arc::new(Hs256JwtValidator::new(config.jwt_secret.clone()));
    let hasher = PasswordHasher::new();
    let signer = Arc::new(UrlSigner::new(
        config.signed_url_secret.clone(),
        config.object_store_base_url.clone(),
    ));

    let object_store: Arc<dyn eln_infra::attachment_store::ObjectStore> = Arc::new(HttpObjectStore::new(
        reqwest::Client::new(),
        UrlSigner::new(config.signed_url_secret.clone(), config.object_store_base_url.clone()),
        config.object_store_list_endpoint.clone(),
        config.object_store_bearer_token.clone(),
    ));

    let state = AppState {
        pool: pool.clone(),
        fanout: fanout.clone(),
        jwt: jwt.clone(),
        hasher,
        signer,
        config: config.clone(),
        object_store: object_store.clone(),
    };

    spawn_reconciler(pool, fanout, object_store, &config);

    let auth_state = AuthState { jwt };

    let protected = routes::router()
        .layer(axum::middleware::from_fn_with_state(auth_state, middleware::auth_middleware));

    let app = Router::new()
        .route("/healthz", get(routes::system::health))
        .nest("/v1/auth", routes::auth::router())
        .nest("/v1/sync", routes::sync::ws_router())
        .nest("/v1", protected)
        .layer(axum::middleware::from_fn_with_state(config.require_tls, tls_guard))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(app)
}

/// Reject non-TLS requests to every path but `/healthz` when configured to
/// require it, and always set the nosniff header on the way out.
async fn tls_guard(State(require_tls): State<bool>, req: Request, next: Next) -> Response {
    if require_tls && req.uri().path() != "/healthz" {
        let is_tls = req
            .headers()
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("https"))
            .unwrap_or(false);
        if !is_tls {
            return with_nosniff(StatusCode::UPGRADE_REQUIRED.into_response());
        }
    }
    with_nosniff(next.run(req).await)
}

fn with_nosniff(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    response
}

fn spawn_reconciler(
    pool: sqlx::PgPool,
    fanout: Arc<eln_events::OwnerFanout<eln_events::SyncNotification>>,
    object_store: Arc<dyn eln_infra::attachment_store::ObjectStore>,
    config: &AppConfig,
) {
    let reconciler_config = ReconcilerConfig {
        tick_interval: StdDuration::from_secs(config.reconcile_tick_secs),
        stale_after: chrono::Duration::seconds(config.reconcile_stale_after_secs),
        scan_limit: config.reconcile_scan_limit,
        sample_size: config.reconcile_scan_limit.min(50),
        orphan_scan_limit: config.reconcile_scan_limit,
        retry_policy: Default::default(),
    };

    tokio::spawn(reconcile_job::run(
        pool,
        fanout,
        object_store,
        state::system_user_id(),
        AppState::system_device_id(),
        reconciler_config,
    ));
}
