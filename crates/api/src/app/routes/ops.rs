use axum::extract::{Extension, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use eln_auth::Action;
use eln_infra::attachment_store::ReconcileParams;

use crate::app::dto::{reconcile_counts_json, verification_result_json, ReconcileRequest};
use crate::app::errors::domain_error_to_response;
use crate::app::state::AppState;
use crate::authz;
use crate::context::RequestPrincipal;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/audit/verify", get(verify_audit))
        .route("/attachments/reconcile", post(reconcile))
}

async fn verify_audit(
    State(state): State<AppState>,
    Extension(principal): Extension<RequestPrincipal>,
) -> axum::response::Response {
    if let Err(e) = authz::require(&principal, Action::RunOps) {
        return domain_error_to_response("ops.audit_verify", e);
    }

    match eln_infra::audit_store::verify_chain(&state.pool).await {
        Ok(result) => {
            if !result.valid {
                tracing::warn!(broken_at_sequence = ?result.broken_at_sequence, "audit chain verification failed");
            }
            Json(verification_result_json(&result)).into_response()
        }
        Err(e) => domain_error_to_response("ops.audit_verify", e),
    }
}

/// On-demand sweep, distinct from the scheduled background job: same store
/// APIs, triggered synchronously by an admin instead of waiting for the
/// next tick.
async fn reconcile(
    State(state): State<AppState>,
    Extension(principal): Extension<RequestPrincipal>,
    Json(req): Json<ReconcileRequest>,
) -> axum::response::Response {
    if let Err(e) = authz::require(&principal, Action::RunOps) {
        return domain_error_to_response("ops.reconcile", e);
    }

    let stale_after = chrono::Duration::seconds(
        req.stale_after_seconds.unwrap_or(state.config.reconcile_stale_after_secs),
    );
    let scan_limit = req.scan_limit.unwrap_or(state.config.reconcile_scan_limit);
    let run_id = format!("on-demand-{}", chrono::Utc::now().timestamp_millis());

    let params = ReconcileParams {
        run_id: &run_id,
        stale_after,
        scan_limit,
        sample_size: scan_limit.min(50),
        orphan_scan_limit: scan_limit,
    };

    match eln_infra::attachment_store::reconcile(
        &state.pool,
        &state.fanout,
        state.object_store.as_ref(),
        crate::app::state::system_user_id(),
        &AppState::system_device_id(),
        params,
    )
    .await
    {
        Ok(counts) => Json(reconcile_counts_json(&counts)).into_response(),
        Err(e) => domain_error_to_response("ops.reconcile", e),
    }
}
