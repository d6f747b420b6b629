use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use eln_auth::Action;

use crate::app::dto::SignRequest;
use crate::app::errors::{domain_error_to_response, json_error};
use crate::app::state::AppState;
use crate::authz;
use crate::context::RequestPrincipal;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(create_signature))
}

async fn create_signature(
    State(state): State<AppState>,
    Extension(principal): Extension<RequestPrincipal>,
    Json(req): Json<SignRequest>,
) -> axum::response::Response {
    let experiment_id: eln_core::id::ExperimentId = match req.experiment_id.parse() {
        Ok(id) => id,
        Err(_) => return json_error(StatusCode::BAD_REQUEST, "invalid experimentId"),
    };

    let experiment = match eln_infra::experiment_store::get_experiment(&state.pool, experiment_id).await {
        Ok(e) => e,
        Err(e) => return domain_error_to_response("signatures.create", e),
    };

    if let Err(e) = authz::require(&principal, Action::WriteExperiment { owner_user_id: experiment.owner_user_id }) {
        return domain_error_to_response("signatures.create", e);
    }

    match eln_infra::signature_store::sign(
        &state.pool,
        &state.fanout,
        &state.hasher,
        experiment_id,
        principal.user_id,
        &principal.device_id,
        &req.password,
        &req.signature_type,
        &req.meaning,
    )
    .await
    {
        Ok(result) => Json(serde_json::json!({
            "signatureId": result.signature_id.to_string(),
            "contentHash": hex::encode(result.content_hash),
            "signedAt": result.signed_at,
        }))
        .into_response(),
        Err(e) => domain_error_to_response("signatures.create", e),
    }
}
