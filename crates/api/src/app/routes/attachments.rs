use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use eln_auth::Action;
use eln_core::id::AttachmentId;

use crate::app::dto::{CompleteAttachmentRequest, InitiateAttachmentRequest};
use crate::app::errors::{domain_error_to_response, json_error};
use crate::app::state::AppState;
use crate::authz;
use crate::context::RequestPrincipal;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/initiate", post(initiate))
        .route("/:id/complete", post(complete))
        .route("/:id/download", get(download))
}

fn parse_id(raw: &str) -> Result<AttachmentId, axum::response::Response> {
    raw.parse()
        .map_err(|_: eln_core::DomainError| json_error(StatusCode::BAD_REQUEST, "invalid attachment id"))
}

async fn initiate(
    State(state): State<AppState>,
    Extension(principal): Extension<RequestPrincipal>,
    Json(req): Json<InitiateAttachmentRequest>,
) -> axum::response::Response {
    let experiment_id: eln_core::id::ExperimentId = match req.experiment_id.parse() {
        Ok(id) => id,
        Err(_) => return json_error(StatusCode::BAD_REQUEST, "invalid experimentId"),
    };

    let experiment = match eln_infra::experiment_store::get_experiment(&state.pool, experiment_id).await {
        Ok(e) => e,
        Err(e) => return domain_error_to_response("attachments.initiate", e),
    };

    if let Err(e) = authz::require(&principal, Action::WriteExperiment { owner_user_id: experiment.owner_user_id }) {
        return domain_error_to_response("attachments.initiate", e);
    }

    let upload_ttl = chrono::Duration::from_std(state.config.upload_url_ttl).unwrap_or(chrono::Duration::zero());

    match eln_infra::attachment_store::initiate(
        &state.pool,
        &state.fanout,
        &state.signer,
        upload_ttl,
        experiment_id,
        experiment.owner_user_id,
        &principal.device_id,
        &req.object_key,
        req.size_bytes,
        &req.mime_type,
        state.config.attachment_max_size_bytes,
    )
    .await
    {
        Ok(initiated) => Json(serde_json::json!({
            "attachmentId": initiated.attachment_id.to_string(),
            "uploadUrl": initiated.upload_url,
            "uploadUrlExpiresAt": initiated.upload_url_expires_at,
        }))
        .into_response(),
        Err(e) => domain_error_to_response("attachments.initiate", e),
    }
}

async fn complete(
    State(state): State<AppState>,
    Extension(principal): Extension<RequestPrincipal>,
    Path(id): Path<String>,
    Json(req): Json<CompleteAttachmentRequest>,
) -> axum::response::Response {
    let attachment_id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let attachment = match eln_infra::attachment_store::get(&state.pool, attachment_id).await {
        Ok(a) => a,
        Err(e) => return domain_error_to_response("attachments.complete", e),
    };
    let experiment = match eln_infra::experiment_store::get_experiment(&state.pool, attachment.experiment_id).await {
        Ok(e) => e,
        Err(e) => return domain_error_to_response("attachments.complete", e),
    };

    if let Err(e) = authz::require(&principal, Action::WriteExperiment { owner_user_id: experiment.owner_user_id }) {
        return domain_error_to_response("attachments.complete", e);
    }

    match eln_infra::attachment_store::complete(
        &state.pool,
        &state.fanout,
        attachment_id,
        experiment.owner_user_id,
        &principal.device_id,
        &req.checksum,
        req.size_bytes,
    )
    .await
    {
        Ok(_) => Json(serde_json::json!({ "status": "completed" })).into_response(),
        Err(e) => domain_error_to_response("attachments.complete", e),
    }
}

async fn download(
    State(state): State<AppState>,
    Extension(principal): Extension<RequestPrincipal>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let attachment_id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let attachment = match eln_infra::attachment_store::get(&state.pool, attachment_id).await {
        Ok(a) => a,
        Err(e) => return domain_error_to_response("attachments.download", e),
    };
    let experiment = match eln_infra::experiment_store::get_experiment(&state.pool, attachment.experiment_id).await {
        Ok(e) => e,
        Err(e) => return domain_error_to_response("attachments.download", e),
    };
    let viewer_grants = match eln_infra::experiment_store::list_viewer_grants(&state.pool, experiment.id).await {
        Ok(g) => g,
        Err(e) => return domain_error_to_response("attachments.download", e),
    };

    if let Err(e) = authz::require(
        &principal,
        Action::ReadExperiment {
            owner_user_id: experiment.owner_user_id,
            status: experiment.status,
            viewer_grant_user_ids: &viewer_grants,
        },
    ) {
        return domain_error_to_response("attachments.download", e);
    }

    let download_ttl = chrono::Duration::from_std(state.config.download_url_ttl).unwrap_or(chrono::Duration::zero());

    match eln_infra::attachment_store::download(&state.pool, &state.signer, download_ttl, attachment_id).await {
        Ok(grant) => Json(serde_json::json!({
            "downloadUrl": grant.download_url,
            "downloadUrlExpiresAt": grant.download_url_expires_at,
        }))
        .into_response(),
        Err(e) => domain_error_to_response("attachments.download", e),
    }
}
