use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use eln_auth::Action;
use eln_core::id::{EntryId, ExperimentId};
use eln_core::DomainError;

use crate::app::dto::{
    conflict_artifact_json, experiment_json, experiment_status_str, AddAddendumRequest,
    CreateExperimentRequest,
};
use crate::app::errors::{domain_error_to_response, json_error};
use crate::app::state::AppState;
use crate::authz;
use crate::context::RequestPrincipal;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_experiment))
        .route("/:id/addendums", post(add_addendum))
        .route("/:id/complete", post(complete))
        .route("/:id", get(get_effective_view))
        .route("/:id/history", get(get_history))
        .route("/:id/signatures/verify", get(verify_signatures))
}

fn parse_id(raw: &str) -> Result<ExperimentId, axum::response::Response> {
    raw.parse()
        .map_err(|_: DomainError| json_error(StatusCode::BAD_REQUEST, "invalid experiment id"))
}

fn parse_entry_id(raw: &str) -> Result<EntryId, axum::response::Response> {
    raw.parse()
        .map_err(|_: DomainError| json_error(StatusCode::BAD_REQUEST, "invalid entry id"))
}

async fn create_experiment(
    State(state): State<AppState>,
    Extension(principal): Extension<RequestPrincipal>,
    Json(req): Json<CreateExperimentRequest>,
) -> axum::response::Response {
    if let Err(e) = authz::require(&principal, Action::WriteExperiment { owner_user_id: principal.user_id }) {
        return domain_error_to_response("experiments.create", e);
    }

    match eln_infra::experiment_store::create_experiment(
        &state.pool,
        &state.fanout,
        principal.user_id,
        &principal.device_id,
        &req.title,
        &req.original_body,
    )
    .await
    {
        Ok(created) => Json(serde_json::json!({
            "experimentId": created.experiment_id.to_string(),
            "originalEntryId": created.original_entry_id.to_string(),
            "status": experiment_status_str(created.status),
            "createdAt": created.created_at,
        }))
        .into_response(),
        Err(e) => domain_error_to_response("experiments.create", e),
    }
}

async fn add_addendum(
    State(state): State<AppState>,
    Extension(principal): Extension<RequestPrincipal>,
    Path(id): Path<String>,
    Json(req): Json<AddAddendumRequest>,
) -> axum::response::Response {
    let experiment_id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let base_entry_id = match parse_entry_id(&req.base_entry_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let experiment = match eln_infra::experiment_store::get_experiment(&state.pool, experiment_id).await {
        Ok(e) => e,
        Err(e) => return domain_error_to_response("experiments.add_addendum", e),
    };

    if let Err(e) = authz::require(&principal, Action::WriteExperiment { owner_user_id: experiment.owner_user_id }) {
        return domain_error_to_response("experiments.add_addendum", e);
    }

    match eln_infra::experiment_store::add_addendum(
        &state.pool,
        &state.fanout,
        experiment_id,
        experiment.owner_user_id,
        &principal.device_id,
        base_entry_id,
        &req.body,
    )
    .await
    {
        Ok(added) => Json(serde_json::json!({
            "entryId": added.entry_id.to_string(),
            "supersedesEntryId": added.supersedes_entry_id.to_string(),
            "createdAt": added.created_at,
        }))
        .into_response(),
        Err(DomainError::Conflict { conflict_artifact_id: Some(artifact_id), .. }) => {
            match eln_infra::conflict_store::get(&state.pool, artifact_id).await {
                Ok(artifact) => {
                    (StatusCode::CONFLICT, Json(conflict_artifact_json(&artifact))).into_response()
                }
                Err(e) => domain_error_to_response("experiments.add_addendum", e),
            }
        }
        Err(e) => domain_error_to_response("experiments.add_addendum", e),
    }
}

async fn complete(
    State(state): State<AppState>,
    Extension(principal): Extension<RequestPrincipal>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let experiment_id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let experiment = match eln_infra::experiment_store::get_experiment(&state.pool, experiment_id).await {
        Ok(e) => e,
        Err(e) => return domain_error_to_response("experiments.complete", e),
    };

    if let Err(e) = authz::require(&principal, Action::WriteExperiment { owner_user_id: experiment.owner_user_id }) {
        return domain_error_to_response("experiments.complete", e);
    }

    match eln_infra::experiment_store::mark_completed(
        &state.pool,
        &state.fanout,
        experiment_id,
        experiment.owner_user_id,
        &principal.device_id,
    )
    .await
    {
        Ok(()) => Json(serde_json::json!({ "status": "completed" })).into_response(),
        Err(e) => domain_error_to_response("experiments.complete", e),
    }
}

async fn read_gate(
    state: &AppState,
    principal: &RequestPrincipal,
    experiment_id: ExperimentId,
) -> Result<eln_core::experiment::Experiment, axum::response::Response> {
    let experiment = eln_infra::experiment_store::get_experiment(&state.pool, experiment_id)
        .await
        .map_err(|e| domain_error_to_response("experiments.read", e))?;

    let viewer_grants = eln_infra::experiment_store::list_viewer_grants(&state.pool, experiment_id)
        .await
        .map_err(|e| domain_error_to_response("experiments.read", e))?;

    authz::require(
        principal,
        Action::ReadExperiment {
            owner_user_id: experiment.owner_user_id,
            status: experiment.status,
            viewer_grant_user_ids: &viewer_grants,
        },
    )
    .map_err(|e| domain_error_to_response("experiments.read", e))?;

    Ok(experiment)
}

async fn get_effective_view(
    State(state): State<AppState>,
    Extension(principal): Extension<RequestPrincipal>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let experiment_id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    if let Err(resp) = read_gate(&state, &principal, experiment_id).await {
        return resp;
    }

    match eln_infra::experiment_store::get_effective_view(&state.pool, experiment_id).await {
        Ok(view) => Json(serde_json::json!({
            "experiment": experiment_json(&view.experiment),
            "originalEntryId": view.original_entry_id.to_string(),
            "effectiveEntryId": view.effective_entry_id.to_string(),
            "effectiveBody": view.effective_body,
        }))
        .into_response(),
        Err(e) => domain_error_to_response("experiments.get", e),
    }
}

async fn get_history(
    State(state): State<AppState>,
    Extension(principal): Extension<RequestPrincipal>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let experiment_id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    if let Err(resp) = read_gate(&state, &principal, experiment_id).await {
        return resp;
    }

    match eln_infra::experiment_store::get_history(&state.pool, experiment_id).await {
        Ok(history) => Json(serde_json::json!({
            "entries": history.iter().map(|e| serde_json::json!({
                "id": e.id.to_string(),
                "experimentId": e.experiment_id.to_string(),
                "authorUserId": e.author_user_id.to_string(),
                "entryType": e.entry_type,
                "supersedesEntryId": e.supersedes_entry_id.map(|id| id.to_string()),
                "body": e.body,
                "createdAt": e.created_at,
            })).collect::<Vec<_>>(),
        }))
        .into_response(),
        Err(e) => domain_error_to_response("experiments.history", e),
    }
}

async fn verify_signatures(
    State(state): State<AppState>,
    Extension(principal): Extension<RequestPrincipal>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let experiment_id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    if let Err(resp) = read_gate(&state, &principal, experiment_id).await {
        return resp;
    }

    match eln_infra::signature_store::verify_signatures(&state.pool, experiment_id).await {
        Ok(results) => Json(serde_json::json!({
            "signatures": results.iter().map(crate::app::dto::signature_verification_json).collect::<Vec<_>>(),
        }))
        .into_response(),
        Err(e) => domain_error_to_response("experiments.verify_signatures", e),
    }
}
