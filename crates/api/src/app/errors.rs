use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use eln_core::DomainError;

/// Map a domain error to its HTTP response, logging it per the policy below
/// before the mapping erases the detail a client doesn't get to see.
///
/// `Internal` is logged at `error!` with the given operation context and
/// collapses to a generic message so nothing internal leaks in the body.
/// `Conflict`/`NotFound`/`InvalidInput` are expected traffic and logged at
/// `debug!`. Every other variant is a client-facing 4xx with its own message.
pub fn domain_error_to_response(operation: &str, err: DomainError) -> axum::response::Response {
    match err {
        DomainError::InvalidInput(msg) => {
            tracing::debug!(operation, error = %msg, "invalid input");
            json_error(StatusCode::BAD_REQUEST, msg)
        }
        DomainError::Unauthenticated => {
            tracing::debug!(operation, "unauthenticated");
            json_error(StatusCode::UNAUTHORIZED, "unauthorized")
        }
        DomainError::Forbidden(msg) => {
            tracing::debug!(operation, error = %msg, "forbidden");
            json_error(StatusCode::FORBIDDEN, msg)
        }
        DomainError::NotFound => {
            tracing::debug!(operation, "not found");
            json_error(StatusCode::NOT_FOUND, "not found")
        }
        DomainError::Conflict { message, conflict_artifact_id } => {
            tracing::debug!(operation, error = %message, "conflict");
            let mut body = json!({ "error": message });
            if let Some(id) = conflict_artifact_id {
                body["conflictArtifactId"] = json!(id.to_string());
            }
            (StatusCode::CONFLICT, axum::Json(body)).into_response()
        }
        DomainError::InvalidPassword => {
            tracing::debug!(operation, "invalid password");
            json_error(StatusCode::UNAUTHORIZED, "invalid password")
        }
        DomainError::Internal(msg) => {
            tracing::error!(operation, error = %msg, "internal error");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

pub fn json_error(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (status, axum::Json(json!({ "error": message.into() }))).into_response()
}
