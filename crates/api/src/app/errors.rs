use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;

use holdings_core::ValidationErrors;
use holdings_infra::{ReconcileError, StoreError};

const SERVER_ERROR_MESSAGE: &str =
    "the server encountered a problem and could not process your request";

pub fn reconcile_error_to_response(err: ReconcileError) -> axum::response::Response {
    match err {
        ReconcileError::Validation(fields) => failed_validation(fields),
        ReconcileError::Store(e) => store_error_to_response(e),
        ReconcileError::Exhausted { attempts } => json_error(
            StatusCode::CONFLICT,
            "edit_conflict",
            format!("unable to apply the change after {attempts} attempts due to concurrent edits, please try again"),
        ),
    }
}

/// Store failures on the request path are opaque 500s. `NotFound` included:
/// absence is handled inside the reconcilers, so seeing it here is a fault.
pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    server_error(&err)
}

/// 500 with an opaque body; the cause is only logged.
pub fn server_error(err: &dyn std::fmt::Display) -> axum::response::Response {
    error!(error = %err, "request failed");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "server_error", SERVER_ERROR_MESSAGE)
}

pub fn failed_validation(fields: ValidationErrors) -> axum::response::Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        axum::Json(json!({
            "error": "validation_error",
            "message": "one or more fields failed validation",
            "fields": fields,
        })),
    )
        .into_response()
}

pub fn bad_request(message: impl Into<String>) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "bad_request", message)
}

pub fn not_found() -> axum::response::Response {
    json_error(
        StatusCode::NOT_FOUND,
        "not_found",
        "the requested resource could not be found",
    )
}

pub fn deadline_exceeded() -> axum::response::Response {
    json_error(
        StatusCode::SERVICE_UNAVAILABLE,
        "deadline_exceeded",
        "the request did not complete in time, please try again",
    )
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_error_kind() {
        let mut fields = ValidationErrors::new();
        fields.add("userID", "must be greater than 0");

        assert_eq!(
            reconcile_error_to_response(ReconcileError::Validation(fields)).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            reconcile_error_to_response(ReconcileError::Store(StoreError::backend("down"))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            reconcile_error_to_response(ReconcileError::Exhausted { attempts: 5 }).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            reconcile_error_to_response(ReconcileError::Store(StoreError::NotFound)).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            store_error_to_response(StoreError::NotFound).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(deadline_exceeded().status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
