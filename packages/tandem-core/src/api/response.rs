//! HTTP response helpers for consistent API bodies.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::json;

/// `200 OK` with `data` as the JSON body.
pub fn api_success<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::OK, Json(data))
}

/// `200 OK` with `{ "success": true }`, the push acknowledgement.
pub fn api_ok() -> impl IntoResponse {
    api_success(json!({ "success": true }))
}

/// Error body in the same shape as [`TandemError`](crate::error::TandemError)
/// responses, for failures raised in the HTTP layer itself.
pub fn api_error(status: StatusCode, code: &str, message: impl std::fmt::Display) -> impl IntoResponse {
    (
        status,
        Json(json!({
            "error": code,
            "message": message.to_string(),
            "status": status.as_u16(),
        })),
    )
}
