//! Centralized error types for the Tandem core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

impl ErrorCode for StoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "store_request_failed",
            Self::HttpStatus(_, _) => "store_error_status",
            Self::Backend(_) => "store_backend_error",
            Self::Decode(_) => "store_decode_failed",
            Self::Encode(_) => "store_encode_failed",
        }
    }
}

/// Application-wide error type for session and sync operations.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum TandemError {
    /// Session code does not resolve: never existed, reclaimed, or ended.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// A non-host attempted a host-only operation.
    #[error("User {user_id} is not the host of session {session_id}")]
    NotHost { session_id: String, user_id: String },

    /// Unrecognized action string on a session or sync endpoint.
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Every generated session code collided with a live session.
    #[error("Could not generate a free session code after {attempts} attempts")]
    CodeSpaceExhausted { attempts: u32 },

    /// Session store backend failed.
    #[error("Session store unavailable: {0}")]
    Store(String),

    /// Server configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TandemError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "session_not_found",
            Self::NotHost { .. } => "not_host",
            Self::InvalidAction(_) => "invalid_action",
            Self::InvalidRequest(_) => "invalid_request",
            Self::CodeSpaceExhausted { .. } => "code_generation_failed",
            Self::Store(_) => "store_unavailable",
            Self::Configuration(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::NotHost { .. } => StatusCode::FORBIDDEN,
            Self::InvalidAction(_) | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::CodeSpaceExhausted { .. } | Self::Store(_) | Self::Configuration(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type TandemResult<T> = Result<T, TandemError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for TandemError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for TandemError {
    fn from(err: StoreError) -> Self {
        log::warn!("[Store] {} ({})", err, err.code());
        Self::Store(err.to_string())
    }
}
