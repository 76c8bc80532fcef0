// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! API error type and its HTTP mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bookswap_core::{AuthError, CoreError};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Errors returned by handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (also used to hide the admin surface).
    #[error("{0}")]
    NotFound(String),

    /// Malformed request.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A field failed validation.
    #[error("{0}")]
    Validation(String),

    /// State precondition violated.
    #[error("{0}")]
    Conflict(String),

    /// Authenticated but not allowed.
    #[error("{0}")]
    Forbidden(String),

    /// No valid identity.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Anything the caller cannot fix. Details are logged, not returned.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Response used for every admin-route failure.
    pub fn hidden() -> Self {
        Self::NotFound("Not found".to_string())
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable message.
    pub error: String,
    /// Stable machine-readable code.
    pub code: String,
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::NotFound { .. } => Self::NotFound(message),
            CoreError::Validation { .. } => Self::Validation(message),
            CoreError::Conflict { .. } => Self::Conflict(message),
            CoreError::Forbidden { .. } => Self::Forbidden(message),
            _ => Self::Internal(message),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::Unauthorized(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let message = match &self {
            ApiError::Internal(details) => {
                error!(details = %details, "Request failed");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;
