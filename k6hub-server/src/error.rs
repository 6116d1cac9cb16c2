//! Server error types and the JSON error body

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use k6hub_core::{AuthError, DispatchError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur in the k6hub server
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the specified address
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to open the fleet database
    #[error("storage error: {0}")]
    Storage(#[from] k6hub_core::StoreError),

    /// Internal server error
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// A handler failure rendered as `{error, code}` with a matching status
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        let (status, code) = match &err {
            DispatchError::AgentNotFound(_) => (StatusCode::NOT_FOUND, "AGENT_NOT_FOUND"),
            DispatchError::TaskNotFound(_) => (StatusCode::NOT_FOUND, "TASK_NOT_FOUND"),
            DispatchError::ScriptNotFound(_) => (StatusCode::NOT_FOUND, "SCRIPT_NOT_FOUND"),
            DispatchError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            DispatchError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            DispatchError::Validation(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            DispatchError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            DispatchError::Store(e) => {
                tracing::error!(error = %e, "Storage failure while handling request");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };
        Self::new(status, code, err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let code = match err {
            AuthError::Expired => "TOKEN_EXPIRED",
            AuthError::NotConfigured => "AUTH_NOT_CONFIGURED",
            _ => "UNAUTHORIZED",
        };
        Self::new(StatusCode::UNAUTHORIZED, code, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
                code: self.code.to_string(),
            }),
        )
            .into_response()
    }
}
