//! Common error types for the coordinator

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stable, machine-readable classification of an [`AppError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Unavailable,
    Timeout,
    Internal,
    Validation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found_error",
            ErrorKind::Unavailable => "unavailable_error",
            ErrorKind::Timeout => "timeout_error",
            ErrorKind::Internal => "server_error",
            ErrorKind::Validation => "invalid_request_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
        }
    }
}

impl AppError {
    pub fn service_not_found(name: &str) -> Self {
        AppError::NotFound(format!("service '{}'", name))
    }

    pub fn credential_not_found(id: &str) -> Self {
        AppError::NotFound(format!("credential '{}'", id))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Config(_) | AppError::Io(_) | AppError::HttpClient(_) => ErrorKind::Internal,
            AppError::Json(_) | AppError::Validation(_) => ErrorKind::Validation,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Unavailable(_) => ErrorKind::Unavailable,
            AppError::Timeout(_) => ErrorKind::Timeout,
            AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    fn code(&self) -> Option<&'static str> {
        match self {
            AppError::Json(_) => Some("invalid_json"),
            AppError::NotFound(_) => Some("not_found"),
            AppError::Unavailable(_) => Some("service_unavailable"),
            AppError::Timeout(_) => Some("upstream_timeout"),
            _ => None,
        }
    }

    /// Attach the correlation id of the request that produced this error
    pub fn with_request_id(self, request_id: impl Into<String>) -> ApiError {
        ApiError {
            error: self,
            request_id: Some(request_id.into()),
        }
    }
}

/// Error body returned to clients
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
    pub code: Option<String>,
    pub request_id: Option<String>,
}

/// An [`AppError`] bound to the request it occurred in
#[derive(Debug)]
pub struct ApiError {
    pub error: AppError,
    pub request_id: Option<String>,
}

impl From<AppError> for ApiError {
    fn from(error: AppError) -> Self {
        Self {
            error,
            request_id: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.error.kind();

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                message: self.error.to_string(),
                r#type: kind.as_str().to_string(),
                code: self.error.code().map(|c| c.to_string()),
                request_id: self.request_id,
            },
        });

        (kind.status_code(), body).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
