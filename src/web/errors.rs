//! # Web API Error Types
//!
//! Errors surfaced by the node server and their HTTP response conversions.
//! Every error renders as `{"error": {"code": "...", "message": "..."}}`.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::federation::{CoordinatorError, NodeAuthError, RegistryError};
use crate::web::state::LocalHandlerError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Resource not found: {message}")]
    NotFound { message: String },

    #[error("Invalid request: {message}")]
    BadRequest { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Authentication failed: {reason}")]
    AuthenticationError { reason: String },

    #[error("Authorization failed: {reason}")]
    AuthorizationError { reason: String },

    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Node unreachable: {reason}")]
    NodeUnreachable { reason: String },

    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn auth_error(reason: impl Into<String>) -> Self {
        Self::AuthenticationError {
            reason: reason.into(),
        }
    }

    pub fn authorization_error(reason: impl Into<String>) -> Self {
        Self::AuthorizationError {
            reason: reason.into(),
        }
    }

    pub fn node_unreachable(reason: impl Into<String>) -> Self {
        Self::NodeUnreachable {
            reason: reason.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::AuthenticationError { .. } => StatusCode::UNAUTHORIZED,
            ApiError::AuthorizationError { .. } => StatusCode::FORBIDDEN,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::NodeUnreachable { .. } => StatusCode::BAD_GATEWAY,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ApiError::NotFound { .. } => "NOT_FOUND",
            ApiError::BadRequest { .. } => "BAD_REQUEST",
            ApiError::Conflict { .. } => "CONFLICT",
            ApiError::AuthenticationError { .. } => "AUTHENTICATION_FAILED",
            ApiError::AuthorizationError { .. } => "AUTHORIZATION_FAILED",
            ApiError::RateLimited { .. } => "RATE_LIMITED",
            ApiError::NodeUnreachable { .. } => "NODE_UNREACHABLE",
            ApiError::Internal => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let error_response = json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string()
            }
        });

        let mut response = (status_code, Json(error_response)).into_response();
        if let ApiError::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

impl From<NodeAuthError> for ApiError {
    fn from(err: NodeAuthError) -> Self {
        match err {
            NodeAuthError::ConfigurationError(_) | NodeAuthError::JwtError(_) => {
                error!(error = %err, "Node credential processing failed");
                ApiError::Internal
            }
            err if err.is_authorization_failure() => ApiError::authorization_error(err.to_string()),
            err => ApiError::auth_error(err.to_string()),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(_) => ApiError::not_found(err.to_string()),
            RegistryError::DuplicateSlug(_) => ApiError::Conflict {
                message: err.to_string(),
            },
            RegistryError::InvalidNode(_) => ApiError::bad_request(err.to_string()),
        }
    }
}

impl From<LocalHandlerError> for ApiError {
    fn from(err: LocalHandlerError) -> Self {
        match err {
            LocalHandlerError::BadRequest(message) => ApiError::bad_request(message),
            LocalHandlerError::NotFound(message) => ApiError::not_found(message),
            LocalHandlerError::Failed(reason) => {
                error!(reason = %reason, "Local node handler failed");
                ApiError::Internal
            }
            LocalHandlerError::Remote(err) => err.into(),
        }
    }
}

/// Remote node failures surface as-is: 502 when the node could not serve the
/// call, never a silent local fallback
impl From<CoordinatorError> for ApiError {
    fn from(err: CoordinatorError) -> Self {
        match err {
            CoordinatorError::NodeNotFound(_) => ApiError::not_found(err.to_string()),
            CoordinatorError::InvalidPlan(_) => ApiError::bad_request(err.to_string()),
            CoordinatorError::NodeUnavailable { .. } | CoordinatorError::NodeUnreachable { .. } => {
                ApiError::node_unreachable(err.to_string())
            }
        }
    }
}

/// Convert JSON errors to API errors
impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::bad_request(format!("Invalid JSON: {err}"))
    }
}

/// Result type alias for web API operations
pub type ApiResult<T> = Result<T, ApiError>;
