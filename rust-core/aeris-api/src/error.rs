// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Uniform error envelope for the HTTP surface.
//
// Every handler error flows through `ApiError`; no handler writes ad hoc
// error JSON. The stable contract for consumers is the `code` string, not
// the HTTP status. The request id is stamped into the envelope by the
// request-id middleware, which is the one place that knows it.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use aeris_workflow::WorkflowError;

/// Field-level detail for validation failures.
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input data")]
    Validation(Vec<FieldError>),

    #[error("authentication required")]
    AuthRequired,

    #[error("regulator access required")]
    Forbidden,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("CSRF token required for this operation")]
    CsrfTokenMissing,

    #[error("invalid CSRF token")]
    CsrfTokenInvalid,

    #[error("email already registered")]
    EmailExists,

    #[error("invalid admin signup key")]
    AdminKeyInvalid,

    #[error("you already have a pending admin request")]
    DuplicateRequest,

    #[error("request is not pending")]
    RequestNotPending,

    #[error("cannot demote yourself from regulator to innovator")]
    SelfDemotionForbidden,

    #[error("{0} not found")]
    NotFound(String),

    #[error("route not found")]
    RouteNotFound,

    #[error("storage temporarily unavailable")]
    Storage(String),

    #[error("an unexpected error occurred")]
    Internal(String),
}

impl ApiError {
    /// The stable error code consumers match on.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::AuthRequired => "AUTH_REQUIRED",
            ApiError::Forbidden => "FORBIDDEN",
            ApiError::InvalidCredentials => "INVALID_CREDENTIALS",
            ApiError::CsrfTokenMissing => "CSRF_TOKEN_MISSING",
            ApiError::CsrfTokenInvalid => "CSRF_TOKEN_INVALID",
            ApiError::EmailExists => "EMAIL_EXISTS",
            ApiError::AdminKeyInvalid => "ADMIN_KEY_INVALID",
            ApiError::DuplicateRequest => "DUPLICATE_REQUEST",
            ApiError::RequestNotPending => "REQUEST_NOT_PENDING",
            ApiError::SelfDemotionForbidden => "SELF_DEMOTION_FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::RouteNotFound => "ROUTE_NOT_FOUND",
            ApiError::Storage(_) => "STORAGE_ERROR",
            ApiError::Internal(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::EmailExists
            | ApiError::RequestNotPending
            | ApiError::SelfDemotionForbidden => StatusCode::BAD_REQUEST,
            ApiError::AuthRequired | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden
            | ApiError::CsrfTokenMissing
            | ApiError::CsrfTokenInvalid
            | ApiError::AdminKeyInvalid => StatusCode::FORBIDDEN,
            ApiError::DuplicateRequest => StatusCode::CONFLICT,
            ApiError::NotFound(_) | ApiError::RouteNotFound => StatusCode::NOT_FOUND,
            ApiError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::EmailExists => ApiError::EmailExists,
            WorkflowError::AdminKeyInvalid => ApiError::AdminKeyInvalid,
            WorkflowError::InvalidCredentials => ApiError::InvalidCredentials,
            WorkflowError::DuplicateRequest => ApiError::DuplicateRequest,
            WorkflowError::RequestNotPending(_) => ApiError::RequestNotPending,
            WorkflowError::RequestNotFound(_) => ApiError::NotFound("admin request".to_string()),
            WorkflowError::UserNotFound(_) => ApiError::NotFound("user".to_string()),
            WorkflowError::SelfDemotionForbidden => ApiError::SelfDemotionForbidden,
            WorkflowError::Storage(msg) => ApiError::Storage(msg),
            WorkflowError::Hashing(msg) => ApiError::Internal(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Expected adversarial/user-error traffic logs at warn; real
        // failures at error, with the internal detail that never reaches
        // the body.
        match &self {
            ApiError::Storage(detail) | ApiError::Internal(detail) => {
                error!(code = self.code(), %detail, "request failed");
            }
            other => {
                warn!(code = other.code(), "request rejected");
            }
        }

        let mut envelope = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        if let ApiError::Validation(details) = &self {
            envelope["error"]["details"] = serde_json::to_value(details)
                .unwrap_or(serde_json::Value::Null);
        }

        (status, Json(envelope)).into_response()
    }
}
