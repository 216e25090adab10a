//! API error handling
//!
//! Every failure is rendered as `{ "error": code, "message": text }` with the
//! status code of the underlying [`QmsError`]. Validation failures also carry
//! the per-field messages.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use qms_auth::AuthError;
use qms_core::error::QmsError;
use serde::Serialize;
use std::collections::BTreeMap;

/// API error types
#[derive(Debug)]
pub enum ApiError {
    Service(QmsError),
    BadRequest(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Service(err) => {
                StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Service(err) => err.error_code(),
            ApiError::BadRequest(_) => "bad_request",
        }
    }
}

impl From<QmsError> for ApiError {
    fn from(err: QmsError) -> Self {
        ApiError::Service(err)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Service(err.into())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<BTreeMap<String, Vec<String>>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = ?self, "request failed");
        }

        let body = match &self {
            ApiError::Service(QmsError::Validation(errors)) => ErrorBody {
                error: self.error_code(),
                message: errors.full_messages().join(", "),
                details: Some(errors.errors.clone()),
            },
            ApiError::Service(err) => ErrorBody {
                error: self.error_code(),
                message: err.to_string(),
                details: None,
            },
            ApiError::BadRequest(msg) => ErrorBody {
                error: self.error_code(),
                message: msg.clone(),
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(QmsError::not_found("Task", 3)).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(QmsError::invalid_transition("no")).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(AuthError::TokenExpired).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::bad_request("x").error_code(), "bad_request");
    }

    #[tokio::test]
    async fn test_validation_body_lists_fields() {
        let response = ApiError::from(QmsError::invalid("title", "can't be blank")).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "validation_failed");
        assert_eq!(body["details"]["title"][0], "can't be blank");
    }
}
