//! HTTP mapping for lifecycle errors.
//!
//! Every error body is `{"error": <code>, "message": <text>}`. A failed
//! notification also carries the committed `order`, since the status change
//! itself went through.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;

use crate::lifecycle::LifecycleError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("{message}")]
    BadRequest { code: &'static str, message: String },
}

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            code,
            message: message.into(),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Lifecycle(e) => e.code(),
            ApiError::BadRequest { code, .. } => code,
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Lifecycle(e) => match e {
                LifecycleError::Validation(_) => StatusCode::BAD_REQUEST,
                LifecycleError::NotFound(_) => StatusCode::NOT_FOUND,
                LifecycleError::Conflict(_) => StatusCode::INTERNAL_SERVER_ERROR,
                LifecycleError::Store(_) | LifecycleError::Notification { .. } => StatusCode::BAD_GATEWAY,
                LifecycleError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        }

        let body = match self {
            ApiError::Lifecycle(LifecycleError::Notification { order, .. }) => json!({
                "error": self.code(),
                "message": self.to_string(),
                "order": order,
            }),
            _ => json!({
                "error": self.code(),
                "message": self.to_string(),
            }),
        };

        HttpResponse::build(status).json(body)
    }
}
