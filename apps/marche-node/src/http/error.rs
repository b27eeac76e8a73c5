//! Client-facing error contract.
//!
//! Every failure leaves the node as
//! `{"error": {"code": "...", "message": "...", "details": {...}}}`.
//! Internal failures are logged here and reach the client with a generic
//! message only.

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use marche_store::Error;
use serde_json::{json, Value};
use tracing::error;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Value,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>, details: Value) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message, json!({}))
    }

    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "validation_failed",
            message,
            json!({ "field": field }),
        )
    }

    /// A path segment that does not parse, reported against `field`
    pub fn path_rejected(field: &str, rejection: PathRejection) -> Self {
        Self::validation(field, rejection.body_text())
    }

    fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "internal error",
            json!({}),
        )
    }

    fn body_rejected(status: StatusCode, message: String) -> Self {
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            Self::new(status, "payload_too_large", message, json!({}))
        } else {
            Self::validation("body", message)
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "code": self.code,
                "message": self.message,
                "details": self.details,
            }
        }));
        (self.status, body).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match &err {
            Error::Validation { field, message } => Self::validation(field, message.clone()),
            Error::Forbidden { conversation_id } => Self::new(
                StatusCode::FORBIDDEN,
                "forbidden",
                err.to_string(),
                json!({ "conversation_id": conversation_id }),
            ),
            Error::NotFound { entity, id } => Self::new(
                StatusCode::NOT_FOUND,
                "not_found",
                err.to_string(),
                json!({ "entity": entity, "id": id }),
            ),
            Error::PayloadTooLarge {
                message_type,
                size,
                max_bytes,
            } => Self::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                "payload_too_large",
                err.to_string(),
                json!({ "type": message_type, "size": size, "max_bytes": max_bytes }),
            ),
            Error::MediaUpload(_) | Error::Database(_) => {
                error!("Request failed: {}", err);
                Self::internal()
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::body_rejected(rejection.status(), rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::body_rejected(err.status(), err.body_text())
    }
}

