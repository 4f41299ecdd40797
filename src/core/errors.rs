use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

use crate::rag::RagError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        match err {
            RagError::Validation(msg) => ApiError::BadRequest(msg),
            RagError::PayloadTooLarge { .. } | RagError::NoDocuments(_) | RagError::Load(_) => {
                ApiError::BadRequest(err.to_string())
            }
            RagError::Forbidden => ApiError::Forbidden,
            RagError::NotFound(name) => ApiError::NotFound(format!("Collection not found: {name}")),
            RagError::Embedding(_)
            | RagError::StoreUnavailable(_)
            | RagError::Storage(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        if status.is_server_error() {
            tracing::error!(status = %status, "{}", message);
        }

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_too_large_maps_to_bad_request() {
        let err: ApiError = RagError::PayloadTooLarge {
            limit: 10,
            actual: 11,
        }
        .into();
        assert!(matches!(err, ApiError::BadRequest(_)));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn upstream_failures_map_to_internal() {
        let err: ApiError = RagError::StoreUnavailable("connection refused".into()).into();
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);

        let err: ApiError = RagError::Embedding("quota".into()).into();
        assert!(matches!(err, ApiError::Internal(_)));
    }

    #[test]
    fn forbidden_keeps_its_status() {
        let err: ApiError = RagError::Forbidden.into();
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
    }
}
