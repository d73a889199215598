use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::error::AppError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Serialize, Clone)]
pub enum ApiError {
    #[error("Internal server error")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable")]
    ServiceUnavailable(String),

    #[error("Too many requests: {0}")]
    TooManyRequests(String),

    #[error("Request cancelled or timed out")]
    Timeout(String),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Auth(msg) => Self::Forbidden(msg),
            AppError::NotFound(msg) => Self::NotFound(msg),
            AppError::Validation(msg) => Self::ValidationError(msg),
            AppError::Conflict { existing_id } => Self::Conflict(existing_id),
            AppError::QueueFull(pending) => {
                Self::TooManyRequests(format!("ingestion queue is full ({pending} pending)"))
            }
            AppError::Cancelled(msg) => Self::Timeout(msg),
            AppError::Database(_) => {
                // Graph store unreachable: degrade to 503 so clients can
                // fall back to offline/demo mode.
                tracing::error!("Graph database error: {:?}", err);
                Self::ServiceUnavailable("graph database unavailable".to_string())
            }
            AppError::OpenAI(_) => {
                tracing::error!("Provider error: {:?}", err);
                Self::InternalError("Internal server error".to_string())
            }
            _ => {
                tracing::error!("Internal error: {:?}", err);
                Self::InternalError("Internal server error".to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
            Self::ValidationError(message) => (StatusCode::BAD_REQUEST, message.clone()),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message.clone()),
            Self::Forbidden(message) => (StatusCode::FORBIDDEN, message.clone()),
            Self::Conflict(message) => (StatusCode::CONFLICT, message.clone()),
            Self::ServiceUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "graph database unavailable".to_string(),
            ),
            Self::TooManyRequests(message) => (StatusCode::TOO_MANY_REQUESTS, message.clone()),
            Self::Timeout(message) => (StatusCode::REQUEST_TIMEOUT, message.clone()),
        };

        let body = ErrorResponse {
            error: message,
            status: "error".to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Serialize, Debug)]
struct ErrorResponse {
    error: String,
    status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(error: ApiError) -> StatusCode {
        error.into_response().status()
    }

    #[test]
    fn test_app_error_mapping() {
        assert!(matches!(
            ApiError::from(AppError::Auth("no tenant".into())),
            ApiError::Forbidden(_)
        ));
        assert!(matches!(
            ApiError::from(AppError::NotFound("x".into())),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from(AppError::QueueFull(9)),
            ApiError::TooManyRequests(_)
        ));
        assert!(matches!(
            ApiError::from(AppError::Conflict {
                existing_id: "c1".into()
            }),
            ApiError::Conflict(_)
        ));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(status_of(ApiError::Forbidden("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(
            status_of(ApiError::ServiceUnavailable("x".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(ApiError::TooManyRequests("x".into())),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_of(ApiError::Timeout("x".into())),
            StatusCode::REQUEST_TIMEOUT
        );
    }

    #[test]
    fn test_internal_error_is_sanitized() {
        let error = ApiError::InternalError("db password incorrect".to_string());
        assert_eq!(error.to_string(), "Internal server error");
        assert_eq!(status_of(error), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
