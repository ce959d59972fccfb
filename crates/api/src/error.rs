//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use saga::SagaError;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// The request lost a status race and was not applied.
    Conflict(String),
    /// Saga execution error.
    Saga(SagaError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Saga(err) => saga_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String) {
    match &err {
        SagaError::ReservationNotFound(_) | SagaError::PropertyNotFound(_) => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        SagaError::ResourceUnavailable(_) | SagaError::CannotCancel(_) => {
            (StatusCode::CONFLICT, err.to_string())
        }
        SagaError::UpstreamUnavailable { .. } => (StatusCode::BAD_GATEWAY, err.to_string()),
        SagaError::Domain(domain_err) => match domain_err {
            DomainError::InvalidDateRange { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
            DomainError::NotReservationHolder => (StatusCode::FORBIDDEN, err.to_string()),
        },
        SagaError::Store(_) | SagaError::Serialization(_) => {
            tracing::error!(error = %err, "saga infrastructure error");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Saga(SagaError::Store(err))
    }
}
