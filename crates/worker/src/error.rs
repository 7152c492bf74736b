//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ramp_store::RampStoreError;
use saga::SagaError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// The worker is not configured to serve this request.
    Unavailable(String),
    /// Record store error.
    Store(RampStoreError),
    /// Saga execution error.
    Saga(SagaError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Store(err) => store_error_to_response(err),
            ApiError::Saga(err) => saga_error_to_response(err),
        };

        if status.is_server_error() {
            tracing::error!(error = %message, "internal server error");
        }
        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn store_error_to_response(err: RampStoreError) -> (StatusCode, String) {
    match &err {
        RampStoreError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        RampStoreError::ConcurrencyConflict { .. } | RampStoreError::AlreadyExists(_) => {
            (StatusCode::CONFLICT, err.to_string())
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String) {
    match err {
        SagaError::RampNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        SagaError::Store(store_err) => store_error_to_response(store_err),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

impl From<RampStoreError> for ApiError {
    fn from(err: RampStoreError) -> Self {
        ApiError::Store(err)
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::RampId;

    #[test]
    fn test_status_mapping() {
        let id = RampId::new();
        let cases = [
            (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (
                ApiError::Unavailable("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ApiError::Store(RampStoreError::NotFound(id)),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::Store(RampStoreError::ConcurrencyConflict {
                    ramp_id: id,
                    expected: 1,
                    actual: 2,
                }),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::Saga(SagaError::RampNotFound(id)),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::Saga(SagaError::NoHandler(domain::RampPhase::NablaSwap)),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
