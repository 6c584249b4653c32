//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use orders::OrderServiceError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// The caller is not identified.
    Unauthorized(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Order service error.
    Orders(OrderServiceError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Orders(err) => orders_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn orders_error_to_response(err: OrderServiceError) -> (StatusCode, String) {
    match &err {
        OrderServiceError::BadNumberFormat(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        OrderServiceError::InvalidNumber(_) => (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
        OrderServiceError::OwnedByAnotherUser(_) => (StatusCode::CONFLICT, err.to_string()),
        OrderServiceError::InvalidWithdrawalNumber(_) | OrderServiceError::WithdrawalExists(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
        }
        OrderServiceError::InvalidSum(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        OrderServiceError::InsufficientFunds { .. } => {
            (StatusCode::PAYMENT_REQUIRED, err.to_string())
        }
        OrderServiceError::Store(_) => {
            tracing::error!(error = %err, "order store failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            )
        }
    }
}

impl From<OrderServiceError> for ApiError {
    fn from(err: OrderServiceError) -> Self {
        ApiError::Orders(err)
    }
}
