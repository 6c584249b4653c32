//! Order submission and listing endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::SecondsFormat;
use order_store::{Order, OrderStatus, OrderStore};
use orders::{OrderService, SubmitOutcome};
use serde::Serialize;

use crate::error::ApiError;
use crate::extract::AuthUser;

/// Shared application state accessible from all handlers.
pub struct AppState<S: OrderStore> {
    pub order_service: OrderService<S>,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub number: String,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accrual: Option<f64>,
    /// RFC 3339 submission time.
    pub uploaded_at: String,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            number: order.number.to_string(),
            status: order.status,
            accrual: order.accrual,
            uploaded_at: order
                .submitted_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

// -- Handlers --

/// `POST /api/user/orders`: submit an order number given as the plain-text body.
///
/// 202 when accepted, 200 when the caller already submitted it.
#[tracing::instrument(skip(state, body))]
pub async fn submit<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    body: String,
) -> Result<StatusCode, ApiError> {
    match state.order_service.submit_order(user, &body).await? {
        SubmitOutcome::Accepted(_) => Ok(StatusCode::ACCEPTED),
        SubmitOutcome::AlreadySubmitted(_) => Ok(StatusCode::OK),
    }
}

/// `GET /api/user/orders`: list the caller's orders, oldest first.
///
/// 204 when the caller has none.
#[tracing::instrument(skip(state))]
pub async fn list<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
) -> Result<Response, ApiError> {
    let orders = state.order_service.list_orders(user).await?;
    if orders.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let body: Vec<OrderResponse> = orders.iter().map(OrderResponse::from).collect();
    Ok(Json(body).into_response())
}
