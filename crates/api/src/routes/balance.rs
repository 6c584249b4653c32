//! Balance, withdrawal and withdrawal history endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::SecondsFormat;
use order_store::{Balance, OrderStore, Withdrawal};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::extract::AuthUser;
use crate::routes::orders::AppState;

// -- Request/Response types --

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub order: String,
    pub sum: f64,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub current: f64,
    pub withdrawn: f64,
}

impl From<Balance> for BalanceResponse {
    fn from(balance: Balance) -> Self {
        Self {
            current: balance.current,
            withdrawn: balance.withdrawn,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WithdrawalResponse {
    pub order: String,
    pub sum: f64,
    /// RFC 3339 processing time.
    pub processed_at: String,
}

impl From<&Withdrawal> for WithdrawalResponse {
    fn from(withdrawal: &Withdrawal) -> Self {
        Self {
            order: withdrawal.number.to_string(),
            sum: withdrawal.sum,
            processed_at: withdrawal
                .processed_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

// -- Handlers --

/// `GET /api/user/balance`
#[tracing::instrument(skip(state))]
pub async fn get<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.order_service.balance(user).await?;
    Ok(Json(balance.into()))
}

/// `POST /api/user/balance/withdraw`: spend cashback against an order number.
///
/// 402 when the balance does not cover the sum, 422 for a bad or reused number.
#[tracing::instrument(skip(state, payload))]
pub async fn withdraw<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    payload: Result<Json<WithdrawRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if request.order.trim().is_empty() {
        return Err(ApiError::BadRequest("order number is required".to_string()));
    }

    state
        .order_service
        .withdraw(user, &request.order, request.sum)
        .await?;
    Ok(StatusCode::OK)
}

/// `GET /api/user/withdrawals`: the caller's withdrawals, oldest first.
///
/// 204 when there are none.
#[tracing::instrument(skip(state))]
pub async fn withdrawals<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
) -> Result<Response, ApiError> {
    let withdrawals = state.order_service.list_withdrawals(user).await?;
    if withdrawals.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let body: Vec<WithdrawalResponse> = withdrawals.iter().map(WithdrawalResponse::from).collect();
    Ok(Json(body).into_response())
}
