//! HTTP API server for the cashback ledger.
//!
//! Accepts order numbers from authenticated users, lists their orders with
//! the statuses maintained by the accrual worker pool, serves balances and
//! withdrawals, and exposes health and Prometheus metrics endpoints.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;

use std::sync::Arc;

use accrual::Submitter;
use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::OrderStore;
use orders::OrderService;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: OrderStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route(
            "/api/user/orders",
            post(routes::orders::submit::<S>).get(routes::orders::list::<S>),
        )
        .route("/api/user/balance", get(routes::balance::get::<S>))
        .route(
            "/api/user/balance/withdraw",
            post(routes::balance::withdraw::<S>),
        )
        .route(
            "/api/user/withdrawals",
            get(routes::balance::withdrawals::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state around a store and the accrual pool's submitter.
pub fn create_state<S: OrderStore>(store: S, submitter: Submitter) -> Arc<AppState<S>> {
    Arc::new(AppState {
        order_service: OrderService::new(store, submitter),
    })
}
