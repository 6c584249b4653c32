//! Integration tests for the API server.

use std::sync::OnceLock;

use accrual::{InMemoryAccrualClient, PoolConfig, WorkerPool};
use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::{InMemoryOrderStore, OrderStore, OrderStoreExt};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: axum::Router,
    store: InMemoryOrderStore,
    // Keeps the pool alive; it has no workers so queued numbers stay put.
    _pool: WorkerPool<InMemoryOrderStore, InMemoryAccrualClient>,
}

fn setup() -> TestApp {
    let store = InMemoryOrderStore::new();
    let pool = WorkerPool::start(
        store.clone(),
        InMemoryAccrualClient::new(),
        PoolConfig::default().with_workers(0),
    );
    let state = api::create_state(store.clone(), pool.submitter());
    let app = api::create_app(state, get_metrics_handle());
    TestApp {
        app,
        store,
        _pool: pool,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Bytes) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body)
    }

    async fn submit(&self, user: &str, number: &str) -> StatusCode {
        let request = Request::builder()
            .method("POST")
            .uri("/api/user/orders")
            .header("content-type", "text/plain")
            .header("x-user-id", user)
            .body(Body::from(number.to_string()))
            .unwrap();
        self.send(request).await.0
    }

    async fn list(&self, user: &str) -> (StatusCode, Bytes) {
        let request = Request::builder()
            .uri("/api/user/orders")
            .header("x-user-id", user)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    async fn get(&self, user: &str, uri: &str) -> (StatusCode, Bytes) {
        let request = Request::builder()
            .uri(uri)
            .header("x-user-id", user)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    async fn withdraw(&self, user: &str, body: &str) -> StatusCode {
        let request = Request::builder()
            .method("POST")
            .uri("/api/user/balance/withdraw")
            .header("content-type", "application/json")
            .header("x-user-id", user)
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await.0
    }

    /// Marks a submitted order as processed with the given accrual.
    async fn settle(&self, number: &str, accrual: f64) {
        let mut order = self
            .store
            .require_order(number.parse().unwrap())
            .await
            .unwrap();
        order.mark_processed(accrual);
        self.store.update(&order).await.unwrap();
    }

    async fn health(&self) -> serde_json::Value {
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let (status, body) = self.send(request).await;
        assert_eq!(status, StatusCode::OK);
        serde_json::from_slice(&body).unwrap()
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();

    let json = app.health().await;

    assert_eq!(json["status"], "ok");
    assert_eq!(json["queued"], 0);
}

#[tokio::test]
async fn test_submit_new_order() {
    let app = setup();

    assert_eq!(app.submit("1", "79927398713").await, StatusCode::ACCEPTED);

    assert_eq!(app.store.order_count().await, 1);
    assert_eq!(app.health().await["queued"], 1);
}

#[tokio::test]
async fn test_resubmission_statuses() {
    let app = setup();
    assert_eq!(app.submit("1", "12345678903").await, StatusCode::ACCEPTED);

    assert_eq!(app.submit("1", "12345678903").await, StatusCode::OK);
    assert_eq!(app.submit("2", "12345678903").await, StatusCode::CONFLICT);
    assert_eq!(app.health().await["queued"], 1);
}

#[tokio::test]
async fn test_submit_rejects_bad_numbers() {
    let app = setup();

    assert_eq!(app.submit("1", "not-a-number").await, StatusCode::BAD_REQUEST);
    assert_eq!(app.submit("1", "").await, StatusCode::BAD_REQUEST);
    assert_eq!(
        app.submit("1", "79927398710").await,
        StatusCode::UNPROCESSABLE_ENTITY
    );
    assert_eq!(app.store.order_count().await, 0);
}

#[tokio::test]
async fn test_requests_without_user_are_unauthorized() {
    let app = setup();

    let request = Request::builder()
        .method("POST")
        .uri("/api/user/orders")
        .body(Body::from("79927398713"))
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(json["error"].is_string());

    assert_eq!(app.submit("alice", "79927398713").await, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/api/user/orders")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.send(request).await.0, StatusCode::UNAUTHORIZED);
    assert_eq!(app.store.order_count().await, 0);
}

#[tokio::test]
async fn test_list_empty_is_no_content() {
    let app = setup();

    let (status, body) = app.list("1").await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_list_orders() {
    let app = setup();
    app.submit("1", "79927398713").await;
    app.submit("1", "12345678903").await;
    app.submit("2", "18").await;

    let mut processed = app
        .store
        .require_order("79927398713".parse().unwrap())
        .await
        .unwrap();
    processed.mark_processed(500.0);
    app.store.update(&processed).await.unwrap();

    let (status, body) = app.list("1").await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let orders = json.as_array().unwrap();
    assert_eq!(orders.len(), 2);

    assert_eq!(orders[0]["number"], "79927398713");
    assert_eq!(orders[0]["status"], "PROCESSED");
    assert_eq!(orders[0]["accrual"], 500.0);

    assert_eq!(orders[1]["number"], "12345678903");
    assert_eq!(orders[1]["status"], "NEW");
    assert!(orders[1].get("accrual").is_none());

    let uploaded_at = orders[1]["uploaded_at"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(uploaded_at).is_ok());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();
    app.submit("1", "79927398713").await;

    let request = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let (status, _body) = app.send(request).await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_balance_and_withdrawal_flow() {
    let app = setup();
    app.submit("1", "79927398713").await;
    app.settle("79927398713", 729.98).await;

    let (status, body) = app.get("1", "/api/user/balance").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["current"], 729.98);
    assert_eq!(json["withdrawn"], 0.0);

    assert_eq!(
        app.withdraw("1", r#"{"order":"2377225624","sum":229.98}"#).await,
        StatusCode::OK
    );

    let (_, body) = app.get("1", "/api/user/balance").await;
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!((json["current"].as_f64().unwrap() - 500.0).abs() < 1e-9);
    assert_eq!(json["withdrawn"], 229.98);

    let (status, body) = app.get("1", "/api/user/withdrawals").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let withdrawals = json.as_array().unwrap();
    assert_eq!(withdrawals.len(), 1);
    assert_eq!(withdrawals[0]["order"], "2377225624");
    assert_eq!(withdrawals[0]["sum"], 229.98);
    let processed_at = withdrawals[0]["processed_at"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(processed_at).is_ok());
}

#[tokio::test]
async fn test_withdrawal_statuses() {
    let app = setup();
    app.submit("1", "79927398713").await;
    app.settle("79927398713", 100.0).await;

    assert_eq!(
        app.withdraw("1", r#"{"order":"2377225624","sum":100.5}"#).await,
        StatusCode::PAYMENT_REQUIRED
    );
    assert_eq!(
        app.withdraw("1", r#"{"order":"79927398710","sum":10}"#).await,
        StatusCode::UNPROCESSABLE_ENTITY
    );
    assert_eq!(
        app.withdraw("1", r#"{"order":"2377225624","sum":0}"#).await,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        app.withdraw("1", r#"{"order":"","sum":10}"#).await,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(app.withdraw("1", "not json").await, StatusCode::BAD_REQUEST);
    assert_eq!(
        app.withdraw("1", r#"{"sum":10}"#).await,
        StatusCode::BAD_REQUEST
    );

    assert_eq!(
        app.withdraw("1", r#"{"order":"2377225624","sum":10}"#).await,
        StatusCode::OK
    );
    assert_eq!(
        app.withdraw("1", r#"{"order":"2377225624","sum":10}"#).await,
        StatusCode::UNPROCESSABLE_ENTITY
    );
    assert_eq!(app.store.withdrawal_count().await, 1);
}

#[tokio::test]
async fn test_withdrawals_empty_and_unauthorized() {
    let app = setup();

    let (status, body) = app.get("1", "/api/user/withdrawals").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());

    let (status, body) = app.get("1", "/api/user/balance").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["current"], 0.0);

    let request = Request::builder()
        .uri("/api/user/balance")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.send(request).await.0, StatusCode::UNAUTHORIZED);
}
