//! API server entry point.

use accrual::{HttpAccrualClient, WorkerPool};
use api::config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::{InMemoryOrderStore, OrderStore, PostgresOrderStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Runs the worker pool and the HTTP server on top of `store` until shutdown.
async fn run<S: OrderStore + Clone + 'static>(
    config: Config,
    store: S,
    client: HttpAccrualClient,
    metrics_handle: PrometheusHandle,
) {
    // 1. Start the accrual workers and pick up orders left pending by a previous run
    let pool = WorkerPool::start(store.clone(), client, config.pool_config());
    if let Err(e) = pool.recover_pending().await {
        tracing::error!(error = %e, "failed to recover pending orders");
    }

    // 2. Build the application
    let state = api::create_state(store, pool.submitter());
    let app = api::create_app(state, metrics_handle);

    // 3. Serve until a shutdown signal arrives
    tracing::info!(addr = %config.run_address, "starting API server");
    let listener = tokio::net::TcpListener::bind(&config.run_address)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // 4. Stop polling; unfinished orders stay pending for the next start
    pool.shutdown().await;
    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    let config = Config::load();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Accrual service client
    let client = HttpAccrualClient::new(&config.accrual_system_address, config.accrual_timeout())
        .expect("invalid accrual service address");

    // 4. Order store
    match config.database_uri.clone() {
        Some(uri) => {
            let store = PostgresOrderStore::connect(&uri)
                .await
                .expect("failed to connect to database");
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            run(config, store, client, metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URI not set, orders are kept in memory only");
            run(config, InMemoryOrderStore::new(), client, metrics_handle).await;
        }
    }
}
