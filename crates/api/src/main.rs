//! API server entry point.

use std::sync::Arc;

use api::config::Config;
use api::routes::AppState;
use cache::InMemoryCache;
use fulfillment::{
    DelayQueue, InMemoryDelayQueue, PostgresDelayQueue, ReconciliationSweep, TimeoutConsumer,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPoolOptions;
use store::{InMemoryStore, PostgresStore, Store};
use tokio::signal;
use tokio_util::sync::CancellationToken;
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

/// Runs the HTTP server and the timeout workers until a shutdown signal.
async fn serve<S: Store + Clone + 'static>(
    state: Arc<AppState<S>>,
    config: &Config,
    metrics_handle: PrometheusHandle,
) {
    let shutdown = CancellationToken::new();

    let consumer = TimeoutConsumer::new(state.orders.clone(), state.queue.clone());
    let consumer_task = tokio::spawn(consumer.run(shutdown.child_token()));

    let sweep = ReconciliationSweep::new(state.orders.clone()).expect("invalid order timeout");
    let sweep_task = tokio::spawn(sweep.run(shutdown.child_token()));

    let app = api::create_app(state.clone(), metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // Workers finish the task in hand before exiting.
    shutdown.cancel();
    if let Err(e) = consumer_task.await {
        tracing::error!(error = %e, "timeout consumer panicked");
    }
    if let Err(e) = sweep_task.await {
        tracing::error!(error = %e, "reconciliation sweep panicked");
    }
    state.invalidator.shutdown().await;
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the store and delay queue, then serve
    let cache = Arc::new(InMemoryCache::new());
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(20)
                .connect(url)
                .await
                .expect("failed to connect to PostgreSQL");
            let store = PostgresStore::new(pool.clone());
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            let queue: Arc<dyn DelayQueue> = Arc::new(PostgresDelayQueue::new(pool));
            tracing::info!("using PostgreSQL store and delay queue");

            let state = api::create_state(store, queue, cache, &config.fulfillment);
            serve(state, &config, metrics_handle).await;
        }
        None => {
            let queue: Arc<dyn DelayQueue> = Arc::new(InMemoryDelayQueue::new());
            tracing::warn!("DATABASE_URL not set, using in-memory store");

            let state = api::create_state(InMemoryStore::new(), queue, cache, &config.fulfillment);
            serve(state, &config, metrics_handle).await;
        }
    }

    tracing::info!("server shut down gracefully");
}
