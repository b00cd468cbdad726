//! HTTP API server for the marketplace fulfillment core.
//!
//! Provides REST endpoints for products, carts and the order lifecycle,
//! with structured logging (tracing) and Prometheus metrics. Callers are
//! identified by the `x-user-id` header set by the gateway.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use cache::{CacheBackend, CacheInvalidator, InMemoryCache};
use fulfillment::{
    CartService, CatalogService, DelayQueue, FulfillmentConfig, InMemoryDelayQueue, OrderService,
};
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        // Catalog
        .route("/products", post(routes::products::create::<S>))
        .route(
            "/products/{id}",
            get(routes::products::get::<S>).patch(routes::products::update::<S>),
        )
        .route("/products/{id}/on-shelf", post(routes::products::on_shelf::<S>))
        .route("/products/{id}/off-shelf", post(routes::products::off_shelf::<S>))
        .route(
            "/internal/products/{id}/stock/decrease",
            post(routes::products::decrease_stock::<S>),
        )
        .route(
            "/internal/products/{id}/stock/release",
            post(routes::products::release_stock::<S>),
        )
        .route(
            "/internal/products/{id}/cache/invalidate",
            post(routes::products::invalidate_cache::<S>),
        )
        // Cart
        .route(
            "/cart",
            get(routes::carts::get::<S>).delete(routes::carts::clear::<S>),
        )
        .route("/cart/items", post(routes::carts::add_item::<S>))
        .route(
            "/cart/items/{line_id}",
            patch(routes::carts::update_item::<S>).delete(routes::carts::remove_item::<S>),
        )
        .route("/cart/select-all", post(routes::carts::select_all::<S>))
        .route(
            "/cart/selected",
            axum::routing::delete(routes::carts::remove_selected::<S>),
        )
        // Orders
        .route(
            "/orders",
            post(routes::orders::create::<S>).get(routes::orders::list::<S>),
        )
        .route("/orders/checkout", post(routes::orders::checkout::<S>))
        .route(
            "/orders/by-number/{number}",
            get(routes::orders::get_by_number::<S>),
        )
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/pay", post(routes::orders::pay::<S>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .route("/orders/{id}/ship", post(routes::orders::ship::<S>))
        .route("/orders/{id}/confirm", post(routes::orders::confirm::<S>))
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

/// Wires the services over a store, a delay queue and a cache backend.
pub fn create_state<S: Store + Clone + 'static>(
    store: S,
    queue: Arc<dyn DelayQueue>,
    cache: Arc<dyn CacheBackend>,
    config: &FulfillmentConfig,
) -> Arc<AppState<S>> {
    let invalidator = CacheInvalidator::new(cache.clone(), config.cache_delay_delete);
    let orders = OrderService::new(
        store.clone(),
        queue.clone(),
        invalidator.clone(),
        config.clone(),
    );
    let catalog = CatalogService::new(store.clone(), cache.clone(), invalidator.clone(), config);
    let carts = CartService::new(store, cache, invalidator.clone(), config);

    Arc::new(AppState {
        orders,
        catalog,
        carts,
        queue,
        invalidator,
    })
}

/// Creates the default application state with an in-memory queue and cache.
pub fn create_default_state<S: Store + Clone + 'static>(store: S) -> Arc<AppState<S>> {
    create_state(
        store,
        Arc::new(InMemoryDelayQueue::new()),
        Arc::new(InMemoryCache::new()),
        &FulfillmentConfig::default(),
    )
}
