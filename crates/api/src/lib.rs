//! HTTP API for meal consumption tracking.
//!
//! Consumption writes go through the reconciliation saga so the grocery
//! service's lot quantities follow the local ledger. Logging is structured
//! (tracing) and metrics are exported for Prometheus.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch};
use ledger::InMemoryLedger;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{CircuitBreaker, GuardedInventory, HttpInventoryClient, InMemoryInventory, InventoryError};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::{AppLedger, AppState, SharedInventory};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<L: AppLedger>(state: Arc<AppState<L>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<L>))
        .route(
            "/api/meal",
            get(routes::meals::list::<L>).post(routes::meals::create::<L>),
        )
        .route(
            "/api/meal/statistics/most-consumed",
            get(routes::meals::most_consumed::<L>),
        )
        .route(
            "/api/meal/{meal_id}",
            get(routes::meals::get::<L>)
                .patch(routes::meals::update::<L>)
                .delete(routes::meals::delete::<L>),
        )
        .route(
            "/api/meal/{meal_id}/consumption",
            get(routes::consumption::list::<L>).post(routes::consumption::create::<L>),
        )
        .route(
            "/api/meal/{meal_id}/consumption/{id}",
            patch(routes::consumption::update::<L>).delete(routes::consumption::delete::<L>),
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

/// Wraps the configured inventory transport in the circuit breaker.
///
/// Without `GROCERY_BASE_URL` the in-memory inventory is used, which keeps a
/// single-process setup usable.
pub fn build_inventory(
    config: &Config,
    breaker: Arc<CircuitBreaker>,
) -> Result<SharedInventory, InventoryError> {
    let inventory: SharedInventory = match config.inventory() {
        Some(http) => {
            tracing::info!(base_url = %http.base_url, "using grocery service inventory");
            Arc::new(GuardedInventory::new(HttpInventoryClient::new(http)?, breaker))
        }
        None => {
            tracing::warn!("GROCERY_BASE_URL not set, using in-memory inventory");
            Arc::new(GuardedInventory::new(InMemoryInventory::new(), breaker))
        }
    };
    Ok(inventory)
}

/// Creates an in-memory application state.
///
/// Returns the inventory handle so callers can stock lots and inspect them.
pub fn create_default_state() -> (Arc<AppState<InMemoryLedger>>, InMemoryInventory) {
    let config = Config::default();
    let breaker = Arc::new(CircuitBreaker::new(config.breaker));
    let inventory = InMemoryInventory::new();
    let shared: SharedInventory = Arc::new(GuardedInventory::new(inventory.clone(), breaker.clone()));

    let state = Arc::new(AppState::new(
        InMemoryLedger::new(),
        shared,
        breaker,
        config.saga_timeout,
    ));
    (state, inventory)
}
