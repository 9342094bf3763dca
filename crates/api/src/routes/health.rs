//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use saga::CircuitState;
use serde::Serialize;

use super::{AppLedger, AppState};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// State of the inventory circuit breaker.
    pub inventory: CircuitState,
}

/// GET /health: process health plus the inventory breaker state.
pub async fn check<L: AppLedger>(State(state): State<Arc<AppState<L>>>) -> Json<HealthResponse> {
    let inventory = state.breaker.state();
    let status = match inventory {
        CircuitState::Closed => "ok",
        CircuitState::Open | CircuitState::HalfOpen => "degraded",
    };
    Json(HealthResponse { status, inventory })
}
