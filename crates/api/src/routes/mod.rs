//! HTTP route handlers and the state they share.

pub mod consumption;
pub mod health;
pub mod meals;
pub mod metrics;

use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use common::AuthContext;
use ledger::{ConsumptionLedger, MealStore};
use saga::{CircuitBreaker, InventoryClient, ReconciliationSaga, SagaContext};

use crate::error::ApiError;

/// Ledger backends the API can run on.
pub trait AppLedger: ConsumptionLedger + MealStore + Clone + 'static {}

impl<T> AppLedger for T where T: ConsumptionLedger + MealStore + Clone + 'static {}

/// The inventory client shared by all requests.
pub type SharedInventory = Arc<dyn InventoryClient>;

/// Shared application state accessible from all handlers.
pub struct AppState<L: AppLedger> {
    pub ledger: L,
    pub saga: Arc<ReconciliationSaga<L, SharedInventory>>,
    pub breaker: Arc<CircuitBreaker>,
    pub saga_timeout: Duration,
}

impl<L: AppLedger> AppState<L> {
    pub fn new(
        ledger: L,
        inventory: SharedInventory,
        breaker: Arc<CircuitBreaker>,
        saga_timeout: Duration,
    ) -> Self {
        Self {
            saga: Arc::new(ReconciliationSaga::new(ledger.clone(), inventory)),
            ledger,
            breaker,
            saga_timeout,
        }
    }

    /// Saga context for one request, bounded by the configured timeout.
    pub fn saga_context(&self, auth: AuthContext) -> SagaContext {
        SagaContext::new(auth).with_timeout(self.saga_timeout)
    }
}

pub(crate) fn parse_id<T>(raw: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}
