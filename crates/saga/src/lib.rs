//! Reconciliation saga for meal consumption and remote inventory.
//!
//! A consumption record that references an inventory lot must be kept in
//! step with that lot's available quantity on the grocery service. The
//! [`ReconciliationSaga`] applies the remote delta first and writes the
//! ledger second; if the ledger write fails, the remote delta is reversed.
//!
//! Remote calls go through an [`InventoryClient`], normally wrapped in a
//! [`GuardedInventory`] so a failing service trips a [`CircuitBreaker`]
//! instead of stalling every saga.

pub mod breaker;
pub mod error;
pub mod inventory;
pub mod locks;
pub mod reconciliation;
pub mod run;
pub mod state;
pub mod step;

pub use breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, Clock, ManualClock, SystemClock,
};
pub use error::{InventoryError, SagaError};
pub use inventory::{
    GuardedInventory, HttpInventoryClient, HttpInventoryConfig, InMemoryInventory,
    InventoryClient,
};
pub use locks::LotLocks;
pub use reconciliation::{ReconciliationSaga, SagaContext};
pub use run::{Compensation, SagaRun};
pub use state::SagaState;
pub use step::{SagaOperation, SagaStep};
