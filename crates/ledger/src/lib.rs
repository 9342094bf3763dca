//! Local persistence for meals and consumption records.
//!
//! The ledger is the system's own record of what was eaten. It never talks to
//! the remote inventory; keeping the two in step is the saga's job.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{LedgerError, Result};
pub use memory::InMemoryLedger;
pub use postgres::PostgresLedger;
pub use query::DateRange;
pub use store::{ConsumptionLedger, MealStore};
