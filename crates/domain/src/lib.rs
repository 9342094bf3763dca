//! Domain model for the meal tracking system.
//!
//! This crate holds the plain data the rest of the workspace moves around:
//! - Consumption records and the drafts that create or update them
//! - Inventory lots as reported by the remote grocery service
//! - Meals and the statistics derived from their consumption
//!
//! It performs no I/O.

pub mod consumption;
pub mod error;
pub mod lot;
pub mod meal;
pub mod statistics;

pub use consumption::{ConsumptionDraft, ConsumptionRecord, LotLink};
pub use error::DomainError;
pub use lot::{InventoryLot, StockDelta};
pub use meal::{Meal, MealType};
pub use statistics::MostConsumedFood;
