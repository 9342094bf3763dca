//! Shared types for the meal tracking system.

pub mod auth;
pub mod types;

pub use auth::AuthContext;
pub use types::{ConsumptionId, ItemId, LotId, MealId, UserId};
