use chrono::{DateTime, Utc};
use common::{ConsumptionId, MealId, UserId};
use thiserror::Error;

/// Errors that can occur when reading or writing the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// No consumption record with this ID (within the requested meal, if scoped).
    #[error("Consumption not found: {0}")]
    ConsumptionNotFound(ConsumptionId),

    /// The meal does not exist.
    #[error("Meal not found: {0}")]
    MealNotFound(MealId),

    /// The user consumed nothing linked to inventory within the range.
    #[error("No consumption for user {user_id} between {start} and {end}")]
    NoConsumptionInRange {
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// A record with this ID already exists.
    #[error("Consumption already exists: {0}")]
    DuplicateId(ConsumptionId),

    /// The backing store refused the operation.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl LedgerError {
    /// True for every "nothing there" outcome, which callers report as missing
    /// data rather than as an internal failure.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LedgerError::ConsumptionNotFound(_)
                | LedgerError::MealNotFound(_)
                | LedgerError::NoConsumptionInRange { .. }
        )
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
