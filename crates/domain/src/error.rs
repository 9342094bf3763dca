//! Domain error types.

use common::{ConsumptionId, LotId};
use thiserror::Error;

/// Errors raised while validating or deriving domain values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    /// A quantity was negative, NaN or infinite.
    #[error("Invalid {field}: {value}")]
    InvalidQuantity { field: &'static str, value: f64 },

    /// The lot has no total quantity, so no unit price can be derived.
    #[error("Lot {lot_id} cannot be priced: total quantity is {quantity}")]
    UnpricedLot { lot_id: LotId, quantity: f64 },

    /// An update tried to move a consumption to a different lot.
    #[error("Consumption {0} cannot change its inventory link; delete and recreate it instead")]
    LinkChanged(ConsumptionId),

    /// An update was issued without the target record ID.
    #[error("Consumption ID is required for updates")]
    MissingId,

    /// Unknown meal type string.
    #[error("Invalid meal type: {0}")]
    InvalidMealType(String),
}
