//! Inventory lots owned by the remote grocery service.

use chrono::{DateTime, Utc};
use common::LotId;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A batch of an inventory item with its own available quantity and price.
///
/// This is a request-scoped copy; the grocery service owns the real record.
/// `price` is the price paid for the whole lot, so the unit price is derived
/// from it and the total quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryLot {
    pub id: LotId,
    #[serde(default)]
    pub vendor: String,
    pub quantity: f64,
    pub available_quantity: f64,
    #[serde(default)]
    pub unit: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,
}

impl InventoryLot {
    /// Price of one unit of the lot.
    pub fn unit_price(&self) -> Result<f64, DomainError> {
        if !self.quantity.is_finite() || self.quantity <= 0.0 {
            return Err(DomainError::UnpricedLot {
                lot_id: self.id,
                quantity: self.quantity,
            });
        }
        Ok(self.price / self.quantity)
    }

    /// Cost of consuming `quantity` units of this lot.
    pub fn cost_of(&self, quantity: f64) -> Result<f64, DomainError> {
        Ok(self.unit_price()? * quantity)
    }

    /// Applies a signed change to the available quantity.
    pub fn apply(&mut self, delta: StockDelta) {
        self.available_quantity += delta.amount();
    }
}

/// A signed change to a lot's available quantity.
///
/// Negative values take stock out of the lot, positive values return it.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockDelta(f64);

impl StockDelta {
    /// Stock taken out of the lot by consuming `quantity`.
    pub fn consume(quantity: f64) -> Self {
        Self(-quantity)
    }

    /// Stock given back to the lot.
    pub fn restock(quantity: f64) -> Self {
        Self(quantity)
    }

    /// Change needed when a consumption moves from `previous` to `current`.
    pub fn between(previous: f64, current: f64) -> Self {
        Self(-(current - previous))
    }

    pub fn amount(&self) -> f64 {
        self.0
    }

    /// The change that undoes this one.
    pub fn inverse(&self) -> Self {
        Self(-self.0)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0.0
    }
}

impl std::fmt::Display for StockDelta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:+}", self.0)
    }
}
