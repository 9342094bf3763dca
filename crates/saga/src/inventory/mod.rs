//! Client for the remote inventory (grocery) service.
//!
//! [`InventoryClient`] is the seam the saga talks to. [`HttpInventoryClient`]
//! is the real transport, [`GuardedInventory`] wraps any client in a circuit
//! breaker and [`InMemoryInventory`] fakes the remote service.

pub mod guarded;
pub mod http;
pub mod memory;

use async_trait::async_trait;
use common::{AuthContext, ItemId, LotId};
use domain::InventoryLot;

use crate::error::InventoryError;

pub use guarded::GuardedInventory;
pub use http::{HttpInventoryClient, HttpInventoryConfig};
pub use memory::InMemoryInventory;

/// Reads and replaces inventory lots on the remote service.
#[async_trait]
pub trait InventoryClient: Send + Sync {
    /// Fetches the current state of a lot.
    async fn get_lot_detail(
        &self,
        item_id: ItemId,
        lot_id: LotId,
        auth: &AuthContext,
    ) -> Result<InventoryLot, InventoryError>;

    /// Replaces the lot's mutable fields with those of `lot` and returns the
    /// stored result.
    async fn apply_lot(
        &self,
        item_id: ItemId,
        lot: &InventoryLot,
        auth: &AuthContext,
    ) -> Result<InventoryLot, InventoryError>;
}

#[async_trait]
impl<T: InventoryClient + ?Sized> InventoryClient for std::sync::Arc<T> {
    async fn get_lot_detail(
        &self,
        item_id: ItemId,
        lot_id: LotId,
        auth: &AuthContext,
    ) -> Result<InventoryLot, InventoryError> {
        (**self).get_lot_detail(item_id, lot_id, auth).await
    }

    async fn apply_lot(
        &self,
        item_id: ItemId,
        lot: &InventoryLot,
        auth: &AuthContext,
    ) -> Result<InventoryLot, InventoryError> {
        (**self).apply_lot(item_id, lot, auth).await
    }
}
