//! In-memory stand-in for the remote inventory service.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use common::{AuthContext, ItemId, LotId};
use domain::{InventoryLot, LotLink};

use super::InventoryClient;
use crate::error::InventoryError;

#[derive(Debug, Default)]
struct InventoryState {
    lots: HashMap<LotId, (ItemId, InventoryLot)>,
    get_calls: usize,
    apply_calls: usize,
    unavailable: bool,
    latency: Duration,
    get_failures: VecDeque<InventoryError>,
    apply_failures: VecDeque<InventoryError>,
    /// Applies left to succeed before every apply fails with the error.
    failing_applies: Option<(usize, InventoryError)>,
}

/// In-memory inventory service for testing and local runs.
///
/// Clones share the same lots, counters and injected faults.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventory {
    state: Arc<Mutex<InventoryState>>,
}

impl InMemoryInventory {
    /// Creates an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, InventoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores a lot under `item_id`, replacing any lot with the same ID.
    pub fn insert_lot(&self, item_id: ItemId, lot: InventoryLot) {
        self.state().lots.insert(lot.id, (item_id, lot));
    }

    /// Creates a lot for a fresh item and returns both.
    pub fn stock_lot(&self, quantity: f64, available: f64, price: f64) -> (ItemId, InventoryLot) {
        let item_id = ItemId::new();
        let lot = InventoryLot {
            id: LotId::new(),
            vendor: "in-memory".to_string(),
            quantity,
            available_quantity: available,
            unit: "unit".to_string(),
            price,
            expiration_date: None,
        };
        self.insert_lot(item_id, lot.clone());
        (item_id, lot)
    }

    /// Current state of a lot, bypassing counters and faults.
    pub fn lot(&self, lot_id: LotId) -> Option<InventoryLot> {
        self.state().lots.get(&lot_id).map(|(_, lot)| lot.clone())
    }

    /// Available quantity of a lot, bypassing counters and faults.
    pub fn available(&self, lot_id: LotId) -> Option<f64> {
        self.lot(lot_id).map(|lot| lot.available_quantity)
    }

    pub fn get_calls(&self) -> usize {
        self.state().get_calls
    }

    pub fn apply_calls(&self) -> usize {
        self.state().apply_calls
    }

    /// Total number of calls received, failed ones included.
    pub fn total_calls(&self) -> usize {
        let state = self.state();
        state.get_calls + state.apply_calls
    }

    /// Makes every call fail with a network error until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Delays every call by `latency` before it touches any lot.
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = latency;
    }

    /// Fails the next lot fetch with `error`.
    pub fn fail_next_get(&self, error: InventoryError) {
        self.state().get_failures.push_back(error);
    }

    /// Fails the next lot apply with `error`.
    pub fn fail_next_apply(&self, error: InventoryError) {
        self.state().apply_failures.push_back(error);
    }

    /// Lets `successes` applies through, then fails every later apply with `error`.
    pub fn fail_applies_after(&self, successes: usize, error: InventoryError) {
        self.state().failing_applies = Some((successes, error));
    }

    /// Removes every injected fault.
    pub fn clear_faults(&self) {
        let mut state = self.state();
        state.unavailable = false;
        state.get_failures.clear();
        state.apply_failures.clear();
        state.failing_applies = None;
    }

    fn latency(&self) -> Duration {
        self.state().latency
    }
}

#[async_trait]
impl InventoryClient for InMemoryInventory {
    async fn get_lot_detail(
        &self,
        item_id: ItemId,
        lot_id: LotId,
        _auth: &AuthContext,
    ) -> Result<InventoryLot, InventoryError> {
        let latency = self.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state();
        state.get_calls += 1;
        if state.unavailable {
            return Err(InventoryError::Network("inventory service unavailable".to_string()));
        }
        if let Some(error) = state.get_failures.pop_front() {
            return Err(error);
        }

        match state.lots.get(&lot_id) {
            Some((owner, lot)) if *owner == item_id => Ok(lot.clone()),
            _ => Err(InventoryError::NotFound(LotLink::new(item_id, lot_id))),
        }
    }

    async fn apply_lot(
        &self,
        item_id: ItemId,
        lot: &InventoryLot,
        _auth: &AuthContext,
    ) -> Result<InventoryLot, InventoryError> {
        let latency = self.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state();
        state.apply_calls += 1;
        if state.unavailable {
            return Err(InventoryError::Network("inventory service unavailable".to_string()));
        }
        if let Some(error) = state.apply_failures.pop_front() {
            return Err(error);
        }
        if let Some((remaining, error)) = state.failing_applies.as_mut() {
            if *remaining == 0 {
                return Err(error.clone());
            }
            *remaining -= 1;
        }

        match state.lots.get_mut(&lot.id) {
            Some((owner, stored)) if *owner == item_id => {
                *stored = lot.clone();
                Ok(stored.clone())
            }
            _ => Err(InventoryError::NotFound(LotLink::new(item_id, lot.id))),
        }
    }
}
