//! Circuit breaker decorator for inventory clients.

use std::sync::Arc;

use async_trait::async_trait;
use common::{AuthContext, ItemId, LotId};
use domain::InventoryLot;

use super::InventoryClient;
use crate::breaker::{BreakerError, CircuitBreaker, Clock, SystemClock};
use crate::error::InventoryError;

impl BreakerError for InventoryError {
    fn counts_as_failure(&self) -> bool {
        self.is_transient()
    }

    fn rejected(breaker: &str) -> Self {
        InventoryError::CircuitOpen {
            breaker: breaker.to_string(),
        }
    }
}

/// Routes every call of an inner client through a shared circuit breaker.
#[derive(Debug)]
pub struct GuardedInventory<I, C: Clock = SystemClock> {
    inner: I,
    breaker: Arc<CircuitBreaker<C>>,
}

impl<I, C: Clock> GuardedInventory<I, C> {
    pub fn new(inner: I, breaker: Arc<CircuitBreaker<C>>) -> Self {
        Self { inner, breaker }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker<C>> {
        &self.breaker
    }

    pub fn inner(&self) -> &I {
        &self.inner
    }
}

impl<I: Clone, C: Clock> Clone for GuardedInventory<I, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            breaker: self.breaker.clone(),
        }
    }
}

#[async_trait]
impl<I: InventoryClient, C: Clock> InventoryClient for GuardedInventory<I, C> {
    async fn get_lot_detail(
        &self,
        item_id: ItemId,
        lot_id: LotId,
        auth: &AuthContext,
    ) -> Result<InventoryLot, InventoryError> {
        self.breaker
            .call(|| self.inner.get_lot_detail(item_id, lot_id, auth))
            .await
    }

    async fn apply_lot(
        &self,
        item_id: ItemId,
        lot: &InventoryLot,
        auth: &AuthContext,
    ) -> Result<InventoryLot, InventoryError> {
        self.breaker
            .call(|| self.inner.apply_lot(item_id, lot, auth))
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::breaker::{CircuitBreakerConfig, CircuitState, ManualClock};
    use crate::inventory::InMemoryInventory;

    fn auth() -> AuthContext {
        AuthContext::User("user-1".to_string())
    }

    fn guarded(
        inventory: &InMemoryInventory,
        clock: &ManualClock,
    ) -> GuardedInventory<InMemoryInventory, ManualClock> {
        let config = CircuitBreakerConfig::new("grocery")
            .with_failure_threshold(2)
            .with_open_timeout(Duration::from_secs(5))
            .with_half_open_max_requests(1);
        let breaker = Arc::new(CircuitBreaker::with_clock(config, clock.clone()));
        GuardedInventory::new(inventory.clone(), breaker)
    }

    #[tokio::test]
    async fn test_open_breaker_skips_remote_call() {
        let inventory = InMemoryInventory::new();
        let clock = ManualClock::new();
        let client = guarded(&inventory, &clock);
        let (item_id, lot) = inventory.stock_lot(10.0, 10.0, 20.0);
        inventory.set_unavailable(true);

        for _ in 0..2 {
            let err = client.get_lot_detail(item_id, lot.id, &auth()).await.unwrap_err();
            assert!(matches!(err, InventoryError::Network(_)));
        }
        assert_eq!(client.breaker().state(), CircuitState::Open);

        inventory.set_unavailable(false);
        let err = client.get_lot_detail(item_id, lot.id, &auth()).await.unwrap_err();
        assert_eq!(
            err,
            InventoryError::CircuitOpen {
                breaker: "grocery".to_string()
            }
        );
        assert_eq!(inventory.get_calls(), 2);
    }

    #[tokio::test]
    async fn test_business_errors_do_not_trip() {
        let inventory = InMemoryInventory::new();
        let clock = ManualClock::new();
        let client = guarded(&inventory, &clock);
        let item_id = ItemId::new();

        for _ in 0..5 {
            let err = client
                .get_lot_detail(item_id, LotId::new(), &auth())
                .await
                .unwrap_err();
            assert!(matches!(err, InventoryError::NotFound(_)));
        }
        assert_eq!(client.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_recovers_after_cooldown() {
        let inventory = InMemoryInventory::new();
        let clock = ManualClock::new();
        let client = guarded(&inventory, &clock);
        let (item_id, lot) = inventory.stock_lot(10.0, 10.0, 20.0);

        inventory.set_unavailable(true);
        for _ in 0..2 {
            client.get_lot_detail(item_id, lot.id, &auth()).await.unwrap_err();
        }
        inventory.set_unavailable(false);
        clock.advance(Duration::from_secs(5));

        let fetched = client.get_lot_detail(item_id, lot.id, &auth()).await.unwrap();
        assert_eq!(fetched, lot);
        assert_eq!(client.breaker().state(), CircuitState::Closed);
    }
}
