//! Integration tests for the reconciliation saga.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use common::{AuthContext, ConsumptionId, ItemId, LotId, MealId, UserId};
use domain::{ConsumptionDraft, DomainError, InventoryLot, Meal, MealType};
use ledger::{ConsumptionLedger, InMemoryLedger, LedgerError, MealStore};
use saga::{
    CircuitBreaker, CircuitBreakerConfig, GuardedInventory, InMemoryInventory, InventoryError,
    ManualClock, ReconciliationSaga, SagaContext, SagaError, SagaStep,
};

type TestSaga = ReconciliationSaga<InMemoryLedger, InMemoryInventory>;

struct TestHarness {
    saga: TestSaga,
    ledger: InMemoryLedger,
    inventory: InMemoryInventory,
    meal_id: MealId,
    item_id: ItemId,
    lot: InventoryLot,
}

impl TestHarness {
    /// A meal and a lot of 10 units priced 20 in total (2 per unit).
    async fn new() -> Self {
        let ledger = InMemoryLedger::new();
        let inventory = InMemoryInventory::new();
        let meal = Meal::new(
            UserId::new("user-1"),
            "Lunch",
            MealType::Lunch,
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        );
        ledger.save_meal(&meal).await.unwrap();
        let (item_id, lot) = inventory.stock_lot(10.0, 10.0, 20.0);

        Self {
            saga: ReconciliationSaga::new(ledger.clone(), inventory.clone()),
            ledger,
            inventory,
            meal_id: meal.id,
            item_id,
            lot,
        }
    }

    fn ctx(&self) -> SagaContext {
        SagaContext::new(AuthContext::Bearer("token".to_string()))
    }

    fn draft(&self, quantity: f64) -> ConsumptionDraft {
        ConsumptionDraft::new("Rice", quantity, "cup").linked_to(self.item_id, self.lot.id)
    }

    fn available(&self) -> f64 {
        self.inventory.available(self.lot.id).unwrap()
    }
}

#[tokio::test]
async fn test_create_update_delete_scenario() {
    let h = TestHarness::new().await;

    let created = h.saga.create(h.meal_id, h.draft(3.0), &h.ctx()).await.unwrap();
    assert_eq!(h.available(), 7.0);
    assert_eq!(created.cost, 6.0);
    assert_eq!(h.ledger.get(created.id).await.unwrap(), created);

    let updated = h
        .saga
        .update(h.meal_id, h.draft(5.0).with_id(created.id), &h.ctx())
        .await
        .unwrap();
    assert_eq!(h.available(), 5.0);
    assert_eq!(updated.cost, 10.0);
    assert_eq!(h.ledger.get(created.id).await.unwrap().quantity_used, 5.0);

    let deleted = h.saga.delete(h.meal_id, created.id, &h.ctx()).await.unwrap();
    assert_eq!(deleted.quantity_used, 5.0);
    assert_eq!(h.available(), 10.0);
    assert!(h.ledger.get(created.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_update_decrease_returns_stock() {
    let h = TestHarness::new().await;
    let created = h.saga.create(h.meal_id, h.draft(6.0), &h.ctx()).await.unwrap();

    h.saga
        .update(h.meal_id, h.draft(2.0).with_id(created.id), &h.ctx())
        .await
        .unwrap();

    assert_eq!(h.available(), 8.0);
}

#[tokio::test]
async fn test_unlinked_records_never_call_inventory() {
    let h = TestHarness::new().await;
    let draft = ConsumptionDraft::new("Homemade bread", 2.0, "slice").with_cost(1.5);

    let created = h.saga.create(h.meal_id, draft.clone(), &h.ctx()).await.unwrap();
    assert_eq!(created.cost, 1.5);
    assert!(!created.is_linked());

    h.saga
        .update(h.meal_id, draft.with_id(created.id).with_quantity(3.0, 3.0), &h.ctx())
        .await
        .unwrap();
    h.saga.delete(h.meal_id, created.id, &h.ctx()).await.unwrap();

    assert_eq!(h.inventory.total_calls(), 0);
    assert_eq!(h.ledger.record_count().await, 0);
}

#[tokio::test]
async fn test_half_linked_record_is_unlinked() {
    let h = TestHarness::new().await;
    let mut draft = ConsumptionDraft::new("Soup", 1.0, "bowl");
    draft.item_id = Some(h.item_id);

    let created = h.saga.create(h.meal_id, draft, &h.ctx()).await.unwrap();

    assert_eq!(created.cost, 0.0);
    assert_eq!(h.inventory.total_calls(), 0);
}

#[tokio::test]
async fn test_remote_failure_aborts_before_local_write() {
    let h = TestHarness::new().await;
    h.inventory
        .fail_next_apply(InventoryError::RemoteRejected("insufficient stock".into()));

    let err = h.saga.create(h.meal_id, h.draft(3.0), &h.ctx()).await.unwrap_err();

    assert!(matches!(
        err,
        SagaError::Inventory {
            step: SagaStep::ApplyRemote,
            source: InventoryError::RemoteRejected(_)
        }
    ));
    assert_eq!(h.ledger.record_count().await, 0);
    assert_eq!(h.available(), 10.0);
}

#[tokio::test]
async fn test_missing_lot_is_not_found() {
    let h = TestHarness::new().await;
    let draft = ConsumptionDraft::new("Rice", 1.0, "cup").linked_to(h.item_id, LotId::new());

    let err = h.saga.create(h.meal_id, draft, &h.ctx()).await.unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(err.step(), Some(SagaStep::FetchLot));
    assert_eq!(h.inventory.apply_calls(), 0);
}

#[tokio::test]
async fn test_local_create_failure_is_compensated() {
    let h = TestHarness::new().await;
    h.ledger.set_fail_on_create(true).await;

    let err = h.saga.create(h.meal_id, h.draft(3.0), &h.ctx()).await.unwrap_err();

    assert!(matches!(
        err,
        SagaError::Ledger {
            step: SagaStep::WriteLocal,
            source: LedgerError::Unavailable(_)
        }
    ));
    assert_eq!(h.available(), 10.0);
    assert_eq!(h.inventory.apply_calls(), 2);
    assert_eq!(h.ledger.record_count().await, 0);
}

#[tokio::test]
async fn test_local_update_failure_is_compensated() {
    let h = TestHarness::new().await;
    let created = h.saga.create(h.meal_id, h.draft(3.0), &h.ctx()).await.unwrap();
    h.ledger.set_fail_on_update(true).await;

    let err = h
        .saga
        .update(h.meal_id, h.draft(5.0).with_id(created.id), &h.ctx())
        .await
        .unwrap_err();

    assert_eq!(err.step(), Some(SagaStep::WriteLocal));
    assert_eq!(h.available(), 7.0);
    assert_eq!(h.ledger.get(created.id).await.unwrap().quantity_used, 3.0);
}

#[tokio::test]
async fn test_local_delete_failure_is_compensated() {
    let h = TestHarness::new().await;
    let created = h.saga.create(h.meal_id, h.draft(4.0), &h.ctx()).await.unwrap();
    h.ledger.set_fail_on_delete(true).await;

    let err = h.saga.delete(h.meal_id, created.id, &h.ctx()).await.unwrap_err();

    assert!(matches!(err, SagaError::Ledger { .. }));
    assert_eq!(h.available(), 6.0);
    assert!(h.ledger.get(created.id).await.is_ok());
}

#[tokio::test]
async fn test_compensation_failure_is_reported_distinctly() {
    let h = TestHarness::new().await;
    h.ledger.set_fail_on_create(true).await;
    h.inventory
        .fail_applies_after(1, InventoryError::Network("connection reset".into()));

    let err = h.saga.create(h.meal_id, h.draft(3.0), &h.ctx()).await.unwrap_err();

    match err {
        SagaError::CompensationFailed {
            link,
            delta,
            original,
            source,
        } => {
            assert_eq!(link.lot_id, h.lot.id);
            assert_eq!(delta.amount(), 3.0);
            assert!(matches!(
                *original,
                SagaError::Ledger {
                    step: SagaStep::WriteLocal,
                    ..
                }
            ));
            assert!(matches!(source, InventoryError::Network(_)));
        }
        other => panic!("expected CompensationFailed, got {other:?}"),
    }
    // Remote stock is still decremented with no local record behind it.
    assert_eq!(h.available(), 7.0);
    assert_eq!(h.ledger.record_count().await, 0);
}

#[tokio::test]
async fn test_update_without_quantity_change_skips_remote_apply() {
    let h = TestHarness::new().await;
    let created = h.saga.create(h.meal_id, h.draft(3.0), &h.ctx()).await.unwrap();
    let applies = h.inventory.apply_calls();

    // The lot got more expensive since the record was created.
    let mut repriced = h.inventory.lot(h.lot.id).unwrap();
    repriced.price = 40.0;
    h.inventory.insert_lot(h.item_id, repriced);

    let updated = h
        .saga
        .update(
            h.meal_id,
            h.draft(3.0).with_id(created.id).with_kcal(120.0),
            &h.ctx(),
        )
        .await
        .unwrap();

    assert_eq!(h.inventory.apply_calls(), applies);
    assert_eq!(updated.cost, 12.0);
    assert_eq!(updated.kcal, 120.0);
    assert_eq!(h.available(), 7.0);
}

#[tokio::test]
async fn test_update_cannot_change_link() {
    let h = TestHarness::new().await;
    let created = h.saga.create(h.meal_id, h.draft(3.0), &h.ctx()).await.unwrap();
    let (other_item, other_lot) = h.inventory.stock_lot(5.0, 5.0, 5.0);
    let calls = h.inventory.total_calls();

    let relinked = ConsumptionDraft::new("Rice", 3.0, "cup")
        .linked_to(other_item, other_lot.id)
        .with_id(created.id);
    let err = h.saga.update(h.meal_id, relinked, &h.ctx()).await.unwrap_err();
    assert!(matches!(err, SagaError::Domain(DomainError::LinkChanged(id)) if id == created.id));

    let unlinked = ConsumptionDraft::new("Rice", 3.0, "cup").with_id(created.id);
    let err = h.saga.update(h.meal_id, unlinked, &h.ctx()).await.unwrap_err();
    assert!(matches!(err, SagaError::Domain(DomainError::LinkChanged(_))));

    assert_eq!(h.inventory.total_calls(), calls);
    assert_eq!(h.available(), 7.0);
}

#[tokio::test]
async fn test_update_cannot_link_an_unlinked_record() {
    let h = TestHarness::new().await;
    let plain = ConsumptionDraft::new("Rice", 3.0, "cup");
    let created = h.saga.create(h.meal_id, plain, &h.ctx()).await.unwrap();

    let linked = h.draft(3.0).with_id(created.id);
    let err = h.saga.update(h.meal_id, linked, &h.ctx()).await.unwrap_err();

    assert!(matches!(err, SagaError::Domain(DomainError::LinkChanged(id)) if id == created.id));
    assert_eq!(h.inventory.total_calls(), 0);
    assert_eq!(h.available(), 10.0);
    assert!(!h.ledger.get(created.id).await.unwrap().is_linked());
}

#[tokio::test]
async fn test_update_requires_id_and_existing_record() {
    let h = TestHarness::new().await;

    let err = h.saga.update(h.meal_id, h.draft(1.0), &h.ctx()).await.unwrap_err();
    assert!(matches!(err, SagaError::Domain(DomainError::MissingId)));

    let err = h
        .saga
        .update(h.meal_id, h.draft(1.0).with_id(ConsumptionId::new()), &h.ctx())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.step(), Some(SagaStep::LoadPrevious));
    assert_eq!(h.inventory.total_calls(), 0);
}

#[tokio::test]
async fn test_records_are_scoped_to_their_meal() {
    let h = TestHarness::new().await;
    let created = h.saga.create(h.meal_id, h.draft(3.0), &h.ctx()).await.unwrap();
    let calls = h.inventory.total_calls();
    let other_meal = MealId::new();

    let err = h.saga.delete(other_meal, created.id, &h.ctx()).await.unwrap_err();
    assert!(err.is_not_found());

    let err = h
        .saga
        .update(other_meal, h.draft(1.0).with_id(created.id), &h.ctx())
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    assert_eq!(h.inventory.total_calls(), calls);
    assert_eq!(h.available(), 7.0);
}

#[tokio::test]
async fn test_invalid_quantity_rejected_before_any_step() {
    let h = TestHarness::new().await;

    let err = h.saga.create(h.meal_id, h.draft(-1.0), &h.ctx()).await.unwrap_err();

    assert!(matches!(
        err,
        SagaError::Domain(DomainError::InvalidQuantity { .. })
    ));
    assert_eq!(h.inventory.total_calls(), 0);
}

#[tokio::test]
async fn test_unpriced_lot_aborts_before_remote_change() {
    let h = TestHarness::new().await;
    let (item_id, empty_lot) = h.inventory.stock_lot(0.0, 0.0, 10.0);
    let draft = ConsumptionDraft::new("Rice", 1.0, "cup").linked_to(item_id, empty_lot.id);

    let err = h.saga.create(h.meal_id, draft, &h.ctx()).await.unwrap_err();

    assert!(matches!(
        err,
        SagaError::Domain(DomainError::UnpricedLot { .. })
    ));
    assert_eq!(h.inventory.apply_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_during_fetch_cancels_without_changes() {
    let h = TestHarness::new().await;
    h.inventory.set_latency(Duration::from_millis(50));
    let ctx = h.ctx().with_timeout(Duration::from_millis(10));

    let err = h.saga.create(h.meal_id, h.draft(3.0), &ctx).await.unwrap_err();

    assert!(matches!(
        err,
        SagaError::Cancelled {
            step: SagaStep::FetchLot
        }
    ));
    assert_eq!(h.inventory.apply_calls(), 0);
    assert_eq!(h.available(), 10.0);
    assert_eq!(h.ledger.record_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_after_remote_apply_compensates() {
    let h = TestHarness::new().await;
    // The in-memory service answers without yielding, so both remote steps
    // finish; the expired deadline is then seen before the local write.
    let ctx = h.ctx().with_timeout(Duration::ZERO);

    let err = h.saga.create(h.meal_id, h.draft(3.0), &ctx).await.unwrap_err();

    assert!(matches!(
        err,
        SagaError::Cancelled {
            step: SagaStep::WriteLocal
        }
    ));
    assert_eq!(h.inventory.apply_calls(), 2);
    assert_eq!(h.available(), 10.0);
    assert_eq!(h.ledger.record_count().await, 0);
}

#[tokio::test]
async fn test_concurrent_creates_on_same_lot_are_serialised() {
    let h = TestHarness::new().await;
    h.inventory.set_latency(Duration::from_millis(10));
    let ctx = h.ctx();

    let (a, b) = tokio::join!(
        h.saga.create(h.meal_id, h.draft(3.0), &ctx),
        h.saga.create(h.meal_id, h.draft(3.0), &ctx),
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(h.available(), 4.0);
    assert_eq!(h.ledger.record_count().await, 2);
}

#[tokio::test]
async fn test_open_breaker_fails_fast_without_remote_calls() {
    let ledger = InMemoryLedger::new();
    let inventory = InMemoryInventory::new();
    let meal = Meal::new(
        UserId::new("user-1"),
        "Dinner",
        MealType::Dinner,
        Utc.with_ymd_and_hms(2024, 3, 1, 19, 0, 0).unwrap(),
    );
    ledger.save_meal(&meal).await.unwrap();
    let (item_id, lot) = inventory.stock_lot(10.0, 10.0, 20.0);

    let clock = ManualClock::new();
    let breaker = Arc::new(CircuitBreaker::with_clock(
        CircuitBreakerConfig::new("grocery")
            .with_failure_threshold(2)
            .with_open_timeout(Duration::from_secs(5)),
        clock.clone(),
    ));
    let saga = ReconciliationSaga::new(
        ledger.clone(),
        GuardedInventory::new(inventory.clone(), breaker.clone()),
    );
    let ctx = SagaContext::new(AuthContext::User("user-1".to_string()));
    let draft = ConsumptionDraft::new("Rice", 1.0, "cup").linked_to(item_id, lot.id);

    inventory.set_unavailable(true);
    for _ in 0..2 {
        let err = saga.create(meal.id, draft.clone(), &ctx).await.unwrap_err();
        assert!(!err.is_circuit_open());
    }

    let err = saga.create(meal.id, draft.clone(), &ctx).await.unwrap_err();
    assert!(err.is_circuit_open());
    assert_eq!(inventory.total_calls(), 2);

    inventory.set_unavailable(false);
    clock.advance(Duration::from_secs(5));
    saga.create(meal.id, draft, &ctx).await.unwrap();

    assert_eq!(inventory.available(lot.id), Some(9.0));
    assert_eq!(ledger.record_count().await, 1);
}
