use std::sync::Arc;

use chrono::Utc;
use common::{AuthContext, ConsumptionId, MealId, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{ConsumptionDraft, InventoryLot, Meal, MealType};
use ledger::{InMemoryLedger, MealStore};
use saga::{
    CircuitBreaker, CircuitBreakerConfig, GuardedInventory, InMemoryInventory, InventoryError,
    ReconciliationSaga, SagaContext,
};

type BenchSaga = ReconciliationSaga<InMemoryLedger, GuardedInventory<InMemoryInventory>>;

struct Fixture {
    saga: BenchSaga,
    meal_id: MealId,
    lot: InventoryLot,
    item_id: common::ItemId,
}

fn fixture(rt: &tokio::runtime::Runtime) -> Fixture {
    let ledger = InMemoryLedger::new();
    let inventory = InMemoryInventory::new();
    // Plenty of stock so the benchmark never runs dry.
    let (item_id, lot) = inventory.stock_lot(1e12, 1e12, 1e12);
    let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::new("bench")));
    let meal = Meal::new(UserId::new("bench"), "Lunch", MealType::Lunch, Utc::now());
    rt.block_on(async { ledger.save_meal(&meal).await.unwrap() });

    Fixture {
        saga: ReconciliationSaga::new(ledger, GuardedInventory::new(inventory, breaker)),
        meal_id: meal.id,
        lot,
        item_id,
    }
}

fn ctx() -> SagaContext {
    SagaContext::new(AuthContext::User("bench".to_string()))
}

fn bench_create_linked(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let f = fixture(&rt);
    let ctx = ctx();

    c.bench_function("saga/create_linked", |b| {
        b.iter(|| {
            rt.block_on(async {
                let draft = ConsumptionDraft::new("Rice", 1.0, "cup").linked_to(f.item_id, f.lot.id);
                f.saga.create(f.meal_id, draft, &ctx).await.unwrap();
            });
        });
    });
}

fn bench_update_linked(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let f = fixture(&rt);
    let ctx = ctx();
    let draft = ConsumptionDraft::new("Rice", 1.0, "cup").linked_to(f.item_id, f.lot.id);
    let id: ConsumptionId = rt.block_on(async { f.saga.create(f.meal_id, draft.clone(), &ctx).await.unwrap().id });

    let mut quantity = 1.0;
    c.bench_function("saga/update_linked", |b| {
        b.iter(|| {
            quantity = if quantity == 1.0 { 2.0 } else { 1.0 };
            let draft = draft.clone().with_id(id).with_quantity(quantity, quantity);
            rt.block_on(async {
                f.saga.update(f.meal_id, draft, &ctx).await.unwrap();
            });
        });
    });
}

fn bench_breaker_call(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let breaker = CircuitBreaker::new(CircuitBreakerConfig::new("bench"));

    c.bench_function("saga/breaker_call", |b| {
        b.iter(|| {
            rt.block_on(async {
                breaker
                    .call(|| async { Ok::<_, InventoryError>(()) })
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_create_linked,
    bench_update_linked,
    bench_breaker_call
);
criterion_main!(benches);
