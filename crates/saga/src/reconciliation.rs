//! Keeps the local consumption ledger and the remote inventory in step.
//!
//! Every linked mutation changes the remote lot first and writes the ledger
//! second. If the ledger write fails, or the caller's deadline passes in
//! between, the accepted remote delta is reversed before the error is
//! returned. Unlinked records never reach the inventory service.

use std::future::Future;
use std::time::Duration;

use common::{AuthContext, ConsumptionId, MealId};
use domain::{ConsumptionDraft, ConsumptionRecord, DomainError, InventoryLot, LotLink, StockDelta};
use ledger::{ConsumptionLedger, LedgerError};
use tokio::time::Instant;

use crate::error::{InventoryError, Result, SagaError};
use crate::inventory::InventoryClient;
use crate::locks::{LotGuard, LotLocks};
use crate::run::{Compensation, SagaRun};
use crate::step::{SagaOperation, SagaStep};

/// Per-request inputs shared by every step of a saga run.
#[derive(Debug, Clone)]
pub struct SagaContext {
    /// Credentials forwarded to the inventory service.
    pub auth: AuthContext,
    /// Remote calls and ledger reads are abandoned once this passes.
    pub deadline: Option<Instant>,
}

impl SagaContext {
    pub fn new(auth: AuthContext) -> Self {
        Self {
            auth,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Orchestrates consumption mutations against the ledger and the inventory.
pub struct ReconciliationSaga<L, I>
where
    L: ConsumptionLedger,
    I: InventoryClient,
{
    ledger: L,
    inventory: I,
    locks: Option<LotLocks>,
}

impl<L, I> ReconciliationSaga<L, I>
where
    L: ConsumptionLedger,
    I: InventoryClient,
{
    /// Creates a saga with per-lot serialisation enabled.
    pub fn new(ledger: L, inventory: I) -> Self {
        Self {
            ledger,
            inventory,
            locks: Some(LotLocks::new()),
        }
    }

    /// Lets concurrent runs on the same lot interleave.
    pub fn without_lot_locks(mut self) -> Self {
        self.locks = None;
        self
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn inventory(&self) -> &I {
        &self.inventory
    }

    /// Records a consumption in `meal_id`, taking its quantity out of the
    /// linked lot. Linked records get their cost from the lot's unit price.
    #[tracing::instrument(skip(self, draft, ctx), fields(op = "create"))]
    pub async fn create(
        &self,
        meal_id: MealId,
        draft: ConsumptionDraft,
        ctx: &SagaContext,
    ) -> Result<ConsumptionRecord> {
        observe(SagaOperation::Create, self.run_create(meal_id, draft, ctx)).await
    }

    /// Replaces a consumption, moving only the quantity difference in the lot.
    ///
    /// The record's lot link cannot change, including linking a record that
    /// was unlinked; such an edit fails with `LinkChanged` and must be
    /// expressed as a delete followed by a create.
    #[tracing::instrument(skip(self, draft, ctx), fields(op = "update", consumption_id = ?draft.id))]
    pub async fn update(
        &self,
        meal_id: MealId,
        draft: ConsumptionDraft,
        ctx: &SagaContext,
    ) -> Result<ConsumptionRecord> {
        observe(SagaOperation::Update, self.run_update(meal_id, draft, ctx)).await
    }

    /// Deletes a consumption and returns its full quantity to the lot.
    /// Returns the deleted record.
    #[tracing::instrument(skip(self, ctx), fields(op = "delete"))]
    pub async fn delete(
        &self,
        meal_id: MealId,
        id: ConsumptionId,
        ctx: &SagaContext,
    ) -> Result<ConsumptionRecord> {
        observe(SagaOperation::Delete, self.run_delete(meal_id, id, ctx)).await
    }

    async fn run_create(
        &self,
        meal_id: MealId,
        draft: ConsumptionDraft,
        ctx: &SagaContext,
    ) -> Result<ConsumptionRecord> {
        draft.validate()?;
        let mut record = ConsumptionRecord::from_draft(ConsumptionId::new(), meal_id, &draft);
        let mut run = SagaRun::start(SagaOperation::Create, record.id);

        let Some(link) = record.link() else {
            self.write_local(&mut run, ctx, self.ledger.create(&record))
                .await?;
            run.succeed();
            return Ok(record);
        };

        let _lot_guard = self.lock_lot(link).await;
        let lot = self.fetch_lot(&mut run, link, ctx).await?;
        record.cost = price(&mut run, &lot, record.quantity_used)?;
        let delta = StockDelta::consume(record.quantity_used);
        self.apply_remote(&mut run, link, lot, delta, ctx).await?;
        self.write_local(&mut run, ctx, self.ledger.create(&record))
            .await?;

        run.succeed();
        Ok(record)
    }

    /// A draft whose link differs from the stored record's is rejected
    /// before any remote call.
    async fn run_update(
        &self,
        meal_id: MealId,
        draft: ConsumptionDraft,
        ctx: &SagaContext,
    ) -> Result<ConsumptionRecord> {
        draft.validate()?;
        let id = draft.id.ok_or(DomainError::MissingId)?;
        let mut run = SagaRun::start(SagaOperation::Update, id);

        let _lot_guard = match draft.link() {
            Some(link) => self.lock_lot(link).await,
            None => None,
        };
        let previous = self.load_previous(&mut run, meal_id, id, ctx).await?;
        if previous.link() != draft.link() {
            run.fail();
            return Err(DomainError::LinkChanged(id).into());
        }

        let mut record = ConsumptionRecord::from_draft(id, meal_id, &draft);
        let Some(link) = record.link() else {
            self.write_local(&mut run, ctx, self.ledger.update(&record))
                .await?;
            run.succeed();
            return Ok(record);
        };

        let lot = self.fetch_lot(&mut run, link, ctx).await?;
        record.cost = price(&mut run, &lot, record.quantity_used)?;
        let delta = StockDelta::between(previous.quantity_used, record.quantity_used);
        if delta.is_zero() {
            tracing::debug!(lot = %link, "quantity unchanged, lot left as is");
        } else {
            self.apply_remote(&mut run, link, lot, delta, ctx).await?;
        }
        self.write_local(&mut run, ctx, self.ledger.update(&record))
            .await?;

        run.succeed();
        Ok(record)
    }

    async fn run_delete(
        &self,
        meal_id: MealId,
        id: ConsumptionId,
        ctx: &SagaContext,
    ) -> Result<ConsumptionRecord> {
        let mut run = SagaRun::start(SagaOperation::Delete, id);
        let record = self.load_previous(&mut run, meal_id, id, ctx).await?;

        let Some(link) = record.link() else {
            self.write_local(&mut run, ctx, self.ledger.delete(meal_id, id))
                .await?;
            run.succeed();
            return Ok(record);
        };

        let lot_guard = self.lock_lot(link).await;
        // Another run may have changed the quantity while we waited.
        let record = if lot_guard.is_some() {
            self.load_previous(&mut run, meal_id, id, ctx).await?
        } else {
            record
        };

        let lot = self.fetch_lot(&mut run, link, ctx).await?;
        let delta = StockDelta::restock(record.quantity_used);
        self.apply_remote(&mut run, link, lot, delta, ctx).await?;
        self.write_local(&mut run, ctx, self.ledger.delete(meal_id, id))
            .await?;

        run.succeed();
        Ok(record)
    }

    async fn lock_lot(&self, link: LotLink) -> Option<LotGuard> {
        match &self.locks {
            Some(locks) => Some(locks.acquire(link.lot_id).await),
            None => None,
        }
    }

    /// Loads the persisted record, which must belong to `meal_id`.
    async fn load_previous(
        &self,
        run: &mut SagaRun,
        meal_id: MealId,
        id: ConsumptionId,
        ctx: &SagaContext,
    ) -> Result<ConsumptionRecord> {
        let step = SagaStep::LoadPrevious;
        run.begin(step);
        let loaded = within_deadline(run, step, ctx, self.ledger.get(id))
            .await?
            .and_then(|record| {
                if record.meal_id == meal_id {
                    Ok(record)
                } else {
                    Err(LedgerError::ConsumptionNotFound(id))
                }
            });

        match loaded {
            Ok(record) => {
                run.complete(step);
                Ok(record)
            }
            Err(source) => {
                run.fail();
                Err(SagaError::Ledger { step, source })
            }
        }
    }

    async fn fetch_lot(
        &self,
        run: &mut SagaRun,
        link: LotLink,
        ctx: &SagaContext,
    ) -> Result<InventoryLot> {
        let call = self
            .inventory
            .get_lot_detail(link.item_id, link.lot_id, &ctx.auth);
        remote_step(run, SagaStep::FetchLot, ctx, call).await
    }

    /// Applies `delta` to `lot` remotely and arms its compensation.
    async fn apply_remote(
        &self,
        run: &mut SagaRun,
        link: LotLink,
        mut lot: InventoryLot,
        delta: StockDelta,
        ctx: &SagaContext,
    ) -> Result<InventoryLot> {
        lot.apply(delta);
        let call = self.inventory.apply_lot(link.item_id, &lot, &ctx.auth);
        let stored = remote_step(run, SagaStep::ApplyRemote, ctx, call).await?;

        run.arm(Compensation::reversing(link, delta));
        tracing::info!(
            lot = %link,
            %delta,
            available = stored.available_quantity,
            "remote stock updated"
        );
        Ok(stored)
    }

    /// Runs the ledger write, rolling back the remote delta if it fails or
    /// if the deadline has already passed. The write itself is never cut short.
    async fn write_local<F>(&self, run: &mut SagaRun, ctx: &SagaContext, write: F) -> Result<()>
    where
        F: Future<Output = ledger::Result<()>> + Send,
    {
        let step = SagaStep::WriteLocal;
        if ctx.is_expired() {
            let cancelled = SagaError::Cancelled { step };
            return Err(self.roll_back(run, ctx, cancelled).await);
        }

        run.begin(step);
        match write.await {
            Ok(()) => {
                run.complete(step);
                Ok(())
            }
            Err(source) => {
                let original = SagaError::Ledger { step, source };
                Err(self.roll_back(run, ctx, original).await)
            }
        }
    }

    /// Fails the run, executing its pending compensation if there is one.
    ///
    /// Returns `original` when the rollback succeeds (or none was needed) and
    /// `CompensationFailed` when it does not.
    async fn roll_back(
        &self,
        run: &mut SagaRun,
        ctx: &SagaContext,
        original: SagaError,
    ) -> SagaError {
        let Some(compensation) = run.fail() else {
            return original;
        };

        metrics::counter!("saga_compensations_total").increment(1);
        tracing::warn!(
            consumption_id = %run.consumption_id(),
            lot = %compensation.link,
            delta = %compensation.delta,
            error = %original,
            "reversing remote stock change"
        );

        match compensation.execute(&self.inventory, &ctx.auth).await {
            Ok(lot) => {
                run.compensated(true);
                tracing::info!(
                    state = %run.state(),
                    lot = %compensation.link,
                    available = lot.available_quantity,
                    "remote stock change reversed"
                );
                original
            }
            Err(source) => {
                run.compensated(false);
                metrics::counter!("saga_compensation_failed_total").increment(1);
                tracing::error!(
                    operation = %run.operation(),
                    consumption_id = %run.consumption_id(),
                    state = %run.state(),
                    item_id = %compensation.link.item_id,
                    lot_id = %compensation.link.lot_id,
                    delta = %compensation.delta,
                    error = %original,
                    compensation_error = %source,
                    "compensation failed, ledger and inventory diverged; manual reconciliation required"
                );
                SagaError::CompensationFailed {
                    link: compensation.link,
                    delta: compensation.delta,
                    original: Box::new(original),
                    source,
                }
            }
        }
    }
}

fn price(run: &mut SagaRun, lot: &InventoryLot, quantity: f64) -> Result<f64> {
    lot.cost_of(quantity).map_err(|err| {
        run.fail();
        SagaError::from(err)
    })
}

/// Awaits `call` unless the deadline passes first.
async fn within_deadline<T, F>(
    run: &mut SagaRun,
    step: SagaStep,
    ctx: &SagaContext,
    call: F,
) -> Result<T>
where
    F: Future<Output = T> + Send,
{
    let Some(deadline) = ctx.deadline else {
        return Ok(call.await);
    };
    match tokio::time::timeout_at(deadline, call).await {
        Ok(outcome) => Ok(outcome),
        Err(_) => {
            run.fail();
            if step == SagaStep::ApplyRemote {
                tracing::warn!(
                    consumption_id = %run.consumption_id(),
                    "deadline passed while applying remote stock change; its outcome is unknown"
                );
            }
            Err(SagaError::Cancelled { step })
        }
    }
}

async fn remote_step<T, F>(
    run: &mut SagaRun,
    step: SagaStep,
    ctx: &SagaContext,
    call: F,
) -> Result<T>
where
    F: Future<Output = std::result::Result<T, InventoryError>> + Send,
{
    run.begin(step);
    match within_deadline(run, step, ctx, call).await? {
        Ok(value) => {
            run.complete(step);
            Ok(value)
        }
        Err(source) => {
            run.fail();
            Err(SagaError::Inventory { step, source })
        }
    }
}

/// Records execution metrics and the outcome of one saga run.
async fn observe<T, F>(operation: SagaOperation, run: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let op = operation.as_str();
    metrics::counter!("saga_executions_total", "op" => op).increment(1);
    let started = std::time::Instant::now();

    let result = run.await;

    let duration = started.elapsed().as_secs_f64();
    metrics::histogram!("saga_duration_seconds", "op" => op).record(duration);
    match &result {
        Ok(_) => {
            metrics::counter!("saga_completed_total", "op" => op).increment(1);
            tracing::info!(duration, "saga completed");
        }
        Err(err) => {
            metrics::counter!("saga_failed_total", "op" => op).increment(1);
            // Divergence has already been reported at error level.
            if !err.is_diverged() {
                tracing::warn!(
                    step = err.step().map(|step| step.as_str()),
                    error = %err,
                    duration,
                    "saga failed"
                );
            }
        }
    }
    result
}
