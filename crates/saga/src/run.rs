//! Bookkeeping for a single saga run.

use common::{AuthContext, ConsumptionId};
use domain::{InventoryLot, LotLink, StockDelta};

use crate::error::InventoryError;
use crate::inventory::InventoryClient;
use crate::state::SagaState;
use crate::step::{SagaOperation, SagaStep};

/// The remote write that undoes an accepted stock delta.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Compensation {
    pub link: LotLink,
    /// Delta to apply, already inverted.
    pub delta: StockDelta,
}

impl Compensation {
    /// Compensation for a delta the remote service has accepted.
    pub fn reversing(link: LotLink, applied: StockDelta) -> Self {
        Self {
            link,
            delta: applied.inverse(),
        }
    }

    /// Re-reads the lot and applies the inverse delta to its current state.
    pub async fn execute<I>(
        &self,
        inventory: &I,
        auth: &AuthContext,
    ) -> Result<InventoryLot, InventoryError>
    where
        I: InventoryClient + ?Sized,
    {
        let mut lot = inventory
            .get_lot_detail(self.link.item_id, self.link.lot_id, auth)
            .await?;
        lot.apply(self.delta);
        inventory.apply_lot(self.link.item_id, &lot, auth).await
    }
}

/// Progress of one create, update or delete saga.
#[derive(Debug, Clone)]
pub struct SagaRun {
    operation: SagaOperation,
    consumption_id: ConsumptionId,
    state: SagaState,
    current: Option<SagaStep>,
    completed: Vec<SagaStep>,
    compensation: Option<Compensation>,
}

impl SagaRun {
    /// Creates a run that is already `Running`.
    pub fn start(operation: SagaOperation, consumption_id: ConsumptionId) -> Self {
        Self {
            operation,
            consumption_id,
            state: SagaState::Running,
            current: None,
            completed: Vec::new(),
            compensation: None,
        }
    }

    pub fn operation(&self) -> SagaOperation {
        self.operation
    }

    pub fn consumption_id(&self) -> ConsumptionId {
        self.consumption_id
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    pub fn current_step(&self) -> Option<SagaStep> {
        self.current
    }

    pub fn completed_steps(&self) -> &[SagaStep] {
        &self.completed
    }

    /// The pending rollback, if a remote delta has been accepted.
    pub fn compensation(&self) -> Option<Compensation> {
        self.compensation
    }

    pub fn begin(&mut self, step: SagaStep) {
        tracing::debug!(
            operation = %self.operation,
            consumption_id = %self.consumption_id,
            %step,
            "saga step started"
        );
        self.current = Some(step);
    }

    pub fn complete(&mut self, step: SagaStep) {
        self.completed.push(step);
        self.current = None;
    }

    /// Records that the remote service accepted a delta that may need undoing.
    pub fn arm(&mut self, compensation: Compensation) {
        self.compensation = Some(compensation);
    }

    pub fn succeed(&mut self) {
        self.state = SagaState::Completed;
        self.compensation = None;
    }

    /// Fails the run. Returns the compensation to execute, if any, in which
    /// case the run moves to `Compensating` instead of `Failed`.
    pub fn fail(&mut self) -> Option<Compensation> {
        match self.compensation.take() {
            Some(compensation) if self.state.can_compensate() => {
                self.state = SagaState::Compensating;
                self.current = Some(SagaStep::Compensate);
                Some(compensation)
            }
            _ => {
                self.state = SagaState::Failed;
                None
            }
        }
    }

    /// Settles a compensating run: `Failed` when the rollback applied,
    /// `Diverged` when it did not.
    pub fn compensated(&mut self, rolled_back: bool) {
        if rolled_back {
            self.complete(SagaStep::Compensate);
            self.state = SagaState::Failed;
        } else {
            self.current = None;
            self.state = SagaState::Diverged;
        }
    }
}
