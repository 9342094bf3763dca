//! Saga operations and the steps they are made of.

use serde::{Deserialize, Serialize};

/// The consumption mutation a saga run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaOperation {
    Create,
    Update,
    Delete,
}

impl SagaOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaOperation::Create => "create",
            SagaOperation::Update => "update",
            SagaOperation::Delete => "delete",
        }
    }
}

impl std::fmt::Display for SagaOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One step of a reconciliation saga.
///
/// Linked operations run `LoadPrevious` (update and delete only), `FetchLot`,
/// `ApplyRemote` and `WriteLocal` in that order. `Compensate` only runs when
/// `WriteLocal` fails or the deadline passes after `ApplyRemote` succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaStep {
    LoadPrevious,
    FetchLot,
    ApplyRemote,
    WriteLocal,
    Compensate,
}

impl SagaStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStep::LoadPrevious => "load_previous",
            SagaStep::FetchLot => "fetch_lot",
            SagaStep::ApplyRemote => "apply_remote",
            SagaStep::WriteLocal => "write_local",
            SagaStep::Compensate => "compensate",
        }
    }

    /// Returns true if the step talks to the inventory service.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            SagaStep::FetchLot | SagaStep::ApplyRemote | SagaStep::Compensate
        )
    }
}

impl std::fmt::Display for SagaStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
