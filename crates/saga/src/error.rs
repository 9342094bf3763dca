//! Saga error types.

use domain::{DomainError, LotLink, StockDelta};
use ledger::LedgerError;
use thiserror::Error;

use crate::step::SagaStep;

/// Errors returned by an [`InventoryClient`](crate::inventory::InventoryClient).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InventoryError {
    /// The remote service has no such lot.
    #[error("Lot not found: {0}")]
    NotFound(LotLink),

    /// Transport failure, timeout or server-side error.
    #[error("Inventory service unreachable: {0}")]
    Network(String),

    /// The remote service answered with a business error.
    #[error("Inventory service rejected the request: {0}")]
    RemoteRejected(String),

    /// The circuit breaker refused the call.
    #[error("Circuit breaker '{breaker}' is open")]
    CircuitOpen { breaker: String },

    /// The response could not be decoded.
    #[error("Invalid inventory service response: {0}")]
    Decode(String),
}

impl InventoryError {
    /// Returns true if this error means the remote service is unhealthy.
    pub fn is_transient(&self) -> bool {
        matches!(self, InventoryError::Network(_))
    }
}

/// Errors that can occur while running a reconciliation saga.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The request was rejected before any step ran.
    #[error("Invalid consumption: {0}")]
    Domain(#[from] DomainError),

    /// A local ledger step failed.
    #[error("Step '{step}' failed: {source}")]
    Ledger {
        step: SagaStep,
        #[source]
        source: LedgerError,
    },

    /// A remote inventory step failed.
    #[error("Step '{step}' failed: {source}")]
    Inventory {
        step: SagaStep,
        #[source]
        source: InventoryError,
    },

    /// The caller's deadline passed during `step`.
    #[error("Deadline exceeded during step '{step}'")]
    Cancelled { step: SagaStep },

    /// The inverse delta could not be applied after a primary failure.
    /// Local and remote state have diverged.
    #[error("Compensation of {delta} on lot {link} failed ({source}) after: {original}")]
    CompensationFailed {
        link: LotLink,
        delta: StockDelta,
        original: Box<SagaError>,
        #[source]
        source: InventoryError,
    },
}

impl SagaError {
    /// The step at which the saga stopped.
    pub fn step(&self) -> Option<SagaStep> {
        match self {
            SagaError::Domain(_) => None,
            SagaError::Ledger { step, .. }
            | SagaError::Inventory { step, .. }
            | SagaError::Cancelled { step } => Some(*step),
            SagaError::CompensationFailed { .. } => Some(SagaStep::Compensate),
        }
    }

    /// Returns true if the local record or the remote lot does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            SagaError::Ledger { source, .. } => source.is_not_found(),
            SagaError::Inventory { source, .. } => {
                matches!(source, InventoryError::NotFound(_))
            }
            _ => false,
        }
    }

    /// Returns true if the breaker refused a remote call.
    pub fn is_circuit_open(&self) -> bool {
        matches!(
            self,
            SagaError::Inventory {
                source: InventoryError::CircuitOpen { .. },
                ..
            }
        )
    }

    /// Returns true if the saga left local and remote state inconsistent.
    pub fn is_diverged(&self) -> bool {
        matches!(self, SagaError::CompensationFailed { .. })
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

#[cfg(test)]
mod tests {
    use common::{ConsumptionId, ItemId, LotId};

    use super::*;

    #[test]
    fn only_network_errors_are_transient() {
        let link = LotLink::new(ItemId::new(), LotId::new());
        assert!(InventoryError::Network("reset".into()).is_transient());
        assert!(!InventoryError::NotFound(link).is_transient());
        assert!(!InventoryError::RemoteRejected("no stock".into()).is_transient());
        assert!(!InventoryError::Decode("eof".into()).is_transient());
        assert!(
            !InventoryError::CircuitOpen {
                breaker: "grocery".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn compensation_failure_keeps_original_error() {
        let link = LotLink::new(ItemId::new(), LotId::new());
        let original = SagaError::Ledger {
            step: SagaStep::WriteLocal,
            source: LedgerError::ConsumptionNotFound(ConsumptionId::new()),
        };
        let err = SagaError::CompensationFailed {
            link,
            delta: StockDelta::restock(3.0),
            original: Box::new(original),
            source: InventoryError::Network("timeout".into()),
        };

        assert!(err.is_diverged());
        assert!(!err.is_not_found());
        assert_eq!(err.step(), Some(SagaStep::Compensate));
        let message = err.to_string();
        assert!(message.contains("+3"));
        assert!(message.contains("write_local"));
    }

    #[test]
    fn circuit_open_is_distinct_from_remote_errors() {
        let open = SagaError::Inventory {
            step: SagaStep::FetchLot,
            source: InventoryError::CircuitOpen {
                breaker: "grocery".into(),
            },
        };
        let rejected = SagaError::Inventory {
            step: SagaStep::ApplyRemote,
            source: InventoryError::RemoteRejected("insufficient stock".into()),
        };
        assert!(open.is_circuit_open());
        assert!(!rejected.is_circuit_open());
    }
}
