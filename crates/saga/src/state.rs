//! Saga state machine.

/// Where a saga run is in its lifecycle.
///
/// ```text
/// Running ──┬──► Completed
///           ├──► Failed
///           └──► Compensating ──┬──► Failed
///                               └──► Diverged
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SagaState {
    /// Saga steps are being executed.
    Running,

    /// The local write failed and the remote delta is being reversed.
    Compensating,

    /// All steps completed successfully (terminal state).
    Completed,

    /// The run failed and both stores are consistent (terminal state).
    Failed,

    /// Compensation itself failed; local and remote state disagree (terminal state).
    Diverged,
}

impl SagaState {
    /// Returns true if the saga can begin compensation.
    pub fn can_compensate(&self) -> bool {
        matches!(self, SagaState::Running)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaState::Completed | SagaState::Failed | SagaState::Diverged
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Running => "running",
            SagaState::Compensating => "compensating",
            SagaState::Completed => "completed",
            SagaState::Failed => "failed",
            SagaState::Diverged => "diverged",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
