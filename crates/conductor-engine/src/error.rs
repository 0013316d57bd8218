//! Engine error types.

use conductor_core::workflow::ValidationError;

/// Errors returned by [`crate::Orchestrator`] before or around a run.
///
/// Everything that happens inside a run is reported as events and statuses
/// instead.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Invalid workflow: {0}")]
    Validation(#[from] ValidationError),

    #[error("Workflow run task aborted: {0}")]
    Aborted(String),
}
