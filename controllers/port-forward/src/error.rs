//! Controller-specific error types.

use allocator::AllocatorError;
use inventory::StoreError;
use thiserror::Error;
use vyos_client::DeviceApiError;
use vyos_commands::CommandError;

/// Errors that can occur in the port-forward controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// A configured range has no free value
    #[error("Resource exhausted: range {0} has no free value")]
    ResourceExhausted(String),

    /// The device failed or refused a batch
    #[error("Device error: {0}")]
    Device(#[from] DeviceApiError),

    /// Referenced endpoint, rule or pool does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate name, address, port or forward
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Compensation failed; store and device disagree until reconciled
    #[error("Inconsistent state: {0}")]
    InconsistentState(String),

    /// Device rules could not be removed, the endpoint was kept
    #[error("Decommission incomplete for {machine_id}: {source}")]
    DecommissionIncomplete {
        machine_id: String,
        source: DeviceApiError,
    },

    /// Shutdown interrupted the operation; its effects were compensated
    #[error("Operation cancelled")]
    Cancelled,

    /// A value cannot be expressed as a device command
    #[error("Command generation error: {0}")]
    Command(#[from] CommandError),

    /// Store failure other than a missing record or a constraint
    #[error("Store error: {0}")]
    Store(StoreError),

    /// Request is malformed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Too much work in flight
    #[error("Busy: {0}")]
    Busy(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// HTTP server or task failure
    #[error("Server error: {0}")]
    Server(String),
}

impl From<StoreError> for ControllerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ControllerError::NotFound(what),
            StoreError::Conflict { column, value } => {
                ControllerError::Conflict(format!("{} already in use: {}", column, value))
            }
            other => ControllerError::Store(other),
        }
    }
}

impl From<AllocatorError> for ControllerError {
    fn from(err: AllocatorError) -> Self {
        match err {
            AllocatorError::Exhausted { range } => ControllerError::ResourceExhausted(range),
            AllocatorError::InvalidRange(reason) => ControllerError::InvalidRequest(reason),
        }
    }
}
