//! Device API errors

use thiserror::Error;

/// Errors that can occur when talking to the device
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceApiError {
    /// No usable answer (connect failure, timeout, truncated body)
    #[error("transport error: {0}")]
    Transport(String),

    /// The device refused the batch
    #[error("device rejected batch: {message}")]
    Rejected { status: Option<u16>, message: String },

    /// The device answered with something that is not a device response
    #[error("malformed device response: {0}")]
    MalformedResponse(String),

    /// Client could not be constructed
    #[error("device client configuration error: {0}")]
    Configuration(String),
}

impl DeviceApiError {
    /// True when the batch may have been applied despite the error
    pub fn is_indeterminate(&self) -> bool {
        matches!(self, DeviceApiError::Transport(_))
    }

    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            DeviceApiError::Transport(_) => "transport",
            DeviceApiError::Rejected { .. } => "rejected",
            DeviceApiError::MalformedResponse(_) => "malformed",
            DeviceApiError::Configuration(_) => "configuration",
        }
    }
}

impl From<reqwest::Error> for DeviceApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            DeviceApiError::Configuration(err.to_string())
        } else {
            DeviceApiError::Transport(err.to_string())
        }
    }
}
