//! Allocator errors

use thiserror::Error;

/// Errors returned by the allocation functions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocatorError {
    /// Every value of the range is already in use
    #[error("range {range} has no free value")]
    Exhausted {
        /// The exhausted range, formatted as `start-end`
        range: String,
    },

    /// Range bounds are inverted or otherwise unusable
    #[error("invalid range: {0}")]
    InvalidRange(String),
}
