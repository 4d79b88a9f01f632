//! Command generation errors

use thiserror::Error;

/// Errors raised when an entity cannot be expressed in the CLI grammar
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// A value contains characters that would break out of its quoting
    #[error("invalid value for {field}: {value:?}")]
    InvalidValue { field: &'static str, value: String },

    /// A required value is empty
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    /// A command line could not be split into tokens
    #[error("malformed command: {0}")]
    Malformed(String),
}
