//! Rule descriptions
//!
//! Every port-forward rule carries the description `<owner> <LABEL>`, for
//! example `vm1 SSH`. The description is the only link between a rule on the
//! device and the inventory row that declared it.

use crate::port_forward::PortKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Identity of a port-forward: the owning endpoint and the service kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleKey {
    /// Machine id of the owning endpoint
    pub owner: String,
    /// Forwarded service
    pub kind: PortKind,
}

impl RuleKey {
    /// Key for `owner` and `kind`
    pub fn new(owner: impl Into<String>, kind: PortKind) -> Self {
        Self {
            owner: owner.into(),
            kind,
        }
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.owner, self.kind.label())
    }
}

/// Why a description is not a correlation key
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptionError {
    /// Nothing but whitespace
    #[error("description is empty")]
    Empty,

    /// Not exactly two whitespace-delimited tokens
    #[error("expected 2 tokens, found {0}")]
    TokenCount(usize),

    /// Second token names no port kind
    #[error("unknown port kind: {0}")]
    UnknownKind(String),
}

/// Canonical description for a rule owned by `owner`
pub fn canonical_description(owner: &str, kind: &PortKind) -> String {
    format!("{} {}", owner, kind.label())
}

/// Parse a description back into its key
///
/// Only the canonical two-token form is accepted. Anything else was not
/// written by the provisioner and is reported rather than guessed at.
pub fn parse_description(description: &str) -> Result<RuleKey, DescriptionError> {
    let tokens: Vec<&str> = description.split_whitespace().collect();
    match tokens.as_slice() {
        [] => Err(DescriptionError::Empty),
        [owner, kind] => {
            let kind = kind
                .parse::<PortKind>()
                .map_err(|_| DescriptionError::UnknownKind(kind.to_string()))?;
            Ok(RuleKey::new(*owner, kind))
        }
        other => Err(DescriptionError::TokenCount(other.len())),
    }
}
