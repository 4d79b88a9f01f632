//! Actions and command batches

use serde::{Deserialize, Serialize};
use std::fmt;

/// What to do with a device entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Create or replace
    Set,
    /// Remove the entity
    Delete,
    /// Remove the entity's `disable` node
    Enable,
    /// Add the entity's `disable` node
    Disable,
}

impl Action {
    /// RPC operation that carries this action's commands
    pub fn op(self) -> Op {
        match self {
            Action::Set | Action::Disable => Op::Set,
            Action::Delete | Action::Enable => Op::Delete,
        }
    }
}

/// RPC operation field of the device envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    /// Set configuration nodes
    Set,
    /// Delete configuration nodes
    Delete,
}

impl Op {
    /// Wire name of the operation
    pub fn as_str(self) -> &'static str {
        match self {
            Op::Set => "set",
            Op::Delete => "delete",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered commands submitted to the device in one RPC
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandBatch {
    /// Operation for every command in the batch
    pub op: Op,
    /// CLI commands in submission order
    pub commands: Vec<String>,
}

impl CommandBatch {
    /// Batch of `commands` under `op`
    pub fn new(op: Op, commands: Vec<String>) -> Self {
        Self { op, commands }
    }

    /// Number of commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// True when there is nothing to submit
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
