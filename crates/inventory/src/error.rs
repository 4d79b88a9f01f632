//! Store errors

use thiserror::Error;

/// Errors returned by an `InventoryStore`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Referenced record does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint would be violated
    #[error("{column} already in use: {value}")]
    Conflict { column: &'static str, value: String },

    /// The store cannot serve requests
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Snapshot could not be read or written
    #[error("snapshot error: {0}")]
    Snapshot(String),
}

impl StoreError {
    /// Conflict on a column the allocator fills in
    pub fn is_allocation_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::Conflict {
                column: "internal_address" | "external_port" | "nat_rule_number",
                ..
            }
        )
    }
}
