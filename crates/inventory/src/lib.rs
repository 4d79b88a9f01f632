//! Inventory store
//!
//! The relational record the controller keeps in agreement with the router:
//! network endpoints, their port-forward rules and the address pools they
//! draw from.
//!
//! [`InventoryStore`] is the seam; [`MemoryStore`] is the transactional
//! in-memory implementation with an optional JSON snapshot on disk.

pub mod error;
pub mod memory;
pub mod models;
pub mod store;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use models::*;
pub use store::InventoryStore;
