//! InventoryStore trait
//!
//! Every method is one transaction: it either commits completely or leaves
//! the store unchanged.

use crate::error::StoreError;
use crate::models::*;
use uuid::Uuid;

/// Persistence operations used by the controller
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait InventoryStore: Send + Sync {
    /// Values claimed by every row, `not_active` rows included
    async fn used_values(&self) -> Result<UsedValues, StoreError>;

    /// Insert an endpoint and its rules together
    async fn create_endpoint(
        &self,
        endpoint: NetworkEndpoint,
        rules: Vec<PortForwardRule>,
    ) -> Result<(), StoreError>;

    async fn get_endpoint(&self, machine_id: &str) -> Result<Option<NetworkEndpoint>, StoreError>;
    async fn list_endpoints(&self) -> Result<Vec<NetworkEndpoint>, StoreError>;

    /// Delete an endpoint and every rule referencing it
    async fn delete_endpoint(&self, endpoint_id: Uuid) -> Result<(), StoreError>;

    /// Rules of one endpoint, ordered by NAT rule number
    async fn rules_for_endpoint(&self, endpoint_id: Uuid) -> Result<Vec<PortForwardRule>, StoreError>;

    async fn insert_rule(&self, rule: PortForwardRule) -> Result<(), StoreError>;

    /// Replace a rule row by id
    async fn update_rule(&self, rule: PortForwardRule) -> Result<(), StoreError>;

    async fn delete_rule(&self, rule_id: Uuid) -> Result<(), StoreError>;

    /// `enabled` and `disabled` rules joined with their endpoints
    async fn declared_rules(&self) -> Result<Vec<DeclaredRule>, StoreError>;

    async fn create_pool(&self, pool: AddressPool) -> Result<(), StoreError>;
    async fn get_pool(&self, pool_id: Uuid) -> Result<Option<AddressPool>, StoreError>;
    async fn list_pools(&self) -> Result<Vec<AddressPool>, StoreError>;
}
