//! DeviceGateway trait for mocking
//!
//! The concrete [`VyosClient`](crate::VyosClient) implements this trait, and
//! tests use [`MockDevice`](crate::mock::MockDevice) behind the `test-util`
//! feature.

use crate::error::DeviceApiError;
use crate::models::DeviceRule;
use vyos_commands::CommandBatch;

/// Operations against the router
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait DeviceGateway: Send + Sync {
    /// Base URL of the device, for logging
    fn base_url(&self) -> &str;

    /// Apply one batch as a single RPC
    ///
    /// An empty batch is a no-op and makes no call.
    async fn apply(&self, batch: &CommandBatch) -> Result<(), DeviceApiError>;

    /// Read every destination NAT rule the device currently holds
    async fn fetch_nat_rules(&self) -> Result<Vec<DeviceRule>, DeviceApiError>;
}
