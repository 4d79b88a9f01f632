//! Test utilities for unit testing the orchestrator, reconciler and API
//!
//! Everything runs against `MockDevice` and an in-memory store.

#[cfg(test)]
use crate::api::AppState;
#[cfg(test)]
use crate::metrics::Metrics;
#[cfg(test)]
use crate::provisioner::{ProvisionRequest, Provisioner, ProvisionerSettings};
#[cfg(test)]
use crate::reconciler::Reconciler;
#[cfg(test)]
use crate::tasks::TaskStore;
#[cfg(test)]
use allocator::{AddressRange, PortRange, RangeConfig};
#[cfg(test)]
use inventory::{
    AddressPool, DeclaredRule, InventoryStore, MemoryStore, NetworkEndpoint, PortForwardRule, StoreError,
    UsedValues,
};
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};
#[cfg(test)]
use std::net::Ipv4Addr;
#[cfg(test)]
use std::sync::Arc;
#[cfg(test)]
use std::time::Duration;
#[cfg(test)]
use tokio::sync::watch;
#[cfg(test)]
use uuid::Uuid;
#[cfg(test)]
use vyos_client::{DeviceApiError, MockDevice};
#[cfg(test)]
use vyos_commands::PortKind;

/// Controller components wired to a mock device
#[cfg(test)]
pub struct Harness {
    pub device: MockDevice,
    pub store: Arc<MemoryStore>,
    pub metrics: Metrics,
    pub provisioner: Arc<Provisioner>,
    pub reconciler: Arc<Reconciler>,
    pub shutdown: watch::Sender<bool>,
}

#[cfg(test)]
impl Harness {
    pub fn state(&self) -> AppState {
        AppState {
            provisioner: self.provisioner.clone(),
            reconciler: self.reconciler.clone(),
            tasks: Arc::new(TaskStore::new(Duration::from_secs(60), 16)),
            metrics: self.metrics.clone(),
        }
    }

    /// Store an endpoint and its rules without touching the device
    pub async fn seed(&self, endpoint: NetworkEndpoint, rules: Vec<PortForwardRule>) {
        self.store.create_endpoint(endpoint, rules).await.unwrap();
    }
}

#[cfg(test)]
pub fn test_ranges() -> RangeConfig {
    RangeConfig {
        addresses: AddressRange::new(Ipv4Addr::new(192, 168, 1, 0), 10, 250).unwrap(),
        ports: PortRange::new(2200, 2999).unwrap(),
    }
}

#[cfg(test)]
pub fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    harness_over(store.clone(), store)
}

/// Harness whose controllers see `inventory` instead of the bare store
#[cfg(test)]
pub fn harness_over(store: Arc<MemoryStore>, inventory: Arc<dyn InventoryStore>) -> Harness {
    let device = MockDevice::new();
    let metrics = Metrics::new().unwrap();
    let (shutdown, shutdown_rx) = watch::channel(false);

    let provisioner = Provisioner::new(
        inventory.clone(),
        Arc::new(device.clone()),
        ProvisionerSettings {
            ranges: test_ranges(),
            inbound_interface: "eth0".to_string(),
            compensation_attempts: 2,
            retry_delay: Duration::from_millis(1),
        },
        metrics.clone(),
        shutdown_rx.clone(),
    );
    let reconciler = Reconciler::new(
        inventory,
        Arc::new(device.clone()),
        "eth0",
        metrics.clone(),
        shutdown_rx,
    );

    Harness {
        device,
        store,
        metrics,
        provisioner: Arc::new(provisioner),
        reconciler: Arc::new(reconciler),
        shutdown,
    }
}

#[cfg(test)]
pub fn provision_request(machine_id: &str, mac_address: &str, ports: &[PortKind]) -> ProvisionRequest {
    ProvisionRequest {
        machine_id: machine_id.to_string(),
        mac_address: mac_address.to_string(),
        internal_address: None,
        hostname: None,
        pool_id: None,
        ports: ports.to_vec(),
        range_override: None,
    }
}

/// Endpoint with a fixed address, for seeding the store
#[cfg(test)]
pub fn test_endpoint(machine_id: &str, mac_address: &str, octet: u8) -> NetworkEndpoint {
    let mut endpoint = NetworkEndpoint::new(machine_id, mac_address);
    endpoint.internal_address = Some(Ipv4Addr::new(192, 168, 1, octet));
    endpoint
}

#[cfg(test)]
pub fn transport_error() -> DeviceApiError {
    DeviceApiError::Transport("connection reset by peer".to_string())
}

#[cfg(test)]
pub fn rejected(message: &str) -> DeviceApiError {
    DeviceApiError::Rejected {
        status: Some(400),
        message: message.to_string(),
    }
}

/// Store that can report endpoint or rule inserts as lost races on
/// `external_port`, as a concurrent writer would
#[cfg(test)]
pub struct RacingStore {
    inner: Arc<MemoryStore>,
    remaining: AtomicUsize,
    lost: AtomicUsize,
}

#[cfg(test)]
impl RacingStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            remaining: AtomicUsize::new(0),
            lost: AtomicUsize::new(0),
        }
    }

    /// Reject the next `races` inserts
    pub fn lose_next(&self, races: usize) {
        self.remaining.store(races, Ordering::SeqCst);
    }

    /// Inserts rejected so far
    pub fn lost(&self) -> usize {
        self.lost.load(Ordering::SeqCst)
    }

    fn race(&self) -> Result<(), StoreError> {
        let taken = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if taken.is_ok() {
            self.lost.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Conflict {
                column: "external_port",
                value: "2200".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[async_trait::async_trait]
impl InventoryStore for RacingStore {
    async fn used_values(&self) -> Result<UsedValues, StoreError> {
        self.inner.used_values().await
    }

    async fn create_endpoint(
        &self,
        endpoint: NetworkEndpoint,
        rules: Vec<PortForwardRule>,
    ) -> Result<(), StoreError> {
        self.race()?;
        self.inner.create_endpoint(endpoint, rules).await
    }

    async fn get_endpoint(&self, machine_id: &str) -> Result<Option<NetworkEndpoint>, StoreError> {
        self.inner.get_endpoint(machine_id).await
    }

    async fn list_endpoints(&self) -> Result<Vec<NetworkEndpoint>, StoreError> {
        self.inner.list_endpoints().await
    }

    async fn delete_endpoint(&self, endpoint_id: Uuid) -> Result<(), StoreError> {
        self.inner.delete_endpoint(endpoint_id).await
    }

    async fn rules_for_endpoint(&self, endpoint_id: Uuid) -> Result<Vec<PortForwardRule>, StoreError> {
        self.inner.rules_for_endpoint(endpoint_id).await
    }

    async fn insert_rule(&self, rule: PortForwardRule) -> Result<(), StoreError> {
        self.race()?;
        self.inner.insert_rule(rule).await
    }

    async fn update_rule(&self, rule: PortForwardRule) -> Result<(), StoreError> {
        self.inner.update_rule(rule).await
    }

    async fn delete_rule(&self, rule_id: Uuid) -> Result<(), StoreError> {
        self.inner.delete_rule(rule_id).await
    }

    async fn declared_rules(&self) -> Result<Vec<DeclaredRule>, StoreError> {
        self.inner.declared_rules().await
    }

    async fn create_pool(&self, pool: AddressPool) -> Result<(), StoreError> {
        self.inner.create_pool(pool).await
    }

    async fn get_pool(&self, pool_id: Uuid) -> Result<Option<AddressPool>, StoreError> {
        self.inner.get_pool(pool_id).await
    }

    async fn list_pools(&self) -> Result<Vec<AddressPool>, StoreError> {
        self.inner.list_pools().await
    }
}

#[cfg(test)]
pub fn racing_harness() -> (Harness, Arc<RacingStore>) {
    let store = Arc::new(MemoryStore::new());
    let racing = Arc::new(RacingStore::new(store.clone()));
    (harness_over(store, racing.clone()), racing)
}
