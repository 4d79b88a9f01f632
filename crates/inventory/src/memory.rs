//! In-memory store
//!
//! All tables live behind one lock. A mutation runs against a copy of the
//! tables, is checked against every uniqueness and reference constraint,
//! optionally written to the snapshot file, and only then swapped in.
//! A failed step therefore leaves the store unchanged.

use crate::error::StoreError;
use crate::models::*;
use crate::store::InventoryStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Tables {
    endpoints: BTreeMap<Uuid, NetworkEndpoint>,
    rules: BTreeMap<Uuid, PortForwardRule>,
    pools: BTreeMap<Uuid, AddressPool>,
}

fn conflict(column: &'static str, value: impl ToString) -> StoreError {
    StoreError::Conflict {
        column,
        value: value.to_string(),
    }
}

impl Tables {
    /// Check every constraint over the whole table set
    fn validate(&self) -> Result<(), StoreError> {
        let mut machine_ids = HashSet::new();
        let mut macs = HashSet::new();
        let mut addresses = HashSet::new();
        for endpoint in self.endpoints.values() {
            if !machine_ids.insert(endpoint.machine_id.as_str()) {
                return Err(conflict("machine_id", &endpoint.machine_id));
            }
            if !macs.insert(endpoint.mac_address.as_str()) {
                return Err(conflict("mac_address", &endpoint.mac_address));
            }
            if let Some(address) = endpoint.internal_address {
                if !addresses.insert(address) {
                    return Err(conflict("internal_address", address));
                }
            }
            if let Some(pool_id) = endpoint.pool_id {
                if !self.pools.contains_key(&pool_id) {
                    return Err(StoreError::NotFound(format!("address pool {}", pool_id)));
                }
            }
        }

        let mut ports = HashSet::new();
        let mut nat_rules = HashSet::new();
        let mut keys = HashSet::new();
        for rule in self.rules.values() {
            if !self.endpoints.contains_key(&rule.endpoint_id) {
                return Err(StoreError::NotFound(format!("endpoint {}", rule.endpoint_id)));
            }
            if !ports.insert(rule.external_port) {
                return Err(conflict("external_port", rule.external_port));
            }
            if !nat_rules.insert(rule.nat_rule_number) {
                return Err(conflict("nat_rule_number", rule.nat_rule_number));
            }
            if !keys.insert((rule.endpoint_id, rule.kind)) {
                return Err(conflict("endpoint_kind", format!("{} {}", rule.endpoint_id, rule.kind)));
            }
        }

        let mut pool_names = HashSet::new();
        for pool in self.pools.values() {
            if !pool_names.insert(pool.name.as_str()) {
                return Err(conflict("pool_name", &pool.name));
            }
        }
        Ok(())
    }
}

/// Transactional in-memory [`InventoryStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    snapshot: Option<PathBuf>,
}

impl MemoryStore {
    /// Empty store without persistence
    pub fn new() -> Self {
        Self::default()
    }

    /// Store backed by a JSON snapshot at `path`, loaded if it exists
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let tables = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let tables: Tables = serde_json::from_slice(&bytes)
                    .map_err(|e| StoreError::Snapshot(format!("{}: {}", path.display(), e)))?;
                tables.validate()?;
                info!(
                    "Loaded inventory snapshot {} ({} endpoints, {} rules, {} pools)",
                    path.display(),
                    tables.endpoints.len(),
                    tables.rules.len(),
                    tables.pools.len()
                );
                tables
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No inventory snapshot at {}, starting empty", path.display());
                Tables::default()
            }
            Err(e) => return Err(StoreError::Snapshot(format!("{}: {}", path.display(), e))),
        };

        Ok(Self {
            tables: Mutex::new(tables),
            snapshot: Some(path),
        })
    }

    async fn write_snapshot(&self, tables: &Tables) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(tables).map_err(|e| StoreError::Snapshot(e.to_string()))?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| StoreError::Snapshot(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| StoreError::Snapshot(format!("{}: {}", path.display(), e)))?;
        debug!("Wrote inventory snapshot {}", path.display());
        Ok(())
    }

    /// Run `mutate` as one transaction
    async fn transact<T>(
        &self,
        mutate: impl FnOnce(&mut Tables) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut tables = self.tables.lock().await;
        let mut candidate = tables.clone();
        let result = mutate(&mut candidate)?;
        candidate.validate()?;
        self.write_snapshot(&candidate).await?;
        *tables = candidate;
        Ok(result)
    }
}

#[async_trait::async_trait]
impl InventoryStore for MemoryStore {
    async fn used_values(&self) -> Result<UsedValues, StoreError> {
        let tables = self.tables.lock().await;
        let mut used = UsedValues::default();
        used.addresses.extend(tables.endpoints.values().filter_map(|e| e.internal_address));
        for rule in tables.rules.values() {
            used.ports.insert(rule.external_port);
            used.nat_rules.insert(rule.nat_rule_number);
        }
        Ok(used)
    }

    async fn create_endpoint(
        &self,
        endpoint: NetworkEndpoint,
        rules: Vec<PortForwardRule>,
    ) -> Result<(), StoreError> {
        self.transact(|tables| {
            if tables.endpoints.contains_key(&endpoint.id) {
                return Err(conflict("id", endpoint.id));
            }
            for rule in rules {
                if rule.endpoint_id != endpoint.id {
                    return Err(StoreError::NotFound(format!("endpoint {}", rule.endpoint_id)));
                }
                tables.rules.insert(rule.id, rule);
            }
            tables.endpoints.insert(endpoint.id, endpoint);
            Ok(())
        })
        .await
    }

    async fn get_endpoint(&self, machine_id: &str) -> Result<Option<NetworkEndpoint>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .endpoints
            .values()
            .find(|e| e.machine_id == machine_id)
            .cloned())
    }

    async fn list_endpoints(&self) -> Result<Vec<NetworkEndpoint>, StoreError> {
        let tables = self.tables.lock().await;
        let mut endpoints: Vec<_> = tables.endpoints.values().cloned().collect();
        endpoints.sort_by(|a, b| a.machine_id.cmp(&b.machine_id));
        Ok(endpoints)
    }

    async fn delete_endpoint(&self, endpoint_id: Uuid) -> Result<(), StoreError> {
        self.transact(|tables| {
            tables
                .endpoints
                .remove(&endpoint_id)
                .ok_or_else(|| StoreError::NotFound(format!("endpoint {}", endpoint_id)))?;
            tables.rules.retain(|_, rule| rule.endpoint_id != endpoint_id);
            Ok(())
        })
        .await
    }

    async fn rules_for_endpoint(&self, endpoint_id: Uuid) -> Result<Vec<PortForwardRule>, StoreError> {
        let tables = self.tables.lock().await;
        let mut rules: Vec<_> = tables
            .rules
            .values()
            .filter(|rule| rule.endpoint_id == endpoint_id)
            .cloned()
            .collect();
        rules.sort_by_key(|rule| rule.nat_rule_number);
        Ok(rules)
    }

    async fn insert_rule(&self, rule: PortForwardRule) -> Result<(), StoreError> {
        self.transact(|tables| {
            if tables.rules.contains_key(&rule.id) {
                return Err(conflict("id", rule.id));
            }
            tables.rules.insert(rule.id, rule);
            Ok(())
        })
        .await
    }

    async fn update_rule(&self, rule: PortForwardRule) -> Result<(), StoreError> {
        self.transact(|tables| {
            let existing = tables
                .rules
                .get_mut(&rule.id)
                .ok_or_else(|| StoreError::NotFound(format!("rule {}", rule.id)))?;
            *existing = rule;
            Ok(())
        })
        .await
    }

    async fn delete_rule(&self, rule_id: Uuid) -> Result<(), StoreError> {
        self.transact(|tables| {
            tables
                .rules
                .remove(&rule_id)
                .map(|_| ())
                .ok_or_else(|| StoreError::NotFound(format!("rule {}", rule_id)))
        })
        .await
    }

    async fn declared_rules(&self) -> Result<Vec<DeclaredRule>, StoreError> {
        let tables = self.tables.lock().await;
        let mut declared: Vec<_> = tables
            .rules
            .values()
            .filter(|rule| rule.status.is_declared())
            .filter_map(|rule| {
                tables.endpoints.get(&rule.endpoint_id).map(|endpoint| DeclaredRule {
                    endpoint: endpoint.clone(),
                    rule: rule.clone(),
                })
            })
            .collect();
        declared.sort_by_key(|d| d.rule.nat_rule_number);
        Ok(declared)
    }

    async fn create_pool(&self, pool: AddressPool) -> Result<(), StoreError> {
        self.transact(|tables| {
            if tables.pools.contains_key(&pool.id) {
                return Err(conflict("id", pool.id));
            }
            tables.pools.insert(pool.id, pool);
            Ok(())
        })
        .await
    }

    async fn get_pool(&self, pool_id: Uuid) -> Result<Option<AddressPool>, StoreError> {
        Ok(self.tables.lock().await.pools.get(&pool_id).cloned())
    }

    async fn list_pools(&self) -> Result<Vec<AddressPool>, StoreError> {
        let tables = self.tables.lock().await;
        let mut pools: Vec<_> = tables.pools.values().cloned().collect();
        pools.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(pools)
    }
}
