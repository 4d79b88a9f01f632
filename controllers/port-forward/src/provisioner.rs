//! Provisioning orchestrator
//!
//! Composes allocation, persistence and device calls into one logical
//! operation that ends either committed or rolled back.
//!
//! Provisioning runs allocate, persist, then apply. Rows are written before
//! any device call; if a device call then fails (or shutdown interrupts the
//! operation) the rules already applied are deleted again and the rows are
//! removed. A rule whose own call failed indeterminately is deleted too, since
//! the device may have applied it. When compensation itself fails the caller
//! gets [`ControllerError::InconsistentState`] and the next reconciliation
//! pass removes whatever was left on the device.
//!
//! Decommissioning runs in reverse: device rules first, rows last. A device
//! failure leaves the endpoint untouched.
//!
//! Device batches of one operation are applied strictly in sequence, and the
//! allocation lock is never held across a device call.

use crate::backoff::FibonacciBackoff;
use crate::error::ControllerError;
use crate::metrics::Metrics;
use allocator::{allocate_address, allocate_nat_rule, allocate_port, RangeConfig, RangeOverride};
use inventory::{
    AddressPool, InventoryStore, NetworkEndpoint, PortForwardRule, RuleStatus, StoreError,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vyos_client::{DeviceApiError, DeviceGateway};
use vyos_commands::dhcp::validate_mac;
use vyos_commands::port_forward::delete_rule;
use vyos_commands::{generate, Action, CommandBatch, DeviceEntity, PortForward, PortKind, Protocol, RuleKey};

/// Re-scans after a uniqueness conflict on an allocated column
pub(crate) const ALLOCATION_ATTEMPTS: usize = 3;

/// Body of `POST /v1/endpoints`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionRequest {
    pub machine_id: String,
    pub mac_address: String,
    #[serde(default)]
    pub internal_address: Option<Ipv4Addr>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub pool_id: Option<Uuid>,
    #[serde(default)]
    pub ports: Vec<PortKind>,
    #[serde(default)]
    pub range_override: Option<RangeOverride>,
}

/// Result of a committed provision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionResponse {
    pub machine_id: String,
    pub internal_address: Ipv4Addr,
    pub ports: BTreeMap<PortKind, u16>,
    /// Lowest NAT rule number claimed, absent when no port was forwarded
    pub nat_rule_base: Option<u32>,
    pub status: &'static str,
}

/// Result of a decommission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecommissionResponse {
    pub machine_id: String,
    pub deleted_rules: Vec<u32>,
}

/// Optional attributes of a single forward
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortForwardOptions {
    #[serde(default)]
    pub protocol: Option<Protocol>,
    #[serde(default)]
    pub source_address: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub range_override: Option<RangeOverride>,
}

/// Body of `POST /v1/pools`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePoolRequest {
    pub name: String,
    pub base: Ipv4Addr,
    pub start_octet: u8,
    pub end_octet: u8,
    #[serde(default)]
    pub description: Option<String>,
}

/// An endpoint with every rule it owns
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointView {
    #[serde(flatten)]
    pub endpoint: NetworkEndpoint,
    pub rules: Vec<PortForwardRule>,
}

/// Tunables of the orchestrator
#[derive(Debug, Clone)]
pub struct ProvisionerSettings {
    pub ranges: RangeConfig,
    pub inbound_interface: String,
    pub compensation_attempts: u32,
    /// First delay between compensation attempts
    pub retry_delay: Duration,
}

/// The device rule a row declares, or `None` while the endpoint has no address
pub(crate) fn desired_port_forward(
    endpoint: &NetworkEndpoint,
    rule: &PortForwardRule,
    inbound_interface: &str,
) -> Option<PortForward> {
    Some(PortForward {
        rule_number: rule.nat_rule_number,
        description: rule.description_for(&endpoint.machine_id),
        inbound_interface: inbound_interface.to_string(),
        external_port: rule.external_port,
        protocol: rule.protocol,
        source_address: rule.source_address.clone(),
        translation_address: endpoint.internal_address?,
        translation_port: rule.kind.translation_port(),
        disabled: rule.status == RuleStatus::Disabled,
    })
}

fn validate_machine_id(machine_id: &str) -> Result<(), ControllerError> {
    // The machine id is the first token of every rule description
    let valid = !machine_id.is_empty()
        && machine_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(ControllerError::InvalidRequest(format!("invalid machine id: {:?}", machine_id)))
    }
}

/// Provisioning orchestrator
pub struct Provisioner {
    store: Arc<dyn InventoryStore>,
    device: Arc<dyn DeviceGateway>,
    settings: ProvisionerSettings,
    metrics: Metrics,
    /// Serializes scan-then-claim; never held across a device call
    allocation: Mutex<()>,
    shutdown: watch::Receiver<bool>,
}

impl Provisioner {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        device: Arc<dyn DeviceGateway>,
        settings: ProvisionerSettings,
        metrics: Metrics,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            device,
            settings,
            metrics,
            allocation: Mutex::new(()),
            shutdown,
        }
    }

    fn check_cancelled(&self) -> Result<(), ControllerError> {
        if *self.shutdown.borrow() {
            return Err(ControllerError::Cancelled);
        }
        Ok(())
    }

    async fn endpoint(&self, machine_id: &str) -> Result<NetworkEndpoint, ControllerError> {
        self.store
            .get_endpoint(machine_id)
            .await?
            .ok_or_else(|| ControllerError::NotFound(format!("endpoint {}", machine_id)))
    }

    async fn rule(&self, endpoint: &NetworkEndpoint, kind: PortKind) -> Result<Option<PortForwardRule>, ControllerError> {
        Ok(self
            .store
            .rules_for_endpoint(endpoint.id)
            .await?
            .into_iter()
            .find(|rule| rule.kind == kind))
    }

    fn port_forward(&self, endpoint: &NetworkEndpoint, rule: &PortForwardRule) -> Result<PortForward, ControllerError> {
        desired_port_forward(endpoint, rule, &self.settings.inbound_interface).ok_or_else(|| {
            ControllerError::InvalidRequest(format!("endpoint {} has no internal address", endpoint.machine_id))
        })
    }

    fn batch(&self, endpoint: &NetworkEndpoint, rule: &PortForwardRule, action: Action) -> Result<CommandBatch, ControllerError> {
        let entity = DeviceEntity::PortForward(self.port_forward(endpoint, rule)?);
        Ok(generate(&entity, action)?)
    }

    async fn apply(&self, batch: &CommandBatch) -> Result<(), DeviceApiError> {
        self.device.apply(batch).await.inspect_err(|e| self.metrics.device_error(e))
    }

    /// Provision an endpoint and forward its requested ports
    pub async fn provision(&self, request: ProvisionRequest) -> Result<ProvisionResponse, ControllerError> {
        let result = self.provision_inner(request).await;
        self.record("provision", &result);
        result
    }

    async fn provision_inner(&self, request: ProvisionRequest) -> Result<ProvisionResponse, ControllerError> {
        validate_machine_id(&request.machine_id)?;
        validate_mac(&request.mac_address).map_err(|e| ControllerError::InvalidRequest(e.to_string()))?;
        let kinds: BTreeSet<PortKind> = request.ports.iter().copied().collect();
        if kinds.len() != request.ports.len() {
            return Err(ControllerError::InvalidRequest("duplicate port kind".to_string()));
        }
        if self.store.get_endpoint(&request.machine_id).await?.is_some() {
            return Err(ControllerError::Conflict(format!("endpoint {} already exists", request.machine_id)));
        }

        let mut ranges = self.settings.ranges.resolve(request.range_override.as_ref())?;
        if let Some(pool_id) = request.pool_id {
            let pool = self
                .store
                .get_pool(pool_id)
                .await?
                .ok_or_else(|| ControllerError::NotFound(format!("address pool {}", pool_id)))?;
            ranges.addresses = match &request.range_override {
                Some(over) => pool.range.with_override(over)?,
                None => pool.range,
            };
        }

        // Allocate and persist intent
        let (endpoint, rules, address) = {
            let _claim = self.allocation.lock().await;
            let mut attempt = 0;
            loop {
                attempt += 1;
                let used = self.store.used_values().await?;
                let address = match request.internal_address {
                    Some(address) if used.addresses.contains(&address) => {
                        return Err(ControllerError::Conflict(format!("internal address {} already in use", address)));
                    }
                    Some(address) => address,
                    None => allocate_address(&ranges.addresses, &used.addresses)?,
                };

                let mut endpoint = NetworkEndpoint::new(&request.machine_id, &request.mac_address);
                endpoint.internal_address = Some(address);
                endpoint.hostname = request.hostname.clone();
                endpoint.pool_id = request.pool_id;

                let mut ports = used.ports;
                let mut numbers = used.nat_rules;
                let mut rules = Vec::with_capacity(request.ports.len());
                for kind in &request.ports {
                    let port = allocate_port(&ranges.ports, &ports)?;
                    let number = allocate_nat_rule(&numbers)?;
                    ports.insert(port);
                    numbers.insert(number);
                    rules.push(PortForwardRule::new(endpoint.id, *kind, port, number));
                }

                match self.store.create_endpoint(endpoint.clone(), rules.clone()).await {
                    Ok(()) => break (endpoint, rules, address),
                    Err(e) if e.is_allocation_conflict() && attempt < ALLOCATION_ATTEMPTS => {
                        warn!("Allocation for {} lost a race ({}), rescanning", request.machine_id, e);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };
        info!(
            "Persisted endpoint {} with {} port forwards",
            endpoint.machine_id,
            rules.len()
        );

        // Apply to the device in row order
        let mut applied = Vec::with_capacity(rules.len());
        for rule in &rules {
            if let Err(cancelled) = self.check_cancelled() {
                return Err(self.roll_back_provision(&endpoint, &applied, cancelled).await);
            }
            let batch = match self.batch(&endpoint, rule, Action::Set) {
                Ok(batch) => batch,
                Err(e) => return Err(self.roll_back_provision(&endpoint, &applied, e).await),
            };
            match self.apply(&batch).await {
                Ok(()) => applied.push(rule.nat_rule_number),
                Err(e) => {
                    error!("Failed to apply {}: {}", RuleKey::new(&endpoint.machine_id, rule.kind), e);
                    if e.is_indeterminate() {
                        applied.push(rule.nat_rule_number);
                    }
                    return Err(self.roll_back_provision(&endpoint, &applied, e.into()).await);
                }
            }
        }

        let response = ProvisionResponse {
            machine_id: endpoint.machine_id.clone(),
            internal_address: address,
            ports: rules.iter().map(|r| (r.kind, r.external_port)).collect(),
            nat_rule_base: rules.iter().map(|r| r.nat_rule_number).min(),
            status: "committed",
        };
        info!("Provisioned {} at {}", response.machine_id, response.internal_address);
        Ok(response)
    }

    /// Undo a provision after `cause`; returns the error the caller sees
    async fn roll_back_provision(
        &self,
        endpoint: &NetworkEndpoint,
        applied: &[u32],
        cause: ControllerError,
    ) -> ControllerError {
        warn!(
            "Rolling back provision of {} ({} device rules to remove): {}",
            endpoint.machine_id,
            applied.len(),
            cause
        );
        let mut problems = self.compensate_device(applied).await;
        if let Err(e) = self.store.delete_endpoint(endpoint.id).await {
            problems.push(format!("rows of {} not removed: {}", endpoint.machine_id, e));
        }

        if problems.is_empty() {
            info!("Rolled back provision of {}", endpoint.machine_id);
            cause
        } else {
            self.inconsistent(&endpoint.machine_id, cause, problems)
        }
    }

    fn inconsistent(&self, machine_id: &str, cause: ControllerError, problems: Vec<String>) -> ControllerError {
        let detail = format!(
            "{} failed ({}) and compensation failed: {}",
            machine_id,
            cause,
            problems.join("; ")
        );
        error!("Inconsistent state: {}", detail);
        ControllerError::InconsistentState(detail)
    }

    /// Delete each rule from the device, retrying with backoff
    ///
    /// A rejected delete counts as done when the rule is confirmed absent.
    /// Returns one message per rule that could not be removed.
    async fn compensate_device(&self, rule_numbers: &[u32]) -> Vec<String> {
        let mut problems = Vec::new();
        for number in rule_numbers.iter().rev() {
            if let Err(e) = self.delete_with_retry(*number).await {
                problems.push(format!("rule {} left on device: {}", number, e));
            }
        }
        problems
    }

    async fn delete_with_retry(&self, number: u32) -> Result<(), DeviceApiError> {
        let mut backoff = FibonacciBackoff::new(self.settings.retry_delay, self.settings.retry_delay.saturating_mul(8));
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self.apply(&delete_rule(number)).await;
            let err = match result {
                Ok(()) => {
                    debug!("Compensating delete of rule {} applied", number);
                    return Ok(());
                }
                Err(e) => e,
            };
            if matches!(err, DeviceApiError::Rejected { .. }) && self.rule_absent(number).await {
                debug!("Rule {} already absent from device", number);
                return Ok(());
            }
            if attempt >= self.settings.compensation_attempts {
                return Err(err);
            }
            warn!("Compensating delete of rule {} failed (attempt {}): {}", number, attempt, err);
            tokio::time::sleep(backoff.next_backoff()).await;
        }
    }

    async fn rule_absent(&self, number: u32) -> bool {
        match self.device.fetch_nat_rules().await {
            Ok(rules) => rules.iter().all(|rule| rule.number != number),
            Err(_) => false,
        }
    }

    /// Remove every device rule of an endpoint, then its rows
    pub async fn decommission(&self, machine_id: &str) -> Result<DecommissionResponse, ControllerError> {
        let result = self.decommission_inner(machine_id).await;
        self.record("decommission", &result);
        result
    }

    async fn decommission_inner(&self, machine_id: &str) -> Result<DecommissionResponse, ControllerError> {
        let endpoint = self.endpoint(machine_id).await?;
        let rules = self.store.rules_for_endpoint(endpoint.id).await?;

        let mut deleted = Vec::new();
        for rule in rules.iter().filter(|rule| rule.status.is_declared()) {
            self.check_cancelled()?;
            match self.apply(&delete_rule(rule.nat_rule_number)).await {
                Ok(()) => deleted.push(rule.nat_rule_number),
                Err(e) => {
                    if matches!(e, DeviceApiError::Rejected { .. }) && self.rule_absent(rule.nat_rule_number).await {
                        debug!("Rule {} of {} already absent from device", rule.nat_rule_number, machine_id);
                        deleted.push(rule.nat_rule_number);
                        continue;
                    }
                    error!("Decommission of {} incomplete: {}", machine_id, e);
                    return Err(ControllerError::DecommissionIncomplete {
                        machine_id: machine_id.to_string(),
                        source: e,
                    });
                }
            }
        }

        self.store.delete_endpoint(endpoint.id).await?;
        info!("Decommissioned {} ({} device rules removed)", machine_id, deleted.len());
        Ok(DecommissionResponse {
            machine_id: machine_id.to_string(),
            deleted_rules: deleted,
        })
    }

    /// Forward one more port of an existing endpoint
    ///
    /// A `not_active` row is re-activated with its reserved port and rule
    /// number; otherwise new values are allocated.
    pub async fn add_port_forward(
        &self,
        machine_id: &str,
        kind: PortKind,
        options: PortForwardOptions,
    ) -> Result<PortForwardRule, ControllerError> {
        let result = self.add_port_forward_inner(machine_id, kind, options).await;
        self.record("add_port_forward", &result);
        result
    }

    async fn add_port_forward_inner(
        &self,
        machine_id: &str,
        kind: PortKind,
        options: PortForwardOptions,
    ) -> Result<PortForwardRule, ControllerError> {
        let endpoint = self.endpoint(machine_id).await?;
        let existing = self.rule(&endpoint, kind).await?;

        let apply_options = |rule: &mut PortForwardRule| {
            if let Some(protocol) = options.protocol {
                rule.protocol = protocol;
            }
            if options.source_address.is_some() {
                rule.source_address = options.source_address.clone();
            }
            if options.description.is_some() {
                rule.description = options.description.clone();
            }
        };

        let (rule, prior, batch) = match existing {
            Some(rule) if rule.status.is_declared() => {
                return Err(ControllerError::Conflict(format!(
                    "{} is already forwarded",
                    RuleKey::new(machine_id, kind)
                )));
            }
            Some(prior) => {
                let mut rule = prior.clone();
                rule.status = RuleStatus::Enabled;
                rule.updated_at = chrono::Utc::now();
                apply_options(&mut rule);
                let batch = self.batch(&endpoint, &rule, Action::Set)?;
                self.store.update_rule(rule.clone()).await?;
                (rule, Some(prior), batch)
            }
            None => {
                let ranges = self.settings.ranges.resolve(options.range_override.as_ref())?;
                let _claim = self.allocation.lock().await;
                let mut attempt = 0;
                loop {
                    attempt += 1;
                    let used = self.store.used_values().await?;
                    let port = allocate_port(&ranges.ports, &used.ports)?;
                    let number = allocate_nat_rule(&used.nat_rules)?;
                    let mut rule = PortForwardRule::new(endpoint.id, kind, port, number);
                    apply_options(&mut rule);
                    let batch = self.batch(&endpoint, &rule, Action::Set)?;
                    match self.store.insert_rule(rule.clone()).await {
                        Ok(()) => break (rule, None, batch),
                        Err(e) if e.is_allocation_conflict() && attempt < ALLOCATION_ATTEMPTS => {
                            warn!("Allocation for {} lost a race ({}), rescanning", machine_id, e);
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        };

        if let Err(e) = self.check_cancelled() {
            return Err(self.roll_back_rule(&endpoint, &rule, prior, false, e).await);
        }
        if let Err(e) = self.apply(&batch).await {
            error!("Failed to apply {}: {}", RuleKey::new(machine_id, kind), e);
            let indeterminate = e.is_indeterminate();
            return Err(self.roll_back_rule(&endpoint, &rule, prior, indeterminate, e.into()).await);
        }

        info!(
            "Forwarded {} on port {} (rule {})",
            RuleKey::new(machine_id, kind),
            rule.external_port,
            rule.nat_rule_number
        );
        Ok(rule)
    }

    /// Restore a rule row after a failed add
    async fn roll_back_rule(
        &self,
        endpoint: &NetworkEndpoint,
        rule: &PortForwardRule,
        prior: Option<PortForwardRule>,
        on_device: bool,
        cause: ControllerError,
    ) -> ControllerError {
        let mut problems = if on_device {
            self.compensate_device(&[rule.nat_rule_number]).await
        } else {
            Vec::new()
        };
        let restored = match prior {
            Some(prior) => self.store.update_rule(prior).await,
            None => self.store.delete_rule(rule.id).await,
        };
        if let Err(e) = restored {
            problems.push(format!("row of rule {} not restored: {}", rule.nat_rule_number, e));
        }

        if problems.is_empty() {
            cause
        } else {
            self.inconsistent(&endpoint.machine_id, cause, problems)
        }
    }

    /// Stop forwarding a port, keeping its values reserved
    pub async fn remove_port_forward(&self, machine_id: &str, kind: PortKind) -> Result<PortForwardRule, ControllerError> {
        let result = self.remove_port_forward_inner(machine_id, kind).await;
        self.record("remove_port_forward", &result);
        result
    }

    async fn remove_port_forward_inner(&self, machine_id: &str, kind: PortKind) -> Result<PortForwardRule, ControllerError> {
        let endpoint = self.endpoint(machine_id).await?;
        let mut rule = self
            .rule(&endpoint, kind)
            .await?
            .ok_or_else(|| ControllerError::NotFound(format!("port forward {}", RuleKey::new(machine_id, kind))))?;
        if rule.status == RuleStatus::NotActive {
            return Ok(rule);
        }

        self.check_cancelled()?;
        if let Err(e) = self.apply(&delete_rule(rule.nat_rule_number)).await {
            if !(matches!(e, DeviceApiError::Rejected { .. }) && self.rule_absent(rule.nat_rule_number).await) {
                return Err(e.into());
            }
            debug!("Rule {} of {} already absent from device", rule.nat_rule_number, machine_id);
        }

        rule.status = RuleStatus::NotActive;
        rule.updated_at = chrono::Utc::now();
        self.store.update_rule(rule.clone()).await?;
        info!("Removed forward {} (rule {})", RuleKey::new(machine_id, kind), rule.nat_rule_number);
        Ok(rule)
    }

    /// Toggle a forward without releasing its rule number
    pub async fn set_rule_enabled(
        &self,
        machine_id: &str,
        kind: PortKind,
        enabled: bool,
    ) -> Result<PortForwardRule, ControllerError> {
        let operation = if enabled { "enable" } else { "disable" };
        let result = self.set_rule_enabled_inner(machine_id, kind, enabled).await;
        self.record(operation, &result);
        result
    }

    async fn set_rule_enabled_inner(
        &self,
        machine_id: &str,
        kind: PortKind,
        enabled: bool,
    ) -> Result<PortForwardRule, ControllerError> {
        let endpoint = self.endpoint(machine_id).await?;
        let key = RuleKey::new(machine_id, kind);
        let mut rule = self
            .rule(&endpoint, kind)
            .await?
            .ok_or_else(|| ControllerError::NotFound(format!("port forward {}", key)))?;

        let target = if enabled { RuleStatus::Enabled } else { RuleStatus::Disabled };
        match rule.status {
            RuleStatus::NotActive => {
                return Err(ControllerError::Conflict(format!("port forward {} is not active", key)));
            }
            status if status == target => return Ok(rule),
            _ => {}
        }

        self.check_cancelled()?;
        let action = if enabled { Action::Enable } else { Action::Disable };
        self.apply(&self.batch(&endpoint, &rule, action)?).await?;

        rule.status = target;
        rule.updated_at = chrono::Utc::now();
        self.store.update_rule(rule.clone()).await?;
        info!("Port forward {} is now {}", key, target);
        Ok(rule)
    }

    /// Endpoint `machine_id` with its rules
    pub async fn get_endpoint(&self, machine_id: &str) -> Result<EndpointView, ControllerError> {
        let endpoint = self.endpoint(machine_id).await?;
        let rules = self.store.rules_for_endpoint(endpoint.id).await?;
        Ok(EndpointView { endpoint, rules })
    }

    /// Create a named address pool
    pub async fn create_pool(&self, request: CreatePoolRequest) -> Result<AddressPool, ControllerError> {
        let range = allocator::AddressRange::new(request.base, request.start_octet, request.end_octet)?;
        let mut pool = AddressPool::new(request.name.trim(), range);
        if pool.name.is_empty() {
            return Err(ControllerError::InvalidRequest("pool name must not be empty".to_string()));
        }
        pool.description = request.description;
        self.store.create_pool(pool.clone()).await.map_err(|e| match e {
            StoreError::Conflict { .. } => ControllerError::Conflict(format!("address pool {} already exists", pool.name)),
            other => other.into(),
        })?;
        info!("Created address pool {} ({})", pool.name, pool.range);
        Ok(pool)
    }

    /// Every address pool
    pub async fn list_pools(&self) -> Result<Vec<AddressPool>, ControllerError> {
        Ok(self.store.list_pools().await?)
    }

    fn record<T>(&self, operation: &str, result: &Result<T, ControllerError>) {
        let outcome = match result {
            Ok(_) => "committed",
            Err(ControllerError::InconsistentState(_)) => "inconsistent",
            Err(ControllerError::DecommissionIncomplete { .. }) => "incomplete",
            Err(ControllerError::Cancelled) => "cancelled",
            Err(ControllerError::Device(_)) => "rolled_back",
            Err(_) => "rejected",
        };
        self.metrics.operation(operation, outcome);
    }
}
