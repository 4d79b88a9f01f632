//! Reconciliation engine
//!
//! Compares the rules declared in the inventory with the NAT rules on the
//! device and converges the device onto the inventory. The inventory is the
//! source of truth; the device is never read back into it.
//!
//! Device rules are matched to rows by the key parsed from their description.
//! A rule whose description does not parse is matched by rule number; a rule
//! matching neither way is reported as unrecognized and never touched.
//!
//! A pass is planned in full before anything is sent, so [`plan`] is pure and
//! tested on its own. Changes are applied one key at a time, adds and updates
//! before deletes; a failing key is reported and the pass moves on.

use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::provisioner::desired_port_forward;
use chrono::{DateTime, Utc};
use inventory::{DeclaredRule, InventoryStore};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};
use vyos_client::{DeviceApiError, DeviceGateway, DeviceRule};
use vyos_commands::port_forward::{delete_rule, rule_path};
use vyos_commands::{generate, parse_description, Action, CommandBatch, DeviceEntity, Op, PortForward, RuleKey};

/// Outcome of one pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// `success`, or `error` when any key failed
    pub status: &'static str,
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
    pub unchanged: Vec<String>,
    pub unrecognized: Vec<String>,
    pub failed: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Set a desired rule, then clean up around it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upsert {
    pub key: RuleKey,
    pub rule: PortForward,
    /// No device rule correlates with the key yet
    pub is_new: bool,
    /// Optional nodes left over at the target number (`disable`, `source`)
    pub stale_nodes: Vec<&'static str>,
    /// Other device rules carrying the same key
    pub strays: Vec<u32>,
}

impl Upsert {
    fn label(&self) -> String {
        label(&self.key, self.rule.rule_number)
    }
}

/// Delete an undeclared device rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub label: String,
    pub rule_number: u32,
}

/// Everything one pass will do
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub upserts: Vec<Upsert>,
    pub removals: Vec<Removal>,
    pub unchanged: Vec<String>,
    pub unrecognized: Vec<String>,
    /// Keys that cannot be reconciled at all
    pub failed: Vec<String>,
}

fn label(key: &RuleKey, rule_number: u32) -> String {
    format!("{} (rule {})", key, rule_number)
}

fn unrecognized(rule: &DeviceRule) -> String {
    format!(
        "rule {} (description {:?})",
        rule.number,
        rule.description.as_deref().unwrap_or_default()
    )
}

/// Whether the device rule already is exactly the desired rule
fn matches(device: &DeviceRule, desired: &PortForward) -> bool {
    device.number == desired.rule_number
        && device.description.as_deref() == Some(desired.description.as_str())
        && device.inbound_interface.as_deref() == Some(desired.inbound_interface.as_str())
        && device.destination_port == Some(desired.external_port)
        && device.protocol == Some(desired.protocol)
        && device.source_address == desired.source_address
        && device.translation_address == Some(desired.translation_address)
        && device.translation_port == Some(desired.translation_port)
        && device.disabled == desired.disabled
}

/// Nodes a set of `desired` would not overwrite on `occupant`
fn stale_nodes(occupant: Option<&DeviceRule>, desired: &PortForward) -> Vec<&'static str> {
    let Some(occupant) = occupant else {
        return Vec::new();
    };
    let mut nodes = Vec::new();
    if occupant.source_address.is_some() && desired.source_address.is_none() {
        nodes.push("source");
    }
    if occupant.disabled && !desired.disabled {
        nodes.push("disable");
    }
    nodes
}

/// Work out the changes that bring `device` in line with `declared`
pub fn plan(declared: &[DeclaredRule], device: &[DeviceRule], inbound_interface: &str) -> Plan {
    let mut result = Plan::default();

    let mut desired: BTreeMap<RuleKey, PortForward> = BTreeMap::new();
    let mut held: BTreeSet<RuleKey> = BTreeSet::new();
    let mut by_number: BTreeMap<u32, RuleKey> = BTreeMap::new();
    for DeclaredRule { endpoint, rule } in declared {
        let key = RuleKey::new(&endpoint.machine_id, rule.kind);
        by_number.insert(rule.nat_rule_number, key.clone());
        match desired_port_forward(endpoint, rule, inbound_interface) {
            Some(forward) => {
                desired.insert(key, forward);
            }
            None => {
                result
                    .failed
                    .push(format!("{}: endpoint has no internal address", label(&key, rule.nat_rule_number)));
                held.insert(key);
            }
        }
    }

    let mut on_device: BTreeMap<RuleKey, Vec<&DeviceRule>> = BTreeMap::new();
    let mut occupants: BTreeMap<u32, &DeviceRule> = BTreeMap::new();
    for rule in device {
        occupants.insert(rule.number, rule);
        // A declared number owns its rule whatever the description says
        let key = by_number.get(&rule.number).cloned().or_else(|| {
            rule.description
                .as_deref()
                .and_then(|d| parse_description(d).ok())
        });
        match key {
            Some(key) => on_device.entry(key).or_default().push(rule),
            None => result.unrecognized.push(unrecognized(rule)),
        }
    }

    for (key, rule) in &desired {
        let target = rule.rule_number;
        let candidates = on_device.get(key).map(Vec::as_slice).unwrap_or_default();
        let occupant = occupants.get(&target).copied();
        let primary = candidates
            .iter()
            .find(|c| c.number == target)
            .or_else(|| candidates.first());
        let strays: Vec<u32> = candidates
            .iter()
            .map(|c| c.number)
            .filter(|n| *n != target && !by_number.contains_key(n))
            .collect();

        match primary {
            Some(primary) if matches(primary, rule) && strays.is_empty() => {
                result.unchanged.push(label(key, target));
            }
            Some(_) => result.upserts.push(Upsert {
                key: key.clone(),
                rule: rule.clone(),
                is_new: false,
                stale_nodes: stale_nodes(occupant, rule),
                strays,
            }),
            None => result.upserts.push(Upsert {
                key: key.clone(),
                rule: rule.clone(),
                is_new: true,
                stale_nodes: stale_nodes(occupant, rule),
                strays,
            }),
        }
    }

    for (key, rules) in &on_device {
        if desired.contains_key(key) || held.contains(key) {
            continue;
        }
        for rule in rules {
            // A declared number is rewritten by its own upsert
            if by_number.contains_key(&rule.number) {
                continue;
            }
            result.removals.push(Removal {
                label: label(key, rule.number),
                rule_number: rule.number,
            });
        }
    }

    result
}

/// Reconciliation engine
pub struct Reconciler {
    store: Arc<dyn InventoryStore>,
    device: Arc<dyn DeviceGateway>,
    inbound_interface: String,
    metrics: Metrics,
    /// One pass at a time
    pass: Mutex<()>,
    shutdown: watch::Receiver<bool>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        device: Arc<dyn DeviceGateway>,
        inbound_interface: impl Into<String>,
        metrics: Metrics,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            device,
            inbound_interface: inbound_interface.into(),
            metrics,
            pass: Mutex::new(()),
            shutdown,
        }
    }

    async fn apply(&self, batch: &CommandBatch) -> Result<(), DeviceApiError> {
        self.device.apply(batch).await.inspect_err(|e| self.metrics.device_error(e))
    }

    async fn apply_upsert(&self, upsert: &Upsert) -> Result<(), ControllerError> {
        let set = generate(&DeviceEntity::PortForward(upsert.rule.clone()), Action::Set)?;
        self.apply(&set).await?;

        if !upsert.stale_nodes.is_empty() {
            let path = rule_path(upsert.rule.rule_number);
            let commands = upsert
                .stale_nodes
                .iter()
                .map(|node| format!("delete {} {}", path, node))
                .collect();
            self.apply(&CommandBatch::new(Op::Delete, commands)).await?;
        }

        for stray in &upsert.strays {
            debug!("Removing duplicate of {} at rule {}", upsert.key, stray);
            self.apply(&delete_rule(*stray)).await?;
        }
        Ok(())
    }

    /// Run one reconciliation pass
    ///
    /// Fails as a whole only when the inventory or the device rules cannot
    /// be read; per-key failures are listed in the report.
    pub async fn run(&self) -> Result<ReconcileReport, ControllerError> {
        let _pass = self.pass.lock().await;
        let started_at = Utc::now();

        let declared = self.store.declared_rules().await?;
        let device = self
            .device
            .fetch_nat_rules()
            .await
            .inspect_err(|e| self.metrics.device_error(e))?;
        let plan = plan(&declared, &device, &self.inbound_interface);
        debug!(
            "Reconciliation plan: {} upserts, {} removals, {} unchanged",
            plan.upserts.len(),
            plan.removals.len(),
            plan.unchanged.len()
        );

        let mut report = ReconcileReport {
            status: "success",
            added: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
            unchanged: plan.unchanged,
            unrecognized: plan.unrecognized,
            failed: plan.failed,
            started_at,
            finished_at: started_at,
        };
        for entry in &report.unrecognized {
            warn!("Unrecognized NAT rule left in place: {}", entry);
        }

        for upsert in &plan.upserts {
            let label = upsert.label();
            if *self.shutdown.borrow() {
                report.failed.push(format!("{}: {}", label, ControllerError::Cancelled));
                continue;
            }
            match self.apply_upsert(upsert).await {
                Ok(()) if upsert.is_new => report.added.push(label),
                Ok(()) => report.updated.push(label),
                Err(e) => {
                    error!("Failed to reconcile {}: {}", label, e);
                    report.failed.push(format!("{}: {}", label, e));
                }
            }
        }

        for removal in &plan.removals {
            if *self.shutdown.borrow() {
                report.failed.push(format!("{}: {}", removal.label, ControllerError::Cancelled));
                continue;
            }
            match self.apply(&delete_rule(removal.rule_number)).await {
                Ok(()) => report.deleted.push(removal.label.clone()),
                Err(e) => {
                    error!("Failed to delete {}: {}", removal.label, e);
                    report.failed.push(format!("{}: {}", removal.label, e));
                }
            }
        }

        if !report.failed.is_empty() {
            report.status = "error";
        }
        report.finished_at = Utc::now();

        self.metrics.reconcile_change("added", report.added.len());
        self.metrics.reconcile_change("updated", report.updated.len());
        self.metrics.reconcile_change("deleted", report.deleted.len());
        self.metrics.reconcile_change("unchanged", report.unchanged.len());
        self.metrics.reconcile_change("failed", report.failed.len());
        info!(
            "Reconciliation {}: {} added, {} updated, {} deleted, {} unchanged, {} unrecognized, {} failed",
            report.status,
            report.added.len(),
            report.updated.len(),
            report.deleted.len(),
            report.unchanged.len(),
            report.unrecognized.len(),
            report.failed.len()
        );
        Ok(report)
    }
}
