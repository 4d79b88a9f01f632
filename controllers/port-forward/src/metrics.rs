//! Prometheus metrics

use crate::error::ControllerError;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use vyos_client::DeviceApiError;

/// Prometheus counters of the controller and their registry
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    reconcile_changes: IntCounterVec,
    device_errors: IntCounterVec,
    provision_operations: IntCounterVec,
}

fn counter(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> Result<IntCounterVec, ControllerError> {
    let counter = IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|e| ControllerError::Server(format!("metric {}: {}", name, e)))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| ControllerError::Server(format!("metric {}: {}", name, e)))?;
    Ok(counter)
}

impl Metrics {
    /// Register every counter on a fresh registry
    pub fn new() -> Result<Self, ControllerError> {
        let registry = Registry::new();
        Ok(Self {
            reconcile_changes: counter(
                &registry,
                "reconcile_changes_total",
                "Reconciliation outcomes per key",
                &["action"],
            )?,
            device_errors: counter(&registry, "device_errors_total", "Failed device RPCs", &["kind"])?,
            provision_operations: counter(
                &registry,
                "provision_operations_total",
                "Orchestrator operations by outcome",
                &["operation", "outcome"],
            )?,
            registry,
        })
    }

    /// Count `count` keys reconciled as `action`
    pub fn reconcile_change(&self, action: &str, count: usize) {
        self.reconcile_changes
            .with_label_values(&[action])
            .inc_by(count as u64);
    }

    /// Count a failed device RPC by error kind
    pub fn device_error(&self, error: &DeviceApiError) {
        self.device_errors.with_label_values(&[error.kind()]).inc();
    }

    /// Count one finished orchestrator operation
    pub fn operation(&self, operation: &str, outcome: &str) {
        self.provision_operations
            .with_label_values(&[operation, outcome])
            .inc();
    }

    /// Text exposition format
    pub fn render(&self) -> Result<String, ControllerError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| ControllerError::Server(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| ControllerError::Server(e.to_string()))
    }
}
