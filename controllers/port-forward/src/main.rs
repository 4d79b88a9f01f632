//! Port-forward Controller
//!
//! Provisions network endpoints on a VyOS router: allocates internal
//! addresses, external ports and NAT rule numbers, records them in the
//! inventory and applies the matching destination NAT rules. A periodic
//! reconciliation pass keeps the router's rules in line with the inventory.

mod api;
mod backoff;
mod config;
mod controller;
mod error;
mod metrics;
mod provisioner;
mod reconciler;
mod tasks;

#[cfg(test)]
mod test_utils;
#[cfg(test)]
mod provisioner_test;

use crate::config::Config;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting port-forward controller");

    let config = Config::from_env()?;
    info!("Configuration:");
    info!("  Device URL: {}", config.device_url);
    info!("  Inbound interface: {}", config.inbound_interface);
    info!("  Address range: {}", config.ranges.addresses);
    info!("  Port range: {}", config.ranges.ports);
    info!(
        "  Store: {}",
        config
            .store_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "in-memory".to_string())
    );

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
