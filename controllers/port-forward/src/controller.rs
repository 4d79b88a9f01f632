//! Main controller implementation.
//!
//! Wires the device gateway, the inventory store, the orchestrator and the
//! reconciler together, then runs the periodic reconciliation loop next to the
//! admin API until a shutdown signal arrives.

use crate::api::{self, AppState};
use crate::backoff::FibonacciBackoff;
use crate::config::Config;
use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::provisioner::{Provisioner, ProvisionerSettings};
use crate::reconciler::Reconciler;
use crate::tasks::TaskStore;
use inventory::{InventoryStore, MemoryStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use vyos_client::{DeviceGateway, VyosClient};

/// First delay between compensating deletes
const COMPENSATION_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Main controller for port-forward management.
pub struct Controller {
    state: AppState,
    listen_addr: SocketAddr,
    reconcile_interval: Option<Duration>,
    shutdown: watch::Sender<bool>,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: Config) -> Result<Self, ControllerError> {
        info!("Initializing port-forward controller");

        let device: Arc<dyn DeviceGateway> = Arc::new(VyosClient::new(
            config.device_url.clone(),
            config.device_key_id.clone(),
            config.device_key.clone(),
            config.device_timeout,
            config.device_accept_invalid_certs,
        )?);

        let store: Arc<dyn InventoryStore> = match &config.store_path {
            Some(path) => {
                info!("Loading inventory snapshot from {}", path.display());
                Arc::new(MemoryStore::open(path).await?)
            }
            None => {
                warn!("STORE_PATH not set, inventory is kept in memory only");
                Arc::new(MemoryStore::new())
            }
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        let metrics = Metrics::new()?;
        let settings = ProvisionerSettings {
            ranges: config.ranges,
            inbound_interface: config.inbound_interface.clone(),
            compensation_attempts: config.compensation_attempts,
            retry_delay: COMPENSATION_RETRY_DELAY,
        };

        let state = AppState {
            provisioner: Arc::new(Provisioner::new(
                store.clone(),
                device.clone(),
                settings,
                metrics.clone(),
                shutdown_rx.clone(),
            )),
            reconciler: Arc::new(Reconciler::new(
                store,
                device,
                config.inbound_interface.clone(),
                metrics.clone(),
                shutdown_rx,
            )),
            tasks: Arc::new(TaskStore::new(config.task_ttl, config.task_capacity)),
            metrics,
        };

        Ok(Self {
            state,
            listen_addr: config.listen_addr,
            reconcile_interval: config.reconcile_interval,
            shutdown,
        })
    }

    /// Serve the admin API and run periodic reconciliation until shutdown.
    pub async fn run(self) -> Result<(), ControllerError> {
        let Controller {
            state,
            listen_addr,
            reconcile_interval,
            shutdown,
        } = self;

        let reconcile_loop: Option<JoinHandle<()>> = reconcile_interval.map(|interval| {
            tokio::spawn(reconcile_periodically(
                state.reconciler.clone(),
                interval,
                shutdown.subscribe(),
            ))
        });
        if reconcile_loop.is_none() {
            info!("Periodic reconciliation disabled");
        }

        let listener = tokio::net::TcpListener::bind(listen_addr)
            .await
            .map_err(|e| ControllerError::Server(format!("failed to bind {}: {}", listen_addr, e)))?;
        info!("Admin API listening on {}", listen_addr);

        axum::serve(listener, api::router(state))
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                // Orchestrator operations observe this between device batches
                let _ = shutdown.send(true);
            })
            .await
            .map_err(|e| ControllerError::Server(e.to_string()))?;

        if let Some(handle) = reconcile_loop {
            handle
                .await
                .map_err(|e| ControllerError::Server(format!("reconciliation loop panicked: {}", e)))?;
        }
        info!("Port-forward controller stopped");
        Ok(())
    }
}

/// Delays after failed passes, from `interval` up to ten intervals
fn failure_backoff(interval: Duration) -> FibonacciBackoff {
    FibonacciBackoff::new(interval, interval.saturating_mul(10))
}

/// Reconcile every `interval`, backing off while state cannot be loaded
async fn reconcile_periodically(reconciler: Arc<Reconciler>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    info!("Reconciling every {:?}", interval);
    let mut backoff = failure_backoff(interval);
    let mut delay = interval;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => {
                info!("Stopping periodic reconciliation");
                return;
            }
        }

        match reconciler.run().await {
            Ok(_) => {
                backoff.reset();
                delay = interval;
            }
            Err(e) => {
                delay = backoff.next_backoff();
                error!("Reconciliation pass failed, next attempt in {:?}: {}", delay, e);
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
