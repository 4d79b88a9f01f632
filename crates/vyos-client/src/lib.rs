//! VyOS HTTPS API client
//!
//! The gateway is the only path to the router. It wraps a
//! [`CommandBatch`](vyos_commands::CommandBatch) and the device credentials
//! into one RPC, bounds the call with a timeout, and maps every failure into
//! [`DeviceApiError`].
//!
//! # Example
//!
//! ```no_run
//! use vyos_client::{DeviceGateway, VyosClient};
//! use vyos_commands::port_forward::delete_rule;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = VyosClient::new(
//!     "https://router.lab:8443".to_string(),
//!     "port-forward-controller".to_string(),
//!     "shared-secret".to_string(),
//!     Duration::from_secs(30),
//!     false,
//! )?;
//!
//! client.apply(&delete_rule(10001)).await?;
//! for rule in client.fetch_nat_rules().await? {
//!     println!("{} {:?}", rule.number, rule.description);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Failure semantics
//!
//! - [`DeviceApiError::Transport`]: no answer. The batch may or may not have
//!   been applied.
//! - [`DeviceApiError::Rejected`]: the device refused the batch and applied
//!   none of it.
//! - [`DeviceApiError::MalformedResponse`]: the device answered with a body
//!   that could not be understood.
//!
//! The gateway never retries. Callers that retry rely on `set` being an
//! in-place overwrite.

pub mod client;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod gateway_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::VyosClient;
pub use error::DeviceApiError;
pub use gateway_trait::DeviceGateway;
pub use models::{ConfigureRequest, DeviceResponse, DeviceRule, RetrieveRequest, NAT_RULE_PATH};
#[cfg(feature = "test-util")]
pub use mock::MockDevice;
