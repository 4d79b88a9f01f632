//! VyOS HTTPS API client
//!
//! Configuration changes go to `POST <base>/configure`, reads to
//! `POST <base>/retrieve`. Both carry the key id and shared secret in the
//! JSON body.

use crate::error::DeviceApiError;
use crate::gateway_trait::DeviceGateway;
use crate::models::{error_message, ConfigureRequest, DeviceResponse, DeviceRule, RetrieveRequest, NAT_RULE_PATH};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};
use vyos_commands::CommandBatch;

/// VyOS API client
pub struct VyosClient {
    client: Client,
    base_url: String,
    key_id: String,
    key: String,
}

impl std::fmt::Debug for VyosClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VyosClient")
            .field("base_url", &self.base_url)
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl VyosClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `base_url` - Device API base URL (e.g., "https://192.168.1.1:8443")
    /// * `key_id` - Identifier sent as the envelope `id`
    /// * `key` - Shared secret sent as the envelope `key`
    /// * `timeout` - Bound on every RPC; an expired call is indeterminate
    /// * `accept_invalid_certs` - Accept the device's self-signed certificate
    pub fn new(
        base_url: String,
        key_id: String,
        key: String,
        timeout: Duration,
        accept_invalid_certs: bool,
    ) -> Result<Self, DeviceApiError> {
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(DeviceApiError::Configuration(format!(
                "device URL must start with http:// or https://: {}",
                base_url
            )));
        }
        if key.is_empty() {
            return Err(DeviceApiError::Configuration("device key must not be empty".to_string()));
        }
        if timeout.is_zero() {
            return Err(DeviceApiError::Configuration("device timeout must be non-zero".to_string()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| DeviceApiError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            key_id,
            key,
        })
    }

    async fn post<T: Serialize + ?Sized>(&self, endpoint: &str, body: &T) -> Result<Value, DeviceApiError> {
        let url = format!("{}/{}", self.base_url, endpoint);

        let response = self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        interpret(status, &text)
    }
}

/// Map an HTTP status and body onto the device error taxonomy
pub(crate) fn interpret(status: u16, body: &str) -> Result<Value, DeviceApiError> {
    let parsed: Option<Value> = serde_json::from_str(body).ok();

    if !(200..300).contains(&status) {
        let message = parsed
            .as_ref()
            .and_then(|v| v.get("error"))
            .and_then(error_message)
            .unwrap_or_else(|| {
                let trimmed = body.trim();
                if trimmed.is_empty() {
                    format!("HTTP {}", status)
                } else {
                    trimmed.chars().take(500).collect()
                }
            });
        return Err(DeviceApiError::Rejected {
            status: Some(status),
            message,
        });
    }

    let response: DeviceResponse = parsed
        .and_then(|v| serde_json::from_value(v).ok())
        .ok_or_else(|| {
            DeviceApiError::MalformedResponse(format!(
                "Response (first 200 chars): {}",
                body.chars().take(200).collect::<String>()
            ))
        })?;

    if !response.success {
        return Err(DeviceApiError::Rejected {
            status: Some(status),
            message: error_message(&response.error).unwrap_or_else(|| "device reported failure".to_string()),
        });
    }

    Ok(response.data)
}

#[async_trait::async_trait]
impl DeviceGateway for VyosClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn apply(&self, batch: &CommandBatch) -> Result<(), DeviceApiError> {
        if batch.is_empty() {
            return Ok(());
        }
        debug!("Applying {} batch of {} commands", batch.op, batch.len());

        let request = ConfigureRequest {
            op: batch.op,
            id: &self.key_id,
            key: &self.key,
            commands: &batch.commands,
        };
        self.post("configure", &request).await.map(|_| ()).map_err(|e| {
            error!("Device {} batch failed: {}", batch.op, e);
            e
        })
    }

    async fn fetch_nat_rules(&self) -> Result<Vec<DeviceRule>, DeviceApiError> {
        debug!("Fetching NAT destination rules from {}", self.base_url);
        let request = RetrieveRequest {
            op: "showConfig",
            id: &self.key_id,
            key: &self.key,
            path: &NAT_RULE_PATH,
        };
        let data = self.post("retrieve", &request).await?;
        DeviceRule::from_tree(&data)
    }
}
